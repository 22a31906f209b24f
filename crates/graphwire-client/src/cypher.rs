//! Cypher statement builder.
//!
//! Every function here is pure: it turns a structured intent into a
//! [`Statement`] (text plus bound parameters). Property values are always
//! bound as parameters. Keys, labels and relationship types are identifiers
//! and are backtick-quoted; identifiers containing a backtick are rejected.
//! Entity ids are integers and are rendered inline.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value as Json};

use graphwire_core::types::props_to_json;
use graphwire_core::{Direction, GraphError, PropertyMap, PropertyValue, Result};

// ── Statements ───────────────────────────────────────────────────

/// An immutable Cypher statement with its bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    text: String,
    parameters: Map<String, Json>,
}

/// Start building a statement, mirroring `neo4rs::query`.
pub fn statement(text: impl Into<String>) -> Statement {
    Statement::new(text)
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Map::new(),
        }
    }

    /// Bind a parameter value.
    pub fn param(mut self, key: &str, value: impl Into<Json>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &Map<String, Json> {
        &self.parameters
    }
}

// ── Targets ──────────────────────────────────────────────────────

/// The entity a property statement operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Node(i64),
    Relationship(i64),
}

impl EntityRef {
    pub fn id(self) -> i64 {
        match self {
            Self::Node(id) | Self::Relationship(id) => id,
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            Self::Node(_) => "Node",
            Self::Relationship(_) => "Relationship",
        }
    }

    fn alias(self) -> &'static str {
        match self {
            Self::Node(_) => "n",
            Self::Relationship(_) => "r",
        }
    }

    fn match_start(self) -> String {
        match self {
            Self::Node(id) => node_match_start("n", id),
            Self::Relationship(id) => format!("MATCH ()-[r]->() WHERE ID(r) = {id}"),
        }
    }
}

fn node_match_start(alias: &str, id: i64) -> String {
    format!("MATCH ({alias}) WHERE ID({alias}) = {id}")
}

// ── Identifiers ──────────────────────────────────────────────────

/// Backtick-quote an identifier, rejecting ones that cannot be quoted safely.
pub fn quote_identifier(kind: &'static str, name: &str) -> Result<String> {
    if name.is_empty() || name.contains('`') {
        return Err(GraphError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        });
    }
    Ok(format!("`{name}`"))
}

/// Render labels as `:`A`:`B``.
pub fn label_list<S: AsRef<str>>(labels: &[S]) -> Result<String> {
    let mut out = String::new();
    for label in labels {
        out.push(':');
        out.push_str(&quote_identifier("label", label.as_ref())?);
    }
    Ok(out)
}

// ── Property Statements ──────────────────────────────────────────

pub fn fetch_properties(entity: EntityRef) -> Statement {
    let a = entity.alias();
    Statement::new(format!(
        "{} RETURN properties({a}) AS props",
        entity.match_start()
    ))
}

pub fn exists(entity: EntityRef) -> Statement {
    let a = entity.alias();
    Statement::new(format!("{} RETURN ID({a}) AS id", entity.match_start()))
}

pub fn set_property(entity: EntityRef, key: &str, value: &PropertyValue) -> Result<Statement> {
    value.validate(key)?;
    let a = entity.alias();
    let key = quote_identifier("property key", key)?;
    Ok(Statement::new(format!(
        "{} SET {a}.{key} = $value",
        entity.match_start()
    ))
    .param("value", value.to_json()))
}

/// Replace the whole property map in one statement.
pub fn replace_properties(entity: EntityRef, props: &PropertyMap) -> Result<Statement> {
    for (key, value) in props {
        quote_identifier("property key", key)?;
        value.validate(key)?;
    }
    let a = entity.alias();
    Ok(
        Statement::new(format!("{} SET {a} = $props", entity.match_start()))
            .param("props", props_to_json(props)),
    )
}

/// Set some keys and remove others in a single statement.
///
/// Keys mapped to `None` are removed. Returns `None` when there is nothing to change.
pub fn update_properties(
    entity: EntityRef,
    changes: &BTreeMap<String, Option<PropertyValue>>,
) -> Result<Option<Statement>> {
    if changes.is_empty() {
        return Ok(None);
    }
    let a = entity.alias();
    let mut sets = Vec::new();
    let mut removes = Vec::new();
    let mut params = Map::new();

    for (key, value) in changes {
        let quoted = quote_identifier("property key", key)?;
        match value {
            Some(v) => {
                v.validate(key)?;
                let name = format!("p{}", params.len());
                sets.push(format!("{a}.{quoted} = ${name}"));
                params.insert(name, v.to_json());
            }
            None => removes.push(format!("{a}.{quoted}")),
        }
    }

    let mut text = entity.match_start();
    if !sets.is_empty() {
        text.push_str(" SET ");
        text.push_str(&sets.join(", "));
    }
    if !removes.is_empty() {
        text.push_str(" REMOVE ");
        text.push_str(&removes.join(", "));
    }
    Ok(Some(Statement {
        text,
        parameters: params,
    }))
}

/// Remove one or many keys. Returns `None` for an empty key list.
pub fn remove_properties<S: AsRef<str>>(
    entity: EntityRef,
    keys: &[S],
) -> Result<Option<Statement>> {
    if keys.is_empty() {
        return Ok(None);
    }
    let a = entity.alias();
    let parts = keys
        .iter()
        .map(|k| quote_identifier("property key", k.as_ref()).map(|q| format!("{a}.{q}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Statement::new(format!(
        "{} REMOVE {}",
        entity.match_start(),
        parts.join(", ")
    ))))
}

// ── Label Statements ─────────────────────────────────────────────

pub fn fetch_labels(node_id: i64) -> Statement {
    Statement::new(format!(
        "{} RETURN labels(n) AS labels",
        node_match_start("n", node_id)
    ))
}

pub fn add_labels<S: AsRef<str>>(node_id: i64, labels: &[S]) -> Result<Option<Statement>> {
    if labels.is_empty() {
        return Ok(None);
    }
    Ok(Some(Statement::new(format!(
        "{} SET n{}",
        node_match_start("n", node_id),
        label_list(labels)?
    ))))
}

pub fn remove_labels<S: AsRef<str>>(node_id: i64, labels: &[S]) -> Result<Option<Statement>> {
    if labels.is_empty() {
        return Ok(None);
    }
    Ok(Some(Statement::new(format!(
        "{} REMOVE n{}",
        node_match_start("n", node_id),
        label_list(labels)?
    ))))
}

/// Make the node's labels exactly `requested`, given its `current` labels.
///
/// Emits one statement combining SET and REMOVE clauses, or `None` when the
/// label sets already agree.
pub fn set_labels<S: AsRef<str>>(
    node_id: i64,
    current: &[String],
    requested: &[S],
) -> Result<Option<Statement>> {
    let mut wanted: Vec<&str> = Vec::with_capacity(requested.len());
    for label in requested {
        let label = label.as_ref();
        quote_identifier("label", label)?;
        if !wanted.contains(&label) {
            wanted.push(label);
        }
    }

    let to_remove: Vec<&str> = current
        .iter()
        .map(String::as_str)
        .filter(|l| !wanted.contains(l))
        .collect();
    let to_add: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|l| !current.iter().any(|c| c == l))
        .collect();

    if to_add.is_empty() && to_remove.is_empty() {
        return Ok(None);
    }

    let mut text = node_match_start("n", node_id);
    if !to_add.is_empty() {
        text.push_str(&format!(" SET n{}", label_list(&to_add)?));
    }
    if !to_remove.is_empty() {
        text.push_str(&format!(" REMOVE n{}", label_list(&to_remove)?));
    }
    Ok(Some(Statement::new(text)))
}

// ── Traversal ────────────────────────────────────────────────────

/// Filter for relationships around a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSpec {
    pub direction: Direction,
    pub rel_type: Option<String>,
    /// Only match relationships whose other end is this node id.
    pub between: Option<i64>,
}

impl MatchSpec {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Default::default()
        }
    }

    pub fn outgoing() -> Self {
        Self::new(Direction::Outgoing)
    }

    pub fn incoming() -> Self {
        Self::new(Direction::Incoming)
    }

    pub fn both() -> Self {
        Self::new(Direction::Both)
    }

    pub fn rel_type(mut self, rel_type: impl Into<String>) -> Self {
        self.rel_type = Some(rel_type.into());
        self
    }

    pub fn between(mut self, node_id: i64) -> Self {
        self.between = Some(node_id);
        self
    }
}

/// What a traversal returns: the nodes at the other end or the relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReturn {
    Nodes,
    Relationships,
}

fn arrow(direction: Direction, rel: &str) -> String {
    match direction {
        Direction::Outgoing => format!("-{rel}->"),
        Direction::Incoming => format!("<-{rel}-"),
        Direction::Both => format!("-{rel}-"),
    }
}

pub fn match_related(
    node_id: i64,
    spec: &MatchSpec,
    returns: MatchReturn,
    limit: Option<usize>,
) -> Result<Statement> {
    let rel = match &spec.rel_type {
        Some(t) => format!("[r:{}]", quote_identifier("relationship type", t)?),
        None => "[r]".to_string(),
    };
    let mut text = format!(
        "{} MATCH (n){}(p)",
        node_match_start("n", node_id),
        arrow(spec.direction, &rel)
    );
    if let Some(other) = spec.between {
        text.push_str(&format!(" WHERE ID(p) = {other}"));
    }
    text.push_str(match returns {
        MatchReturn::Nodes => " RETURN p AS result",
        MatchReturn::Relationships => " RETURN r AS result",
    });
    if let Some(limit) = limit {
        text.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(Statement::new(text))
}

// ── Create & Delete ──────────────────────────────────────────────

pub fn create_node<S: AsRef<str>>(labels: &[S], props: &PropertyMap) -> Result<Statement> {
    let labels = label_list(labels)?;
    if props.is_empty() {
        return Ok(Statement::new(format!("CREATE (n{labels}) RETURN ID(n) AS id")));
    }
    for (key, value) in props {
        quote_identifier("property key", key)?;
        value.validate(key)?;
    }
    Ok(
        Statement::new(format!("CREATE (n{labels} $props) RETURN ID(n) AS id"))
            .param("props", props_to_json(props)),
    )
}

pub fn create_relationship(
    start_id: i64,
    end_id: i64,
    rel_type: &str,
    props: &PropertyMap,
) -> Result<Statement> {
    let rel_type = quote_identifier("relationship type", rel_type)?;
    let head = format!("MATCH (a), (b) WHERE ID(a) = {start_id} AND ID(b) = {end_id}");
    if props.is_empty() {
        return Ok(Statement::new(format!(
            "{head} CREATE (a)-[r:{rel_type}]->(b) RETURN ID(r) AS id"
        )));
    }
    for (key, value) in props {
        quote_identifier("property key", key)?;
        value.validate(key)?;
    }
    Ok(Statement::new(format!(
        "{head} CREATE (a)-[r:{rel_type} $props]->(b) RETURN ID(r) AS id"
    ))
    .param("props", props_to_json(props)))
}

/// Fetch a node as an entity column so the decoder sees its labels and properties.
pub fn load_node(node_id: i64) -> Statement {
    Statement::new(format!("{} RETURN n AS node", node_match_start("n", node_id)))
}

pub fn load_relationship(rel_id: i64) -> Statement {
    Statement::new(format!(
        "{} RETURN ID(r) AS id, type(r) AS type, ID(startNode(r)) AS start, ID(endNode(r)) AS end, properties(r) AS props",
        EntityRef::Relationship(rel_id).match_start()
    ))
}

/// Delete a node: incident relationships first, then the node itself.
pub fn delete_node(node_id: i64) -> [Statement; 2] {
    let start = node_match_start("n", node_id);
    [
        Statement::new(format!("{start} MATCH (n)-[r]-() DELETE r")),
        Statement::new(format!("{start} DELETE n")),
    ]
}

pub fn delete_relationship(rel_id: i64) -> Statement {
    Statement::new(format!(
        "{} DELETE r",
        EntityRef::Relationship(rel_id).match_start()
    ))
}
