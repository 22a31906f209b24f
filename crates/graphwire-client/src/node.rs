//! Node proxy.
//!
//! A [`Node`] is addressed by its backend id. Labels and properties are
//! cached snapshots: built from query results when available, fetched on
//! first read otherwise, and dropped by every mutation the proxy issues.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde_json::Value as Json;

use graphwire_core::{GraphError, PropertyMap, PropertyValue, Result, WrapLevel};

use crate::cypher::{self, EntityRef, MatchReturn, MatchSpec, Statement};
use crate::property::{EntityCore, PropertyAccessor};
use crate::relationship::Relationship;
use crate::session::Session;
use crate::value::Value;

#[derive(Clone)]
pub struct Node {
    core: EntityCore,
    labels: Option<Vec<String>>,
}

impl Node {
    pub(crate) fn from_parts(
        session: Session,
        id: i64,
        labels: Option<Vec<String>>,
        props: Option<PropertyMap>,
    ) -> Self {
        Self {
            core: EntityCore::new(session, EntityRef::Node(id), props),
            labels,
        }
    }

    pub fn id(&self) -> i64 {
        self.core.id()
    }

    pub fn session(&self) -> &Session {
        &self.core.session
    }

    /// Labels currently cached, without fetching.
    pub fn cached_labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    /// Properties currently cached, without fetching.
    pub fn cached_props(&self) -> Option<&PropertyMap> {
        self.core.props.as_ref()
    }

    /// Drop both cached snapshots.
    pub fn invalidate(&mut self) {
        self.core.invalidate();
        self.labels = None;
    }

    /// Re-read labels and properties from the backend.
    pub async fn refresh(&mut self) -> Result<()> {
        self.invalidate();
        self.labels().await?;
        self.core.props().await?;
        Ok(())
    }

    async fn write(&mut self, statement: Option<Statement>) -> Result<()> {
        if statement.is_some() {
            self.labels = None;
        }
        self.core.write(statement).await
    }

    // ── Labels ───────────────────────────────────────────────────

    pub async fn labels(&mut self) -> Result<&[String]> {
        if self.labels.is_none() {
            let fetched = self.fetch_labels().await?;
            self.labels = Some(fetched);
        }
        Ok(self.labels.get_or_insert_with(Vec::new).as_slice())
    }

    async fn fetch_labels(&self) -> Result<Vec<String>> {
        let raw = self.session().run_one(cypher::fetch_labels(self.id())).await?;
        let row = raw.rows.into_iter().next().ok_or(GraphError::NotFound {
            kind: "Node",
            id: self.id(),
        })?;
        match row.row.into_iter().next() {
            Some(Json::Array(labels)) => Ok(labels
                .into_iter()
                .filter_map(|l| l.as_str().map(str::to_string))
                .collect()),
            Some(Json::Null) | None => Ok(Vec::new()),
            Some(other) => Err(GraphError::Decode(format!(
                "expected a label list for node {}, got {other}",
                self.id()
            ))),
        }
    }

    pub async fn has_label(&mut self, label: &str) -> Result<bool> {
        Ok(self.labels().await?.iter().any(|l| l == label))
    }

    pub async fn add_labels<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        let statement = cypher::add_labels(self.id(), labels)?;
        self.write(statement).await
    }

    pub async fn remove_labels<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        let statement = cypher::remove_labels(self.id(), labels)?;
        self.write(statement).await
    }

    /// Make the node's labels exactly `labels`. Issues nothing when they already match.
    pub async fn set_labels<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        let current = self.labels().await?.to_vec();
        let statement = cypher::set_labels(self.id(), &current, labels)?;
        self.write(statement).await
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub async fn exists(&self) -> Result<bool> {
        self.core.exists().await
    }

    /// Delete the node together with its relationships, in one batch.
    pub async fn delete(&mut self) -> Result<()> {
        self.invalidate();
        self.session()
            .run(cypher::delete_node(self.id()).into())
            .await?;
        Ok(())
    }

    /// Create `self -[rel_type]-> to`.
    ///
    /// The proxy is built from what was requested plus the returned id; type
    /// and endpoints are immutable, so nothing is fetched back.
    pub async fn create_relationship(
        &self,
        rel_type: &str,
        to: &Node,
        props: PropertyMap,
    ) -> Result<Relationship> {
        let statement = cypher::create_relationship(self.id(), to.id(), rel_type, &props)?;
        let raw = self.session().run_one(statement).await?;
        let id = raw
            .rows
            .first()
            .and_then(|r| r.row.first())
            .and_then(Json::as_i64)
            .ok_or_else(|| {
                GraphError::Decode(format!(
                    "CREATE returned no relationship id for ({})-[{rel_type}]->({})",
                    self.id(),
                    to.id()
                ))
            })?;
        Ok(Relationship::from_parts(
            self.session().clone(),
            id,
            rel_type.to_string(),
            self.id(),
            to.id(),
            Some(props),
        ))
    }

    // ── Traversal ────────────────────────────────────────────────

    async fn matched(
        &self,
        spec: &MatchSpec,
        returns: MatchReturn,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let statement = cypher::match_related(self.id(), spec, returns, limit)?;
        let result = self
            .session()
            .query_with_wrap(statement, WrapLevel::Entity)
            .await?;
        Ok(result.column("result"))
    }

    fn single<T>(&self, mut found: Vec<T>) -> Result<Option<T>> {
        if found.len() > 1 {
            return Err(GraphError::AmbiguousMatch {
                node_id: self.id(),
                count: found.len(),
            });
        }
        Ok(found.pop())
    }

    /// Nodes at the other end of matching relationships.
    pub async fn nodes(&self, spec: &MatchSpec) -> Result<Vec<Node>> {
        self.matched(spec, MatchReturn::Nodes, None)
            .await?
            .into_iter()
            .map(expect_node)
            .collect()
    }

    pub async fn rels(&self, spec: &MatchSpec) -> Result<Vec<Relationship>> {
        self.matched(spec, MatchReturn::Relationships, None)
            .await?
            .into_iter()
            .map(expect_relationship)
            .collect()
    }

    /// The single related node, if any. More than one match is an error.
    pub async fn node(&self, spec: &MatchSpec) -> Result<Option<Node>> {
        let found = self
            .matched(spec, MatchReturn::Nodes, Some(2))
            .await?
            .into_iter()
            .map(expect_node)
            .collect::<Result<Vec<_>>>()?;
        self.single(found)
    }

    /// The single matching relationship, if any. More than one match is an error.
    pub async fn rel(&self, spec: &MatchSpec) -> Result<Option<Relationship>> {
        let found = self
            .matched(spec, MatchReturn::Relationships, Some(2))
            .await?
            .into_iter()
            .map(expect_relationship)
            .collect::<Result<Vec<_>>>()?;
        self.single(found)
    }

    pub async fn has_rel(&self, spec: &MatchSpec) -> Result<bool> {
        let found = self
            .matched(spec, MatchReturn::Relationships, Some(1))
            .await?;
        Ok(!found.is_empty())
    }
}

fn expect_node(value: Value) -> Result<Node> {
    match value {
        Value::Node(node) => Ok(node),
        other => Err(GraphError::Decode(format!("expected a node, got {other:?}"))),
    }
}

fn expect_relationship(value: Value) -> Result<Relationship> {
    match value {
        Value::Relationship(rel) => Ok(rel),
        other => Err(GraphError::Decode(format!(
            "expected a relationship, got {other:?}"
        ))),
    }
}

#[async_trait]
impl PropertyAccessor for Node {
    async fn props(&mut self) -> Result<&PropertyMap> {
        self.core.props().await
    }

    async fn set_property(&mut self, key: &str, value: Option<PropertyValue>) -> Result<()> {
        let statement = self.core.set_statement(key, value)?;
        self.write(statement).await
    }

    async fn remove_properties(&mut self, keys: &[&str]) -> Result<()> {
        let statement = self.core.remove_statement(keys)?;
        self.write(statement).await
    }

    async fn replace_props(&mut self, props: PropertyMap) -> Result<()> {
        let statement = self.core.replace_statement(&props)?;
        self.write(statement).await
    }

    async fn update_props(
        &mut self,
        changes: BTreeMap<String, Option<PropertyValue>>,
    ) -> Result<()> {
        let statement = self.core.update_statement(&changes)?;
        self.write(statement).await
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("labels", &self.labels)
            .field("props", &self.core.props)
            .finish()
    }
}
