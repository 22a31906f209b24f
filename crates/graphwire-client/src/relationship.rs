//! Relationship proxy.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use graphwire_core::{PropertyMap, PropertyValue, Result};

use crate::cypher::{self, EntityRef, Statement};
use crate::node::Node;
use crate::property::{EntityCore, PropertyAccessor};
use crate::session::Session;

/// A relationship. Type and endpoints are fixed at creation and never refetched.
#[derive(Clone)]
pub struct Relationship {
    core: EntityCore,
    rel_type: String,
    start_id: i64,
    end_id: i64,
}

impl Relationship {
    pub(crate) fn from_parts(
        session: Session,
        id: i64,
        rel_type: String,
        start_id: i64,
        end_id: i64,
        props: Option<PropertyMap>,
    ) -> Self {
        Self {
            core: EntityCore::new(session, EntityRef::Relationship(id), props),
            rel_type,
            start_id,
            end_id,
        }
    }

    pub fn id(&self) -> i64 {
        self.core.id()
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn start_node_id(&self) -> i64 {
        self.start_id
    }

    pub fn end_node_id(&self) -> i64 {
        self.end_id
    }

    pub fn start_node(&self) -> Node {
        self.core.session.node(self.start_id)
    }

    pub fn end_node(&self) -> Node {
        self.core.session.node(self.end_id)
    }

    /// The endpoint opposite `node`, or `None` when `node` is not an endpoint.
    pub fn other_node(&self, node: &Node) -> Option<Node> {
        if node.id() == self.start_id {
            Some(self.end_node())
        } else if node.id() == self.end_id {
            Some(self.start_node())
        } else {
            None
        }
    }

    pub fn cached_props(&self) -> Option<&PropertyMap> {
        self.core.props.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.core.invalidate();
    }

    pub async fn exists(&self) -> Result<bool> {
        self.core.exists().await
    }

    pub async fn delete(&mut self) -> Result<()> {
        self.core
            .write(Some(cypher::delete_relationship(self.id())))
            .await
    }

    async fn write(&mut self, statement: Option<Statement>) -> Result<()> {
        self.core.write(statement).await
    }
}

#[async_trait]
impl PropertyAccessor for Relationship {
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

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Relationship {}

impl Hash for Relationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("id", &self.id())
            .field("type", &self.rel_type)
            .field("start", &self.start_id)
            .field("end", &self.end_id)
            .field("props", &self.core.props)
            .finish()
    }
}
