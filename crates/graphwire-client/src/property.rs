//! Property access shared by nodes and relationships.
//!
//! Every entity keeps a lazily fetched property snapshot. Reads are served
//! from the snapshot; every write drops it so the next read fetches the
//! backend's state again.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as Json;

use graphwire_core::types::props_from_json;
use graphwire_core::{GraphError, PropertyMap, PropertyValue, Result};

use crate::cypher::{self, EntityRef, Statement};
use crate::session::Session;

/// Typed property operations implemented by every entity proxy.
///
/// Each write runs inside the session's active transaction when there is
/// one, and as an autocommit request otherwise.
#[async_trait]
pub trait PropertyAccessor: Send {
    /// Full property snapshot, fetched on first use.
    async fn props(&mut self) -> Result<&PropertyMap>;

    /// Set `key`; `None` removes it.
    async fn set_property(&mut self, key: &str, value: Option<PropertyValue>) -> Result<()>;

    /// Remove keys. Absent keys are ignored by the backend.
    async fn remove_properties(&mut self, keys: &[&str]) -> Result<()>;

    /// Replace the whole property map.
    async fn replace_props(&mut self, props: PropertyMap) -> Result<()>;

    /// Set and remove several keys in one statement. `None` values remove.
    async fn update_props(
        &mut self,
        changes: BTreeMap<String, Option<PropertyValue>>,
    ) -> Result<()>;

    async fn get_property(&mut self, key: &str) -> Result<Option<PropertyValue>> {
        Ok(self.props().await?.get(key).cloned())
    }

    async fn has_property(&mut self, key: &str) -> Result<bool> {
        Ok(self.props().await?.contains_key(key))
    }

    async fn remove_property(&mut self, key: &str) -> Result<()> {
        self.remove_properties(&[key]).await
    }

    /// Set from dynamically typed input, validating it against the value domain.
    async fn set_json(&mut self, key: &str, value: &Json) -> Result<()> {
        let value = PropertyValue::from_json(key, value)?;
        self.set_property(key, value).await
    }
}

/// State every entity proxy carries: its session, its address and the property cache.
#[derive(Clone)]
pub(crate) struct EntityCore {
    pub session: Session,
    pub entity: EntityRef,
    pub props: Option<PropertyMap>,
}

impl EntityCore {
    pub fn new(session: Session, entity: EntityRef, props: Option<PropertyMap>) -> Self {
        Self {
            session,
            entity,
            props,
        }
    }

    pub fn id(&self) -> i64 {
        self.entity.id()
    }

    pub fn invalidate(&mut self) {
        self.props = None;
    }

    pub async fn props(&mut self) -> Result<&PropertyMap> {
        if self.props.is_none() {
            let fetched = self.fetch_props().await?;
            self.props = Some(fetched);
        }
        Ok(&*self.props.get_or_insert_with(PropertyMap::new))
    }

    async fn fetch_props(&self) -> Result<PropertyMap> {
        let raw = self
            .session
            .run_one(cypher::fetch_properties(self.entity))
            .await?;
        let row = raw.rows.into_iter().next().ok_or(GraphError::NotFound {
            kind: self.entity.kind(),
            id: self.id(),
        })?;
        match row.row.into_iter().next() {
            Some(Json::Object(map)) => props_from_json(&map),
            Some(Json::Null) | None => Ok(PropertyMap::new()),
            Some(other) => Err(GraphError::Decode(format!(
                "expected a property map for {} {}, got {other}",
                self.entity.kind(),
                self.id()
            ))),
        }
    }

    /// Probe whether the entity still exists.
    pub async fn exists(&self) -> Result<bool> {
        let raw = self.session.run_one(cypher::exists(self.entity)).await?;
        Ok(!raw.rows.is_empty())
    }

    // ── Statement builders ───────────────────────────────────────

    pub fn set_statement(
        &self,
        key: &str,
        value: Option<PropertyValue>,
    ) -> Result<Option<Statement>> {
        match value {
            Some(value) => cypher::set_property(self.entity, key, &value).map(Some),
            None => cypher::remove_properties(self.entity, &[key]),
        }
    }

    pub fn remove_statement(&self, keys: &[&str]) -> Result<Option<Statement>> {
        cypher::remove_properties(self.entity, keys)
    }

    pub fn replace_statement(&self, props: &PropertyMap) -> Result<Option<Statement>> {
        cypher::replace_properties(self.entity, props).map(Some)
    }

    pub fn update_statement(
        &self,
        changes: &BTreeMap<String, Option<PropertyValue>>,
    ) -> Result<Option<Statement>> {
        cypher::update_properties(self.entity, changes)
    }

    /// Drop the cache, then run the statement. `None` is a no-op.
    pub async fn write(&mut self, statement: Option<Statement>) -> Result<()> {
        let Some(statement) = statement else {
            return Ok(());
        };
        self.invalidate();
        self.session.run(vec![statement]).await?;
        Ok(())
    }
}
