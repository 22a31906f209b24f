//! Sessions and explicit transactions.
//!
//! A [`Session`] owns the adaptor and at most one active explicit
//! transaction. While a [`Transaction`] is attached, every statement issued
//! through the session (including those from entity proxies) runs inside it;
//! otherwise each call is an autocommit request.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use graphwire_core::types::props_from_json;
use graphwire_core::{
    Backend, ConnectionConfig, ConstraintKind, GraphError, PropertyMap, Result, WrapLevel,
};

use crate::adaptor::{Adaptor, BoltAdaptor, HttpAdaptor, SchemaListing};
use crate::cypher::{self, Statement};
use crate::node::Node;
use crate::relationship::Relationship;
use crate::response::{self, RawResult};
use crate::transaction::{TransactionCoordinator, TransactionState};
use crate::value::{QueryResult, Value};

type SharedCoordinator = Arc<AsyncMutex<TransactionCoordinator>>;

/// Handle to a backend connection. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    adaptor: Arc<dyn Adaptor>,
    wrap_level: WrapLevel,
    active: Mutex<Option<SharedCoordinator>>,
}

impl Session {
    pub fn new(adaptor: Arc<dyn Adaptor>, wrap_level: WrapLevel) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                adaptor,
                wrap_level,
                active: Mutex::new(None),
            }),
        }
    }

    /// Open a session using the backend selected by the configured URL.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let backend = config.backend()?;
        let adaptor: Arc<dyn Adaptor> = match backend {
            Backend::Http => Arc::new(HttpAdaptor::connect(config)?),
            Backend::Bolt => Arc::new(BoltAdaptor::connect(config).await?),
        };
        let session = Self::new(adaptor, config.wrap_level);
        tracing::info!(
            session = %session.id(),
            url = %config.url,
            backend = ?backend,
            "Session connected"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn wrap_level(&self) -> WrapLevel {
        self.inner.wrap_level
    }

    pub fn adaptor(&self) -> &Arc<dyn Adaptor> {
        &self.inner.adaptor
    }

    // ── Statement Execution ──────────────────────────────────────

    fn active(&self) -> Option<SharedCoordinator> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn detach(&self, coordinator: &SharedCoordinator) {
        let mut slot = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, coordinator)) {
            *slot = None;
        }
    }

    /// Run statements in the active transaction, or as one autocommit request.
    pub(crate) async fn run(&self, statements: Vec<Statement>) -> Result<Vec<RawResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(coordinator) = self.active() {
            return coordinator.lock().await.execute(statements).await;
        }

        tracing::debug!(session = %self.id(), statements = statements.len(), "Autocommit request");
        let response = self.inner.adaptor.query(None, &statements, true).await?;
        if response.results.len() != statements.len() {
            return Err(GraphError::Decode(format!(
                "expected {} results, got {}",
                statements.len(),
                response.results.len()
            )));
        }
        Ok(response.results)
    }

    /// Run a single statement and return its raw result.
    pub(crate) async fn run_one(&self, statement: Statement) -> Result<RawResult> {
        self.run(vec![statement])
            .await?
            .pop()
            .ok_or_else(|| GraphError::Decode("missing statement result".to_string()))
    }

    fn decode_all(&self, raw: Vec<RawResult>, wrap: WrapLevel) -> Result<Vec<QueryResult>> {
        raw.into_iter()
            .map(|r| response::decode(self, r, wrap))
            .collect()
    }

    pub async fn query(&self, statement: Statement) -> Result<QueryResult> {
        self.query_with_wrap(statement, self.wrap_level()).await
    }

    pub async fn query_with_wrap(
        &self,
        statement: Statement,
        wrap: WrapLevel,
    ) -> Result<QueryResult> {
        let raw = self.run_one(statement).await?;
        response::decode(self, raw, wrap)
    }

    /// Run several statements in one request; results keep statement order.
    pub async fn query_batch(&self, statements: Vec<Statement>) -> Result<Vec<QueryResult>> {
        let raw = self.run(statements).await?;
        self.decode_all(raw, self.wrap_level())
    }

    // ── Transactions ─────────────────────────────────────────────

    /// Begin an explicit transaction and make it the session's active one.
    ///
    /// No request is made until the first statement is flushed.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        let mut slot = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(GraphError::TransactionActive);
        }
        let mut coordinator = TransactionCoordinator::new(self.inner.adaptor.clone());
        coordinator.begin()?;
        let coordinator = Arc::new(AsyncMutex::new(coordinator));
        *slot = Some(coordinator.clone());
        tracing::debug!(session = %self.id(), "Transaction begun");

        Ok(Transaction {
            session: self.clone(),
            coordinator,
            attached: true,
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.active().is_some()
    }

    // ── Entities ─────────────────────────────────────────────────

    /// Create a node and return a proxy populated with what was written.
    pub async fn create_node<S: AsRef<str>>(
        &self,
        labels: &[S],
        props: PropertyMap,
    ) -> Result<Node> {
        let mut label_names: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            if !label_names.iter().any(|l| l == label) {
                label_names.push(label.to_string());
            }
        }
        let statement = cypher::create_node(&label_names, &props)?;
        let result = self.query_with_wrap(statement, WrapLevel::None).await?;
        let id = result
            .first_value()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| GraphError::Decode("CREATE returned no node id".to_string()))?;

        Ok(Node::from_parts(self.clone(), id, Some(label_names), Some(props)))
    }

    /// Lazy proxy for a node id; nothing is fetched until a read needs it.
    pub fn node(&self, id: i64) -> Node {
        Node::from_parts(self.clone(), id, None, None)
    }

    /// Fetch a node with its labels and properties.
    pub async fn load_node(&self, id: i64) -> Result<Node> {
        let result = self
            .query_with_wrap(cypher::load_node(id), WrapLevel::Entity)
            .await?;
        result
            .first_value()
            .and_then(Value::into_node)
            .ok_or(GraphError::NotFound { kind: "Node", id })
    }

    pub async fn load_relationship(&self, id: i64) -> Result<Relationship> {
        let raw = self.run_one(cypher::load_relationship(id)).await?;
        let row = raw
            .rows
            .into_iter()
            .next()
            .ok_or(GraphError::NotFound {
                kind: "Relationship",
                id,
            })?;

        let field = |name: &str| {
            raw.columns
                .iter()
                .position(|c| c == name)
                .and_then(|i| row.row.get(i))
                .ok_or_else(|| GraphError::Decode(format!("relationship row without {name}")))
        };
        let int = |name: &str| {
            field(name)?
                .as_i64()
                .ok_or_else(|| GraphError::Decode(format!("relationship {name} is not an integer")))
        };
        let rel_type = field("type")?
            .as_str()
            .ok_or_else(|| GraphError::Decode("relationship type is not a string".to_string()))?
            .to_string();
        let props = match field("props")?.as_object() {
            Some(object) => props_from_json(object)?,
            None => PropertyMap::new(),
        };

        Ok(Relationship::from_parts(
            self.clone(),
            int("id")?,
            rel_type,
            int("start")?,
            int("end")?,
            Some(props),
        ))
    }

    // ── Schema ───────────────────────────────────────────────────

    pub async fn indexes(&self, label: Option<&str>) -> Result<SchemaListing> {
        self.inner.adaptor.indexes(label).await
    }

    pub async fn constraints(
        &self,
        label: Option<&str>,
        kind: Option<ConstraintKind>,
    ) -> Result<SchemaListing> {
        self.inner.adaptor.constraints(label, kind).await
    }

    pub async fn version(&self) -> Result<String> {
        self.inner.adaptor.version().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("wrap_level", &self.inner.wrap_level)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

// ── Transaction Handle ───────────────────────────────────────────

/// Explicit transaction attached to a session.
///
/// Commit and rollback detach it from the session once they succeed. A
/// failed commit leaves it attached so the caller can roll back.
pub struct Transaction {
    session: Session,
    coordinator: SharedCoordinator,
    attached: bool,
}

impl Transaction {
    pub async fn state(&self) -> TransactionState {
        self.coordinator.lock().await.state()
    }

    /// Server-assigned id, once the first flush has happened.
    pub async fn id(&self) -> Option<u64> {
        self.coordinator.lock().await.id()
    }

    /// Add statements to the pending batch without sending them.
    pub async fn queue(&self, statements: Vec<Statement>) -> Result<()> {
        self.coordinator.lock().await.queue(statements)
    }

    /// Send the pending batch and decode its results.
    pub async fn flush(&self) -> Result<Vec<QueryResult>> {
        let raw = self.coordinator.lock().await.flush().await?;
        self.session.decode_all(raw, self.session.wrap_level())
    }

    /// Queue and flush `statements`, returning their results.
    pub async fn execute(&self, statements: Vec<Statement>) -> Result<Vec<QueryResult>> {
        let raw = self.coordinator.lock().await.execute(statements).await?;
        self.session.decode_all(raw, self.session.wrap_level())
    }

    pub async fn query(&self, statement: Statement) -> Result<QueryResult> {
        self.execute(vec![statement])
            .await?
            .pop()
            .ok_or_else(|| GraphError::Decode("missing statement result".to_string()))
    }

    /// Flush anything pending and commit, returning the results of the final batch.
    pub async fn commit(&mut self) -> Result<Vec<QueryResult>> {
        let (raw, state) = {
            let mut coordinator = self.coordinator.lock().await;
            let raw = coordinator.commit().await;
            (raw, coordinator.state())
        };
        if state.is_terminal() {
            self.detach();
        }
        self.session.decode_all(raw?, self.session.wrap_level())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.coordinator.lock().await.rollback().await?;
        self.detach();
        Ok(())
    }

    fn detach(&mut self) {
        if self.attached {
            self.session.detach(&self.coordinator);
            self.attached = false;
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.attached {
            tracing::warn!(
                session = %self.session.id(),
                "Transaction dropped while open; detaching without commit"
            );
            self.detach();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("session", &self.session.id())
            .field("attached", &self.attached)
            .finish()
    }
}
