//! Scripted in-memory adaptor for unit tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use graphwire_core::{ConstraintKind, GraphError, Result, WrapLevel};

use crate::adaptor::{Adaptor, AdaptorResponse, SchemaListing};
use crate::cypher::Statement;
use crate::response::{RawResult, RawRow};
use crate::session::Session;

type Responder = Box<dyn Fn(&Statement) -> Result<RawResult> + Send + Sync>;

/// One recorded `query` call.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub transaction_id: Option<u64>,
    pub commit: bool,
    pub statements: Vec<Statement>,
}

pub(crate) struct FakeAdaptor {
    calls: Mutex<Vec<Call>>,
    rollbacks: Mutex<Vec<u64>>,
    responder: Responder,
    failure: Mutex<Option<GraphError>>,
    short_next: Mutex<bool>,
    next_tx_id: AtomicU64,
}

impl FakeAdaptor {
    /// Adaptor answering every statement with an empty result.
    pub fn new() -> Arc<Self> {
        Self::with_responder(|_| Ok(RawResult::default()))
    }

    pub fn with_responder<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&Statement) -> Result<RawResult> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            rollbacks: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            failure: Mutex::new(None),
            short_next: Mutex::new(false),
            next_tx_id: AtomicU64::new(1),
        })
    }

    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(self.clone(), WrapLevel::Entity)
    }

    /// Fail the next `query` call with `err`.
    pub fn fail_next(&self, err: GraphError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Answer the next `query` call with one result fewer than statements.
    pub fn short_results_next(&self) {
        *self.short_next.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Text of every statement sent so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .flat_map(|c| c.statements.iter().map(|s| s.text().to_string()))
            .collect()
    }

    pub fn rollbacks(&self) -> Vec<u64> {
        self.rollbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Adaptor for FakeAdaptor {
    async fn query(
        &self,
        transaction_id: Option<u64>,
        statements: &[Statement],
        commit: bool,
    ) -> Result<AdaptorResponse> {
        self.calls.lock().unwrap().push(Call {
            transaction_id,
            commit,
            statements: statements.to_vec(),
        });
        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }

        let mut results = statements
            .iter()
            .map(|s| (self.responder)(s))
            .collect::<Result<Vec<_>>>()?;
        if std::mem::take(&mut *self.short_next.lock().unwrap()) {
            results.pop();
        }
        let transaction_id = (transaction_id.is_none() && !commit)
            .then(|| self.next_tx_id.fetch_add(1, Ordering::SeqCst));
        Ok(AdaptorResponse {
            results,
            transaction_id,
        })
    }

    async fn rollback(&self, transaction_id: u64) -> Result<()> {
        self.rollbacks.lock().unwrap().push(transaction_id);
        Ok(())
    }

    async fn indexes(&self, label: Option<&str>) -> Result<SchemaListing> {
        Ok(SchemaListing::from_entries(Vec::new(), label.is_some()))
    }

    async fn constraints(
        &self,
        label: Option<&str>,
        _kind: Option<ConstraintKind>,
    ) -> Result<SchemaListing> {
        Ok(SchemaListing::from_entries(Vec::new(), label.is_some()))
    }

    async fn version(&self) -> Result<String> {
        Ok("4.4.0".to_string())
    }
}

// ── Result Builders ──────────────────────────────────────────────

/// Result whose rows carry plain data in both encodings.
pub(crate) fn rows(columns: &[&str], rows: Vec<Vec<Json>>) -> RawResult {
    RawResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows: rows
            .into_iter()
            .map(|row| RawRow {
                rest: row.clone(),
                row,
            })
            .collect(),
    }
}

/// Result with one entity column, each row given as its REST encoding.
pub(crate) fn entity_rows(column: &str, entities: Vec<Json>) -> RawResult {
    RawResult {
        columns: vec![column.to_string()],
        rows: entities
            .into_iter()
            .map(|rest| RawRow {
                row: vec![rest.get("data").cloned().unwrap_or(Json::Null)],
                rest: vec![rest],
            })
            .collect(),
    }
}

pub(crate) fn node_rest(id: i64, labels: &[&str], data: Json) -> Json {
    json!({
        "self": format!("http://localhost:7474/db/data/node/{id}"),
        "data": data,
        "metadata": {"id": id, "labels": labels},
    })
}

pub(crate) fn rel_rest(id: i64, rel_type: &str, start: i64, end: i64, data: Json) -> Json {
    json!({
        "self": format!("http://localhost:7474/db/data/relationship/{id}"),
        "start": format!("http://localhost:7474/db/data/node/{start}"),
        "end": format!("http://localhost:7474/db/data/node/{end}"),
        "type": rel_type,
        "data": data,
        "metadata": {"id": id, "type": rel_type},
    })
}
