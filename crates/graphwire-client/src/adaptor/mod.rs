//! Backend adaptors.
//!
//! An adaptor executes a batch of statements against a backend, optionally
//! inside a server-side transaction, and exposes schema introspection. The
//! HTTP adaptor speaks the transactional REST endpoint; the Bolt adaptor
//! satisfies the same contract over neo4rs.

pub mod bolt;
pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use graphwire_core::{ConstraintKind, Result};

use crate::cypher::Statement;
use crate::response::RawResult;

pub use bolt::BoltAdaptor;
pub use http::{HttpAdaptor, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Outcome of one batch request.
#[derive(Debug, Default)]
pub struct AdaptorResponse {
    /// One result per submitted statement, in order.
    pub results: Vec<RawResult>,
    /// Transaction id assigned by the backend when the batch opened one.
    pub transaction_id: Option<u64>,
}

/// Contract every backend satisfies.
#[async_trait]
pub trait Adaptor: Send + Sync {
    /// Run `statements` as one request.
    ///
    /// With no `transaction_id` and `commit` unset, the backend opens a
    /// transaction and reports its id. With `commit` set, the transaction
    /// (or an implicit one) is committed after the statements run.
    async fn query(
        &self,
        transaction_id: Option<u64>,
        statements: &[Statement],
        commit: bool,
    ) -> Result<AdaptorResponse>;

    /// Roll back an open server-side transaction.
    async fn rollback(&self, transaction_id: u64) -> Result<()>;

    async fn indexes(&self, label: Option<&str>) -> Result<SchemaListing>;

    async fn constraints(
        &self,
        label: Option<&str>,
        kind: Option<ConstraintKind>,
    ) -> Result<SchemaListing>;

    /// Server version string.
    async fn version(&self) -> Result<String>;
}

// ── Schema ───────────────────────────────────────────────────────

/// One index or constraint as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaEntry {
    pub label: String,
    pub property_keys: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Index or constraint listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SchemaListing {
    /// Global listing: label to the property-key sets indexed under it.
    ByLabel(BTreeMap<String, Vec<Vec<String>>>),
    /// Listing scoped to a single label.
    ForLabel(Vec<Vec<String>>),
}

impl SchemaListing {
    /// Group entries by label, or flatten them when the request was label-scoped.
    pub fn from_entries(entries: Vec<SchemaEntry>, label_scoped: bool) -> Self {
        if label_scoped {
            return Self::ForLabel(entries.into_iter().map(|e| e.property_keys).collect());
        }
        let mut grouped: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for entry in entries {
            grouped
                .entry(entry.label)
                .or_default()
                .push(entry.property_keys);
        }
        Self::ByLabel(grouped)
    }

    /// Property-key sets recorded for `label`.
    pub fn for_label(&self, label: &str) -> Vec<Vec<String>> {
        match self {
            Self::ByLabel(map) => map.get(label).cloned().unwrap_or_default(),
            Self::ForLabel(list) => list.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::ByLabel(map) => map.is_empty(),
            Self::ForLabel(list) => list.is_empty(),
        }
    }
}
