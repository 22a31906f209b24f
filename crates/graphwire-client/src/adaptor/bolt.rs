//! Bolt adaptor over neo4rs.
//!
//! Rows are converted into the same row/REST pair the HTTP endpoint
//! returns, so one decoder serves both backends. Physical transactions are
//! neo4rs [`Txn`]s held in a table keyed by ids this adaptor hands out.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use neo4rs::{BoltType, ConfigBuilder, Graph, Query, Txn};
use serde_json::{json, Map, Value as Json};
use tokio::sync::Mutex;

use graphwire_core::{ConnectionConfig, ConstraintKind, GraphError, Result};

use super::{Adaptor, AdaptorResponse, SchemaEntry, SchemaListing};
use crate::cypher::Statement;
use crate::response::{RawResult, RawRow};

pub struct BoltAdaptor {
    graph: Graph,
    transactions: Mutex<HashMap<u64, Txn>>,
    next_id: AtomicU64,
}

impl BoltAdaptor {
    /// Connect with the pool settings from `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.url)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Transport(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Transport(e.to_string()))?;

        tracing::info!(uri = %config.url, "Connected over Bolt");
        Ok(Self {
            graph,
            transactions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    async fn run_batch(txn: &mut Txn, statements: &[Statement]) -> Result<Vec<RawResult>> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            let query = to_query(statement)?;
            let mut columns = return_columns(statement.text());
            let from_text = !needs_row_keys(&columns);
            let mut stream = txn.execute(query).await.map_err(execution_error)?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next(txn.handle()).await.map_err(execution_error)? {
                if !from_text && rows.is_empty() {
                    columns = row_keys(&row)?;
                }
                rows.push(convert_row(&row, &columns));
            }
            if !from_text && rows.is_empty() {
                columns.clear();
            }
            results.push(RawResult { columns, rows });
        }
        Ok(results)
    }

    async fn take_transaction(&self, id: u64) -> Result<Txn> {
        self.transactions
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| GraphError::QueryExecution {
                code: "Neo.ClientError.Transaction.TransactionNotFound".to_string(),
                message: format!("Unrecognized transaction id {id}"),
            })
    }

    async fn fetch_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await.map_err(execution_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(execution_error)? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn schema_entries(&self, query: Query) -> Result<Vec<SchemaEntry>> {
        let rows = self.fetch_rows(query).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let labels: Vec<String> = row.get("labelsOrTypes").unwrap_or_default();
            let property_keys: Vec<String> = row.get("properties").unwrap_or_default();
            let kind: Option<String> = row.get("type").ok();
            for label in labels {
                entries.push(SchemaEntry {
                    label,
                    property_keys: property_keys.clone(),
                    kind: kind.clone(),
                });
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl Adaptor for BoltAdaptor {
    async fn query(
        &self,
        transaction_id: Option<u64>,
        statements: &[Statement],
        commit: bool,
    ) -> Result<AdaptorResponse> {
        let (mut txn, assigned) = match transaction_id {
            Some(id) => (self.take_transaction(id).await?, None),
            None => {
                let txn = self
                    .graph
                    .start_txn()
                    .await
                    .map_err(|e| GraphError::Transport(e.to_string()))?;
                let assigned = (!commit).then(|| self.next_id.fetch_add(1, Ordering::SeqCst));
                (txn, assigned)
            }
        };

        let started = std::time::Instant::now();
        let results = match Self::run_batch(&mut txn, statements).await {
            Ok(results) => results,
            Err(e) => {
                // The server rolls back a transaction whose statement failed.
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(
                        error = %rollback,
                        "Rollback after failed statement did not complete"
                    );
                }
                return Err(e);
            }
        };
        tracing::debug!(
            statements = statements.len(),
            commit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bolt batch executed"
        );

        if commit {
            txn.commit().await.map_err(execution_error)?;
        } else {
            let id = transaction_id.or(assigned).unwrap_or_default();
            self.transactions.lock().await.insert(id, txn);
        }

        Ok(AdaptorResponse {
            results,
            transaction_id: assigned,
        })
    }

    async fn rollback(&self, transaction_id: u64) -> Result<()> {
        let txn = self.take_transaction(transaction_id).await?;
        txn.rollback().await.map_err(execution_error)
    }

    async fn indexes(&self, label: Option<&str>) -> Result<SchemaListing> {
        let mut text = String::from(
            "SHOW INDEXES YIELD labelsOrTypes, properties, type, entityType \
             WHERE entityType = 'NODE' AND type <> 'LOOKUP'",
        );
        if label.is_some() {
            text.push_str(" AND $label IN labelsOrTypes");
        }
        text.push_str(" RETURN labelsOrTypes, properties, type");
        let mut query = neo4rs::query(&text);
        if let Some(label) = label {
            query = query.param("label", label);
        }
        let entries = self.schema_entries(query).await?;
        let entries = filter_label(entries, label);
        Ok(SchemaListing::from_entries(entries, label.is_some()))
    }

    async fn constraints(
        &self,
        label: Option<&str>,
        kind: Option<ConstraintKind>,
    ) -> Result<SchemaListing> {
        let entries = self
            .schema_entries(neo4rs::query(&constraints_query(kind)))
            .await?;
        let entries = filter_label(entries, label);
        Ok(SchemaListing::from_entries(entries, label.is_some()))
    }

    async fn version(&self) -> Result<String> {
        let rows = self
            .fetch_rows(neo4rs::query(
                "CALL dbms.components() YIELD versions RETURN versions[0] AS version",
            ))
            .await?;
        rows.first()
            .and_then(|row| row.get::<String>("version").ok())
            .ok_or_else(|| GraphError::Decode("server reported no version".to_string()))
    }
}

fn constraints_query(kind: Option<ConstraintKind>) -> String {
    let mut text = String::from(
        "SHOW CONSTRAINTS YIELD labelsOrTypes, properties, type, entityType \
         WHERE entityType = 'NODE'",
    );
    if let Some(kind) = kind {
        text.push_str(&format!(" AND type ENDS WITH '{}'", kind.wire_name()));
    }
    text.push_str(" RETURN labelsOrTypes, properties, type");
    text
}

fn filter_label(entries: Vec<SchemaEntry>, label: Option<&str>) -> Vec<SchemaEntry> {
    match label {
        Some(label) => entries.into_iter().filter(|e| e.label == label).collect(),
        None => entries,
    }
}

fn execution_error(e: neo4rs::Error) -> GraphError {
    GraphError::QueryExecution {
        code: "Neo.Bolt".to_string(),
        message: e.to_string(),
    }
}

// ── Parameters ───────────────────────────────────────────────────

fn to_query(statement: &Statement) -> Result<Query> {
    statement
        .parameters()
        .iter()
        .try_fold(
            neo4rs::query(statement.text()),
            |q, (key, value)| -> Result<Query> { Ok(q.param(key, json_to_bolt(key, value)?)) },
        )
}

fn json_to_bolt(key: &str, value: &Json) -> Result<BoltType> {
    BoltType::try_from(value.clone()).map_err(|e| GraphError::invalid_value(key, e.to_string()))
}

// ── Rows ─────────────────────────────────────────────────────────

/// `CALL` without `YIELD ... RETURN` and `RETURN *` name no columns in the text.
fn needs_row_keys(columns: &[String]) -> bool {
    columns.is_empty() || columns.iter().any(|c| c == "*")
}

fn row_keys(row: &neo4rs::Row) -> Result<Vec<String>> {
    let fields: BTreeMap<String, BoltType> = row
        .to()
        .map_err(|e| GraphError::Decode(format!("unreadable Bolt row: {e}")))?;
    Ok(fields.into_keys().collect())
}

fn convert_row(row: &neo4rs::Row, columns: &[String]) -> RawRow {
    let mut raw = RawRow::default();
    for column in columns {
        let (data, rest) = convert_value(row, column);
        raw.row.push(data);
        raw.rest.push(rest);
    }
    raw
}

/// Row-format value and REST-format value for one column.
fn convert_value(row: &neo4rs::Row, column: &str) -> (Json, Json) {
    if let Ok(node) = row.get::<neo4rs::Node>(column) {
        let mut data = Map::new();
        for key in node.keys() {
            let key = key.to_string();
            if let Ok(value) = node.get::<Json>(&key) {
                data.insert(key, value);
            }
        }
        let labels: Vec<String> = node.labels().into_iter().map(|l| l.to_string()).collect();
        let id = node.id();
        let rest = json!({
            "self": format!("node/{id}"),
            "data": data,
            "metadata": {"id": id, "labels": labels},
        });
        return (Json::Object(data), rest);
    }
    if let Ok(rel) = row.get::<neo4rs::Relation>(column) {
        let mut data = Map::new();
        for key in rel.keys() {
            let key = key.to_string();
            if let Ok(value) = rel.get::<Json>(&key) {
                data.insert(key, value);
            }
        }
        let id = rel.id();
        let rel_type = rel.typ().to_string();
        let rest = json!({
            "self": format!("relationship/{id}"),
            "start": format!("node/{}", rel.start_node_id()),
            "end": format!("node/{}", rel.end_node_id()),
            "type": rel_type,
            "data": data,
            "metadata": {"id": id, "type": rel_type},
        });
        return (Json::Object(data), rest);
    }
    let value = row.get::<Json>(column).unwrap_or(Json::Null);
    (value.clone(), value)
}

/// Column names of a statement's final RETURN clause.
///
/// Bolt rows do not carry the declared order of their fields, so the
/// aliases are read back from the statement text.
pub(crate) fn return_columns(text: &str) -> Vec<String> {
    let upper = text.to_ascii_uppercase();
    let Some(pos) = find_last_keyword(&upper, "RETURN") else {
        return Vec::new();
    };
    let mut clause = &text[pos + "RETURN".len()..];
    let clause_upper = &upper[pos + "RETURN".len()..];
    for tail in ["ORDER BY", "SKIP", "LIMIT"] {
        if let Some(end) = find_last_keyword(clause_upper, tail) {
            if end < clause.len() {
                clause = &clause[..end];
            }
        }
    }
    let clause = clause.trim();
    let clause = clause
        .strip_prefix("DISTINCT ")
        .or_else(|| clause.strip_prefix("distinct "))
        .unwrap_or(clause);

    split_top_level(clause)
        .into_iter()
        .map(|item| {
            let item = item.trim();
            let item_upper = item.to_ascii_uppercase();
            let name = match find_last_keyword(&item_upper, "AS") {
                Some(at) => item[at + 2..].trim(),
                None => item,
            };
            name.trim_matches('`').to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Byte offset of the last whole-word occurrence of `keyword`.
fn find_last_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'$');
    haystack.rmatch_indices(keyword).map(|(i, _)| i).find(|&i| {
        let before = i == 0 || !is_word(bytes[i - 1]);
        let end = i + keyword.len();
        let after = end >= bytes.len() || !is_word(bytes[end]);
        before && after
    })
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(clause: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in clause.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&clause[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&clause[start..]);
    parts
}
