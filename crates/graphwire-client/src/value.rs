//! Decoded query results.

use std::sync::Arc;

use serde_json::{json, Value as Json};

use graphwire_core::types::props_to_json;

use crate::node::Node;
use crate::relationship::Relationship;

/// One decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Scalar, list or map taken from the row encoding.
    Data(Json),
    Node(Node),
    Relationship(Relationship),
    /// Entity metadata left undecoded (wrap level `none`).
    Rest(Json),
}

impl Value {
    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Self::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(Json::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Json::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(Json::as_bool)
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<Node> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Self::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_relationship(self) -> Option<Relationship> {
        match self {
            Self::Relationship(r) => Some(r),
            _ => None,
        }
    }

    /// JSON view for printing. Entities show whatever their proxies have cached.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Data(v) | Self::Rest(v) => v.clone(),
            Self::Node(n) => json!({
                "id": n.id(),
                "labels": n.cached_labels(),
                "properties": n.cached_props().map(props_to_json),
            }),
            Self::Relationship(r) => json!({
                "id": r.id(),
                "type": r.rel_type(),
                "start": r.start_node_id(),
                "end": r.end_node_id(),
                "properties": r.cached_props().map(props_to_json),
            }),
        }
    }
}

/// A row: declared column alias to decoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.columns
                .iter()
                .zip(&self.values)
                .map(|(c, v)| (c.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Ordered rows returned by one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    columns: Arc<[String]>,
    rows: Vec<Row>,
}

impl QueryResult {
    pub(crate) fn new(columns: Arc<[String]>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column across all rows.
    pub fn column(self, name: &str) -> Vec<Value> {
        self.rows
            .into_iter()
            .filter_map(|row| {
                let idx = row.columns.iter().position(|c| c == name)?;
                row.values.into_iter().nth(idx)
            })
            .collect()
    }

    /// First value of the first row, if any.
    pub fn first_value(self) -> Option<Value> {
        self.rows.into_iter().next()?.values.into_iter().next()
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
