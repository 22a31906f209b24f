//! Core domain types shared by every graphwire backend.
//!
//! Property values are drawn from a closed domain: strings, integers,
//! floats, booleans and homogeneous arrays of one of these. Absence is
//! modelled with `Option`, never with a stored null marker.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{GraphError, Result};

// ── Property Values ───────────────────────────────────────────────

/// A single property value accepted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(PropertyArray),
}

/// A homogeneous array property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyArray {
    Bool(Vec<bool>),
    Integer(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
}

/// Mapping from property key to value. Keys with no value are simply absent.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// Convert a dynamically-typed JSON value into the property domain.
    ///
    /// `null` maps to `None` (the property does not exist). Objects, nested
    /// arrays and arrays mixing element kinds are rejected.
    pub fn from_json(key: &str, value: &Json) -> Result<Option<Self>> {
        let converted = match value {
            Json::Null => return Ok(None),
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(
                    n.as_f64()
                        .ok_or_else(|| GraphError::invalid_value(key, "number out of range"))?,
                ),
            },
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::Array(PropertyArray::from_json(key, items)?),
            Json::Object(_) => {
                return Err(GraphError::invalid_value(
                    key,
                    "maps are not valid property values",
                ))
            }
        };
        converted.validate(key)?;
        Ok(Some(converted))
    }

    /// Reject values the backend cannot store (non-finite floats).
    pub fn validate(&self, key: &str) -> Result<()> {
        let finite = match self {
            Self::Float(f) => f.is_finite(),
            Self::Array(PropertyArray::Float(items)) => items.iter().all(|f| f.is_finite()),
            _ => true,
        };
        if finite {
            Ok(())
        } else {
            Err(GraphError::invalid_value(key, "floats must be finite"))
        }
    }

    /// JSON representation sent over the wire.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Bool(b) => Json::from(*b),
            Self::Integer(i) => Json::from(*i),
            Self::Float(f) => Json::from(*f),
            Self::String(s) => Json::from(s.as_str()),
            Self::Array(a) => a.to_json(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PropertyArray {
    fn from_json(key: &str, items: &[Json]) -> Result<Self> {
        let mixed = || GraphError::invalid_value(key, "arrays must be homogeneous scalars");

        match items.first() {
            None => Ok(Self::String(Vec::new())),
            Some(Json::Bool(_)) => items
                .iter()
                .map(|v| v.as_bool().ok_or_else(mixed))
                .collect::<Result<_>>()
                .map(Self::Bool),
            Some(Json::String(_)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(mixed))
                .collect::<Result<_>>()
                .map(Self::String),
            Some(Json::Number(_)) => {
                if items.iter().all(|v| v.is_i64()) {
                    items
                        .iter()
                        .map(|v| v.as_i64().ok_or_else(mixed))
                        .collect::<Result<_>>()
                        .map(Self::Integer)
                } else {
                    // Integers widen to floats when mixed with them.
                    items
                        .iter()
                        .map(|v| v.as_f64().ok_or_else(mixed))
                        .collect::<Result<_>>()
                        .map(Self::Float)
                }
            }
            Some(_) => Err(mixed()),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Self::Bool(items) => Json::from(items.clone()),
            Self::Integer(items) => Json::from(items.clone()),
            Self::Float(items) => Json::from(items.clone()),
            Self::String(items) => Json::from(items.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(items) => items.len(),
            Self::Integer(items) => items.len(),
            Self::Float(items) => items.len(),
            Self::String(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<bool>> for PropertyValue {
    fn from(v: Vec<bool>) -> Self {
        Self::Array(PropertyArray::Bool(v))
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Array(PropertyArray::Integer(v))
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(PropertyArray::Float(v))
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        Self::Array(PropertyArray::String(v))
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(v: Vec<&str>) -> Self {
        Self::Array(PropertyArray::String(
            v.into_iter().map(str::to_string).collect(),
        ))
    }
}

/// Decode a JSON object of properties, dropping null entries.
pub fn props_from_json(object: &serde_json::Map<String, Json>) -> Result<PropertyMap> {
    let mut props = PropertyMap::new();
    for (key, value) in object {
        if let Some(v) = PropertyValue::from_json(key, value)? {
            props.insert(key.clone(), v);
        }
    }
    Ok(props)
}

/// Encode a property map as a JSON object.
pub fn props_to_json(props: &PropertyMap) -> Json {
    Json::Object(
        props
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

// ── Traversal ─────────────────────────────────────────────────────

/// Relationship direction relative to the starting node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

impl Direction {
    /// The direction seen from the other end of the relationship.
    pub fn reverse(self) -> Self {
        match self {
            Self::Outgoing => Self::Incoming,
            Self::Incoming => Self::Outgoing,
            Self::Both => Self::Both,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

// ── Results & Schema ──────────────────────────────────────────────

/// How entity metadata in query results is surfaced to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapLevel {
    /// Build node and relationship proxies from REST metadata.
    #[default]
    Entity,
    /// Leave REST metadata as raw JSON.
    None,
}

/// Kind of schema constraint, used to filter constraint listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Uniqueness,
    NodeKey,
}

impl ConstraintKind {
    /// Name the backend uses in its `type` field.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Uniqueness => "UNIQUENESS",
            Self::NodeKey => "NODE_KEY",
        }
    }
}
