//! Result decoding shared by every adaptor.
//!
//! Adaptors hand back [`RawResult`]s: for each row, the compact `row`
//! encoding and the metadata-rich `rest` encoding side by side. Decoding
//! turns REST entity metadata into pre-populated [`Node`] and
//! [`Relationship`] proxies and passes every other column through as data.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as Json;

use graphwire_core::types::props_from_json;
use graphwire_core::{GraphError, PropertyMap, Result, WrapLevel};

use crate::node::Node;
use crate::relationship::Relationship;
use crate::session::Session;
use crate::value::{QueryResult, Row, Value};

/// Undecoded result of one statement.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(rename = "data", default)]
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub row: Vec<Json>,
    #[serde(default, alias = "REST")]
    pub rest: Vec<Json>,
}

/// Entity metadata recognised in a REST column.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RestEntity {
    Node {
        id: i64,
        labels: Option<Vec<String>>,
        props: PropertyMap,
    },
    Relationship {
        id: i64,
        rel_type: String,
        start_id: i64,
        end_id: i64,
        props: PropertyMap,
    },
}

/// Trailing numeric segment of a resource URL such as `.../node/12`.
pub(crate) fn trailing_id(url: &str) -> Option<i64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Resource kind from the segment before the id: `node` or `relationship`.
fn resource_kind(url: &str) -> Option<&str> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    segments.next()?;
    segments.next()
}

/// Recognise a REST node or relationship object. Other values yield `None`.
pub(crate) fn parse_rest_entity(value: &Json) -> Result<Option<RestEntity>> {
    let Some(object) = value.as_object() else {
        return Ok(None);
    };
    let Some(self_url) = object.get("self").and_then(Json::as_str) else {
        return Ok(None);
    };
    let Some(data) = object.get("data").and_then(Json::as_object) else {
        return Ok(None);
    };
    let metadata = object.get("metadata");

    let id = metadata
        .and_then(|m| m.get("id"))
        .and_then(Json::as_i64)
        .or_else(|| trailing_id(self_url))
        .ok_or_else(|| GraphError::Decode(format!("entity without id: {self_url}")))?;
    let props = props_from_json(data)?;

    match resource_kind(self_url) {
        Some("node") => {
            let labels = metadata
                .and_then(|m| m.get("labels"))
                .and_then(Json::as_array)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(Json::as_str)
                        .map(str::to_string)
                        .collect()
                });
            Ok(Some(RestEntity::Node { id, labels, props }))
        }
        Some("relationship") => {
            let rel_type = object
                .get("type")
                .or_else(|| metadata.and_then(|m| m.get("type")))
                .and_then(Json::as_str)
                .ok_or_else(|| GraphError::Decode(format!("relationship {id} without type")))?
                .to_string();
            let endpoint = |key: &str| {
                object
                    .get(key)
                    .and_then(Json::as_str)
                    .and_then(trailing_id)
                    .ok_or_else(|| GraphError::Decode(format!("relationship {id} without {key}")))
            };
            Ok(Some(RestEntity::Relationship {
                id,
                rel_type,
                start_id: endpoint("start")?,
                end_id: endpoint("end")?,
                props,
            }))
        }
        _ => Ok(None),
    }
}

fn decode_value(
    session: &Session,
    row: Json,
    rest: Option<Json>,
    wrap: WrapLevel,
) -> Result<Value> {
    let Some(rest) = rest else {
        return Ok(Value::Data(row));
    };
    match parse_rest_entity(&rest)? {
        None => Ok(Value::Data(row)),
        Some(_) if wrap == WrapLevel::None => Ok(Value::Rest(rest)),
        Some(RestEntity::Node { id, labels, props }) => Ok(Value::Node(Node::from_parts(
            session.clone(),
            id,
            labels,
            Some(props),
        ))),
        Some(RestEntity::Relationship {
            id,
            rel_type,
            start_id,
            end_id,
            props,
        }) => Ok(Value::Relationship(Relationship::from_parts(
            session.clone(),
            id,
            rel_type,
            start_id,
            end_id,
            Some(props),
        ))),
    }
}

/// Decode one raw result into rows keyed by the declared columns.
pub(crate) fn decode(session: &Session, raw: RawResult, wrap: WrapLevel) -> Result<QueryResult> {
    let columns: Arc<[String]> = raw.columns.into();
    let mut rows = Vec::with_capacity(raw.rows.len());

    for raw_row in raw.rows {
        if raw_row.row.len() != columns.len() {
            return Err(GraphError::Decode(format!(
                "row has {} values for {} columns",
                raw_row.row.len(),
                columns.len()
            )));
        }
        let mut rest = raw_row.rest.into_iter();
        let values = raw_row
            .row
            .into_iter()
            .map(|row| decode_value(session, row, rest.next(), wrap))
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row::new(columns.clone(), values));
    }

    Ok(QueryResult::new(columns, rows))
}
