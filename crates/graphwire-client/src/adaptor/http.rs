//! HTTP adaptor for the transactional Cypher endpoint.
//!
//! Statements are posted in batches to `db/data/transaction[/{id}][/commit]`.
//! Every statement asks for both the `row` and `REST` result encodings so
//! entities can be decoded without a second request. The transport itself is
//! injected through [`HttpTransport`]; [`ReqwestTransport`] is the default.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, LOCATION};
use serde::Deserialize;
use serde_json::{json, Value as Json};

use graphwire_core::{ConnectionConfig, ConstraintKind, GraphError, Result};

use super::{Adaptor, AdaptorResponse, SchemaEntry, SchemaListing};
use crate::cypher::Statement;
use crate::response::RawResult;

const DATA_PATH: &str = "db/data/";
const RESULT_DATA_CONTENTS: [&str; 2] = ["row", "REST"];

// ── Transport ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// A request relative to the server root.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Json>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Json) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Value of the `Location` header, if any.
    pub location: Option<String>,
    /// Decoded JSON body; `Null` for an empty body.
    pub body: Json,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the server. Pooling, auth, timeouts and TLS live here.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport with basic auth.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: reqwest::Url,
    user: String,
    password: String,
}

impl ReqwestTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut base = reqwest::Url::parse(&config.url)
            .map_err(|e| GraphError::Config(format!("Invalid URL {:?}: {e}", config.url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(GraphError::Config(format!("Invalid URL: {:?}", config.url)));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("graphwire/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GraphError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base,
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = self
            .base
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| {
                GraphError::Config(format!("Invalid request path {:?}: {e}", request.path))
            })?;

        let builder = match request.method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
            Method::Delete => self.client.delete(url.clone()),
        };
        let mut builder = builder
            .basic_auth(&self.user, Some(&self.password))
            .header(ACCEPT, "application/json; charset=UTF-8");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            GraphError::Transport(format!("{} {url} failed: {e}", request.method.as_str()))
        })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GraphError::Transport(format!("Failed to read response: {e}")))?;

        tracing::debug!(
            method = request.method.as_str(),
            url = %url,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = bytes.len(),
            "HTTP request"
        );

        let body = if bytes.is_empty() {
            Json::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(body) => body,
                Err(_) if !(200..300).contains(&status) => {
                    Json::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                Err(e) => return Err(GraphError::Decode(e.to_string())),
            }
        };

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}

// ── Adaptor ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireBody {
    #[serde(default)]
    results: Vec<RawResult>,
}

/// Adaptor for the REST transactional endpoint.
#[derive(Clone)]
pub struct HttpAdaptor {
    transport: Arc<dyn HttpTransport>,
}

impl HttpAdaptor {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Build an adaptor over a reqwest transport.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        tracing::info!(url = %config.url, "HTTP adaptor ready");
        Ok(Self::new(Arc::new(transport)))
    }

    /// Path for a batch given the transaction id (if confirmed) and commit flag.
    pub fn transaction_path(transaction_id: Option<u64>, commit: bool) -> String {
        let mut path = format!("{DATA_PATH}transaction");
        if let Some(id) = transaction_id {
            path.push_str(&format!("/{id}"));
        }
        if commit {
            path.push_str("/commit");
        }
        path
    }

    async fn get_entries(&self, path: String) -> Result<Vec<SchemaEntry>> {
        let response = self.transport.send(HttpRequest::get(path)).await?;
        check_status(&response)?;
        if response.body.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(response.body)?)
    }
}

/// JSON body for a statement batch.
pub fn batch_body(statements: &[Statement]) -> Json {
    let statements: Vec<Json> = statements
        .iter()
        .map(|s| {
            json!({
                "statement": s.text(),
                "parameters": s.parameters(),
                "resultDataContents": RESULT_DATA_CONTENTS,
            })
        })
        .collect();
    json!({ "statements": statements })
}

/// Transaction id from a resource location such as `.../db/data/transaction/7`.
pub fn location_id(location: &str) -> Option<u64> {
    location.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Surface an embedded Cypher error or a non-success status.
fn check_status(response: &HttpResponse) -> Result<()> {
    if let Some(first) = response
        .body
        .get("errors")
        .and_then(Json::as_array)
        .and_then(|errors| errors.first())
    {
        let err: WireError = serde_json::from_value(first.clone())?;
        return Err(GraphError::QueryExecution {
            code: err.code,
            message: err.message,
        });
    }
    if !response.is_success() {
        let message = match &response.body {
            Json::String(s) => s.clone(),
            Json::Null => String::new(),
            other => other.to_string(),
        };
        return Err(GraphError::QueryExecution {
            code: format!("HTTP {}", response.status),
            message,
        });
    }
    Ok(())
}

fn encode_label(label: &str) -> String {
    urlencoding::encode(label).into_owned()
}

#[async_trait]
impl Adaptor for HttpAdaptor {
    async fn query(
        &self,
        transaction_id: Option<u64>,
        statements: &[Statement],
        commit: bool,
    ) -> Result<AdaptorResponse> {
        let path = Self::transaction_path(transaction_id, commit);
        let response = self
            .transport
            .send(HttpRequest::post(path, batch_body(statements)))
            .await?;
        check_status(&response)?;

        let transaction_id = response.location.as_deref().and_then(location_id);
        let body: WireBody = serde_json::from_value(response.body)?;
        Ok(AdaptorResponse {
            results: body.results,
            transaction_id,
        })
    }

    async fn rollback(&self, transaction_id: u64) -> Result<()> {
        let path = format!("{DATA_PATH}transaction/{transaction_id}");
        let response = self.transport.send(HttpRequest::delete(path)).await?;
        check_status(&response)
    }

    async fn indexes(&self, label: Option<&str>) -> Result<SchemaListing> {
        let path = format!(
            "{DATA_PATH}schema/index/{}",
            label.map(encode_label).unwrap_or_default()
        );
        let entries = self.get_entries(path).await?;
        Ok(SchemaListing::from_entries(entries, label.is_some()))
    }

    async fn constraints(
        &self,
        label: Option<&str>,
        kind: Option<ConstraintKind>,
    ) -> Result<SchemaListing> {
        let mut path = format!(
            "{DATA_PATH}schema/constraint/{}",
            label.map(encode_label).unwrap_or_default()
        );
        if label.is_some() && kind == Some(ConstraintKind::Uniqueness) {
            path.push_str("/uniqueness");
        }

        let mut entries = self.get_entries(path).await?;
        if let Some(kind) = kind {
            entries.retain(|e| e.kind.as_deref() == Some(kind.wire_name()));
        }
        Ok(SchemaListing::from_entries(entries, label.is_some()))
    }

    async fn version(&self) -> Result<String> {
        let response = self.transport.send(HttpRequest::get(DATA_PATH)).await?;
        check_status(&response)?;
        response
            .body
            .get("neo4j_version")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| GraphError::Decode("missing neo4j_version".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::cypher::statement;

    /// Records requests and replays canned responses in order.
    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<VecDeque<HttpResponse>>,
    }

    impl RecordingTransport {
        fn reply(&self, status: u16, location: Option<&str>, body: Json) {
            self.responses.lock().unwrap().push_back(HttpResponse {
                status,
                location: location.map(str::to_string),
                body,
            });
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| GraphError::Transport("connection refused".to_string()))
        }
    }

    fn adaptor() -> (Arc<RecordingTransport>, HttpAdaptor) {
        let transport = Arc::new(RecordingTransport::default());
        (transport.clone(), HttpAdaptor::new(transport))
    }

    #[test]
    fn test_transaction_paths() {
        assert_eq!(HttpAdaptor::transaction_path(None, false), "db/data/transaction");
        assert_eq!(
            HttpAdaptor::transaction_path(None, true),
            "db/data/transaction/commit"
        );
        assert_eq!(
            HttpAdaptor::transaction_path(Some(7), false),
            "db/data/transaction/7"
        );
        assert_eq!(
            HttpAdaptor::transaction_path(Some(7), true),
            "db/data/transaction/7/commit"
        );
    }

    #[test]
    fn test_location_id() {
        assert_eq!(
            location_id("http://localhost:7474/db/data/transaction/12"),
            Some(12)
        );
        assert_eq!(location_id("http://localhost:7474/db/data/transaction/12/"), Some(12));
        assert_eq!(location_id("http://localhost:7474/db/data/transaction"), None);
    }

    #[test]
    fn test_batch_body_requests_row_and_rest() {
        let body = batch_body(&[statement("RETURN $x AS x").param("x", 1)]);
        assert_eq!(
            body,
            json!({"statements": [{
                "statement": "RETURN $x AS x",
                "parameters": {"x": 1},
                "resultDataContents": ["row", "REST"]
            }]})
        );
    }

    #[tokio::test]
    async fn test_query_opens_transaction_and_decodes_results() {
        let (transport, adaptor) = adaptor();
        transport.reply(
            201,
            Some("http://localhost:7474/db/data/transaction/3"),
            json!({
                "results": [{"columns": ["x"], "data": [{"row": [1], "rest": [1]}]}],
                "errors": []
            }),
        );

        let response = adaptor
            .query(None, &[statement("RETURN 1 AS x")], false)
            .await
            .unwrap();
        assert_eq!(response.transaction_id, Some(3));
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].columns, vec!["x".to_string()]);
        assert_eq!(response.results[0].rows[0].row, vec![json!(1)]);

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path, "db/data/transaction");
    }

    #[tokio::test]
    async fn test_embedded_error_is_query_execution() {
        let (transport, adaptor) = adaptor();
        transport.reply(
            200,
            None,
            json!({
                "results": [],
                "errors": [{
                    "code": "Neo.ClientError.Statement.SyntaxError",
                    "message": "Invalid input 'Q'"
                }]
            }),
        );

        let err = adaptor
            .query(None, &[statement("QRETURN 1")], true)
            .await
            .unwrap_err();
        match err {
            GraphError::QueryExecution { code, message } => {
                assert_eq!(code, "Neo.ClientError.Statement.SyntaxError");
                assert_eq!(message, "Invalid input 'Q'");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_success_status_is_query_execution() {
        let (transport, adaptor) = adaptor();
        transport.reply(500, None, Json::String("boom".to_string()));

        let err = adaptor.rollback(4).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::QueryExecution { ref code, ref message }
                if code == "HTTP 500" && message == "boom"
        ));
        assert_eq!(transport.requests()[0].method, Method::Delete);
        assert_eq!(transport.requests()[0].path, "db/data/transaction/4");
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let (_transport, adaptor) = adaptor();
        let err = adaptor
            .query(None, &[statement("RETURN 1")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Transport(_)));
    }

    #[tokio::test]
    async fn test_global_indexes_grouped_by_label() {
        let (transport, adaptor) = adaptor();
        transport.reply(
            200,
            None,
            json!([
                {"label": "Person", "property_keys": ["name"]},
                {"label": "Person", "property_keys": ["email"]},
                {"label": "City", "property_keys": ["zip"]}
            ]),
        );

        let listing = adaptor.indexes(None).await.unwrap();
        assert_eq!(transport.requests()[0].path, "db/data/schema/index/");
        assert_eq!(listing.for_label("Person").len(), 2);
        assert_eq!(listing.for_label("City"), vec![vec!["zip".to_string()]]);
    }

    #[tokio::test]
    async fn test_label_scoped_constraints_filtered_by_kind() {
        let (transport, adaptor) = adaptor();
        transport.reply(
            200,
            None,
            json!([
                {"label": "Person", "property_keys": ["email"], "type": "UNIQUENESS"},
                {"label": "Person", "property_keys": ["id", "org"], "type": "NODE_KEY"}
            ]),
        );

        let listing = adaptor
            .constraints(Some("Person"), Some(ConstraintKind::Uniqueness))
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[0].path,
            "db/data/schema/constraint/Person/uniqueness"
        );
        assert_eq!(
            listing,
            SchemaListing::ForLabel(vec![vec!["email".to_string()]])
        );
    }

    #[tokio::test]
    async fn test_schema_label_is_percent_encoded() {
        let (transport, adaptor) = adaptor();
        transport.reply(200, None, Json::Null);

        let listing = adaptor.indexes(Some("Big Cat/2")).await.unwrap();
        assert!(listing.is_empty());
        assert_eq!(
            transport.requests()[0].path,
            "db/data/schema/index/Big%20Cat%2F2"
        );

        transport.reply(200, None, json!([]));
        adaptor
            .constraints(Some("Café"), Some(ConstraintKind::Uniqueness))
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[1].path,
            "db/data/schema/constraint/Caf%C3%A9/uniqueness"
        );
    }

    #[tokio::test]
    async fn test_version() {
        let (transport, adaptor) = adaptor();
        transport.reply(200, None, json!({"neo4j_version": "3.5.35"}));
        assert_eq!(adaptor.version().await.unwrap(), "3.5.35");
        assert_eq!(transport.requests()[0].path, "db/data/");
    }
}
