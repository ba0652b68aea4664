//! The fixed JSON response envelope.
//!
//! Success and failure share one shape, mirroring the ClickHouse HTTP API:
//! clients distinguish failures solely by the `error` field and the HTTP
//! status. Every response — success, failure, health, preflight — carries
//! the same CORS headers, unconditionally.

use crate::error::ProxyError;
use crate::executor::QueryResult;
use crate::serialize::row_to_json;
use actix_web::{http::StatusCode, HttpResponse, HttpResponseBuilder};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

pub const CORS_ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");
pub const CORS_ALLOW_METHODS: (&str, &str) = ("Access-Control-Allow-Methods", "GET, POST, OPTIONS");
pub const CORS_ALLOW_HEADERS: (&str, &str) = (
    "Access-Control-Allow-Headers",
    "Content-Type, X-ClickHouse-User, X-ClickHouse-Key, X-ClickHouse-Trace, X-ClickHouse-Session-Id, Authorization",
);

/// Column descriptor in the `meta` array.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// The envelope itself. `trace` appears only when tracing was requested and
/// produced lines; `error` only on failure.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub data: Vec<JsonValue>,
    pub meta: Vec<ResponseColumn>,
    pub rows: usize,
    pub rows_before_limit_at_least: usize,
    pub statistics: JsonMap<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    /// Build the success envelope from an execution result.
    pub fn success(result: QueryResult) -> Self {
        let data: Vec<JsonValue> = result.rows.iter().map(|row| row_to_json(row)).collect();
        let meta = result
            .columns
            .into_iter()
            .map(|c| ResponseColumn {
                name: c.name,
                type_name: c.type_name,
            })
            .collect();
        let row_count = data.len();

        QueryResponse {
            data,
            meta,
            rows: row_count,
            rows_before_limit_at_least: row_count,
            statistics: result.statistics,
            trace: if result.trace_lines.is_empty() {
                None
            } else {
                Some(result.trace_lines)
            },
            error: None,
        }
    }

    /// Build the failure envelope: empty data/meta/statistics plus `error`.
    pub fn failure(message: String) -> Self {
        QueryResponse {
            data: Vec::new(),
            meta: Vec::new(),
            rows: 0,
            rows_before_limit_at_least: 0,
            statistics: JsonMap::new(),
            trace: None,
            error: Some(message),
        }
    }
}

/// Start a response with the CORS headers every reply carries.
pub fn builder_with_cors(status: StatusCode) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    builder
        .insert_header(CORS_ALLOW_ORIGIN)
        .insert_header(CORS_ALLOW_METHODS)
        .insert_header(CORS_ALLOW_HEADERS);
    builder
}

/// 200 response carrying a success envelope.
pub fn ok_json(envelope: &QueryResponse) -> HttpResponse {
    builder_with_cors(StatusCode::OK).json(envelope)
}

/// Error response carrying the failure envelope for `err`.
pub fn error_json(err: &ProxyError) -> HttpResponse {
    builder_with_cors(err.status_code()).json(QueryResponse::failure(err.to_string()))
}
