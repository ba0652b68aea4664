//! Parameter extraction.
//!
//! An inbound request spreads its inputs over four transports: dedicated
//! `X-ClickHouse-*` headers, the `Authorization: Basic` header, the query
//! string, and (for POST) a JSON body. This module resolves them into one
//! canonical [`RequestParams`] value with a fixed precedence:
//! headers > Basic auth > query string > body. Empty strings count as absent.

use crate::client::Credentials;
use crate::error::ProxyError;
use actix_web::http::header::HeaderMap;
use actix_web::http::Method;
use actix_web::web;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Session timeout bounds in seconds
pub const SESSION_TIMEOUT_MIN: i64 = 10;
pub const SESSION_TIMEOUT_MAX: i64 = 3600;
pub const SESSION_TIMEOUT_DEFAULT: i64 = 120;

/// Request body after the one-time read: a JSON object, raw SQL text, or
/// nothing. The raw variant covers POST bodies that are not valid JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyPayload {
    Structured(Map<String, JsonValue>),
    Raw(String),
    Empty,
}

impl BodyPayload {
    /// Decode a request body. Valid JSON objects become `Structured`; any
    /// other non-empty content is treated as literal SQL text.
    pub fn parse(bytes: &[u8]) -> BodyPayload {
        if bytes.is_empty() {
            return BodyPayload::Empty;
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        match serde_json::from_str::<JsonValue>(&text) {
            Ok(JsonValue::Object(map)) => BodyPayload::Structured(map),
            _ => BodyPayload::Raw(text),
        }
    }

    fn as_map(&self) -> Option<&Map<String, JsonValue>> {
        match self {
            BodyPayload::Structured(map) => Some(map),
            _ => None,
        }
    }
}

/// Canonical request parameters, immutable once extracted.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub credentials: Credentials,
    pub query: String,
    pub session_id: Option<String>,
    /// Clamped to `[SESSION_TIMEOUT_MIN, SESSION_TIMEOUT_MAX]`
    pub session_timeout: u64,
    pub trace: bool,
}

/// Resolve request parameters from the transport pieces.
///
/// `default_database` fills in when no source names a database. Fails with
/// `BadRequest` when no source yields a user or a query.
pub fn extract(
    method: &Method,
    headers: &HeaderMap,
    query_string: &str,
    body: &BodyPayload,
    default_database: &str,
) -> Result<RequestParams, ProxyError> {
    let qp = parse_query_string(query_string);
    let is_post = method == Method::POST;
    let body_map = body.as_map();

    // Credentials: headers, then Basic auth, then query string, then body
    let mut user = header_string(headers, "X-ClickHouse-User");
    let mut password = header_string(headers, "X-ClickHouse-Key");

    if user.is_none() && password.is_none() {
        if let Some((u, p)) = decode_basic_auth(headers) {
            user = non_empty(u);
            password = non_empty(p);
        }
    }

    if user.is_none() {
        user = qp.get("user").cloned().and_then(non_empty);
    }
    if password.is_none() {
        password = qp.get("password").cloned().and_then(non_empty);
    }
    let mut database = qp.get("database").cloned().and_then(non_empty);

    if let Some(map) = body_map {
        if user.is_none() {
            user = body_string(map, "user");
        }
        if password.is_none() {
            password = body_string(map, "password");
        }
        if database.is_none() {
            database = body_string(map, "database");
        }
    }

    let user = user.ok_or_else(|| {
        ProxyError::BadRequest(
            "User credentials required. Provide X-ClickHouse-User header or 'user' parameter"
                .to_string(),
        )
    })?;

    let credentials = Credentials {
        user,
        password: password.unwrap_or_default(),
        database: database.unwrap_or_else(|| default_database.to_string()),
    };

    // Session id: header, then query string, then body
    let session_id = header_string(headers, "X-ClickHouse-Session-Id")
        .or_else(|| qp.get("session_id").cloned().and_then(non_empty))
        .or_else(|| qp.get("sessionId").cloned().and_then(non_empty))
        .or_else(|| body_map.and_then(|m| body_string(m, "session_id")))
        .or_else(|| body_map.and_then(|m| body_string(m, "sessionId")));

    // Session timeout: query string first; the body is consulted only when
    // the query string carries no value at all.
    let session_timeout = if let Some(raw) = qp.get("session_timeout") {
        raw.parse::<i64>().ok()
    } else {
        body_map
            .and_then(|m| m.get("session_timeout"))
            .and_then(json_int)
    };
    let session_timeout = clamp_session_timeout(session_timeout.unwrap_or(SESSION_TIMEOUT_DEFAULT));

    // Trace flag: query string for GET, body boolean for POST, header ORed in
    let mut trace = if is_post {
        body_map
            .and_then(|m| m.get("trace"))
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    } else {
        qp.get("trace").map(|v| is_truthy(v)).unwrap_or(false)
    };
    if !trace {
        if let Some(header) = header_string(headers, "X-ClickHouse-Trace") {
            trace = is_truthy(&header);
        }
    }

    // Query text
    let query = if is_post {
        match body {
            BodyPayload::Structured(map) => {
                body_string(map, "query").or_else(|| body_string(map, "q"))
            }
            BodyPayload::Raw(text) => non_empty(text.trim().to_string()),
            BodyPayload::Empty => query_from_params(&qp),
        }
    } else {
        query_from_params(&qp)
    };

    let query = query.ok_or_else(|| {
        ProxyError::BadRequest("Query parameter 'q' or 'query' is required".to_string())
    })?;

    Ok(RequestParams {
        credentials,
        query,
        session_id,
        session_timeout,
        trace,
    })
}

/// Whether a query string carries a non-empty `q` or `query` parameter.
/// Decides if `GET /` is a health check or a query.
pub fn has_query_param(query_string: &str) -> bool {
    query_from_params(&parse_query_string(query_string)).is_some()
}

/// Clamp a session timeout into the allowed range.
pub fn clamp_session_timeout(timeout: i64) -> u64 {
    timeout.clamp(SESSION_TIMEOUT_MIN, SESSION_TIMEOUT_MAX) as u64
}

fn parse_query_string(query_string: &str) -> HashMap<String, String> {
    web::Query::<HashMap<String, String>>::from_query(query_string)
        .map(|q| q.into_inner())
        .unwrap_or_default()
}

fn query_from_params(qp: &HashMap<String, String>) -> Option<String> {
    qp.get("q")
        .cloned()
        .and_then(non_empty)
        .or_else(|| qp.get("query").cloned().and_then(non_empty))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .and_then(non_empty)
}

fn body_string(map: &Map<String, JsonValue>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .and_then(non_empty)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn json_int(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Decode `Authorization: Basic base64(user:password)`. Any malformed header
/// falls through silently — later credential sources still apply.
fn decode_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get("Authorization")?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
