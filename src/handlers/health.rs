//! Health check endpoint handler.

use crate::response::builder_with_cors;
use actix_web::{http::StatusCode, HttpResponse};
use serde_json::json;

/// Health payload shared by `/health` and the bare root path.
pub fn health_payload() -> serde_json::Value {
    json!({
        "status": "ok",
        "service": "clickhouse-proxy"
    })
}

/// `GET /health` — no dependencies, answers as long as the process is up.
pub async fn health() -> HttpResponse {
    builder_with_cors(StatusCode::OK).json(health_payload())
}
