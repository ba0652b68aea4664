//! Query handlers — the request-to-query pipeline.
//!
//! Flow: extract parameters from the transport, resolve a connection (the
//! session cache for session-bearing requests, a fresh one otherwise),
//! execute, serialize into the fixed envelope. Failures at any stage become
//! the error envelope; a fresh connection is always released afterwards
//! while session connections stay owned by the cache, errors included.

use super::AppState;
use crate::error::ProxyError;
use crate::executor::{self, QueryResult};
use crate::params::{self, BodyPayload, RequestParams};
use crate::response::{self, QueryResponse};
use crate::session::{self, SessionKey};
use crate::trace::TraceSink;
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error, info};

/// `GET /query` (and `/query/...`): query text comes from the query string.
pub async fn get_query(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    handle_query(&req, BodyPayload::Empty, &state).await
}

/// `POST /query` (and `/`, `/query/...`): body is JSON parameters or raw SQL.
pub async fn post_query(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    handle_query(&req, BodyPayload::parse(&body), &state).await
}

/// `GET /`: health check unless a `q`/`query` parameter makes it a query.
pub async fn get_root(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if params::has_query_param(req.query_string()) {
        handle_query(&req, BodyPayload::Empty, &state).await
    } else {
        super::health::health().await
    }
}

async fn handle_query(req: &HttpRequest, body: BodyPayload, state: &AppState) -> HttpResponse {
    debug!("Handling {} request to {}", req.method(), req.path());

    let params = match params::extract(
        req.method(),
        req.headers(),
        req.query_string(),
        &body,
        &state.config.clickhouse_database,
    ) {
        Ok(params) => params,
        Err(err) => return response::error_json(&err),
    };

    info!(
        "Query from user={} database={} session_id={:?} trace={}",
        params.credentials.user, params.credentials.database, params.session_id, params.trace
    );

    let sink = if params.trace {
        Some(TraceSink::new())
    } else {
        None
    };

    match run_query(&params, sink.as_ref(), state).await {
        Ok(result) => response::ok_json(&QueryResponse::success(result)),
        Err(err) => {
            error!("Query failed: {}", err);
            response::error_json(&err)
        }
    }
}

/// Resolve a connection and execute one query on it.
async fn run_query(
    params: &RequestParams,
    sink: Option<&TraceSink>,
    state: &AppState,
) -> Result<QueryResult, ProxyError> {
    match &params.session_id {
        Some(session_id) => {
            let key = SessionKey::new(&params.credentials, session_id);
            let connection = state
                .sessions
                .get_or_create(
                    key,
                    params.session_timeout,
                    state.factory.as_ref(),
                    &params.credentials,
                    sink,
                )
                .await
                .map_err(|e| ProxyError::from_execution_message(e.message))?;

            // One call at a time per session connection; the cache keeps
            // ownership whether the query succeeds or fails.
            let mut guard = connection.lock().await;
            executor::execute(&mut **guard, &params.query, params.trace, sink).await
        }
        None => {
            let mut connection = state
                .factory
                .connect(&params.credentials, sink)
                .await
                .map_err(|e| ProxyError::from_execution_message(e.message))?;

            let result =
                executor::execute(&mut *connection, &params.query, params.trace, sink).await;
            session::release_connection(connection).await;
            result
        }
    }
}
