//! Error taxonomy for the proxy.
//!
//! Every failure is converted to the standard JSON envelope at the request
//! boundary; the variants here carry the HTTP status that envelope is sent
//! with. Execution failures coming back from the driver carry only a message
//! string, so classification works by substring matching on that text — the
//! native protocol does not provide richer error codes.

use actix_web::http::StatusCode;
use thiserror::Error;

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("ClickHouse unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Query(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status the error envelope is sent with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a driver execution error by its message text.
    ///
    /// Authentication-style failures map to 401, connection failures to 503,
    /// everything else passes through verbatim as a 500 query error.
    pub fn from_execution_message(message: String) -> Self {
        if message.contains("Authentication failed")
            || message.contains("Invalid user")
            || message.contains("Password")
        {
            ProxyError::AuthenticationFailed(message)
        } else if message.contains("Connection refused")
            || message.contains("Can't connect")
            || message.contains("Connection")
        {
            ProxyError::Unavailable(message)
        } else {
            ProxyError::Query(message)
        }
    }
}
