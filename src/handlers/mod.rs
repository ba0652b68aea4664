//! HTTP request handlers.

pub mod health;
pub mod query;

use crate::client::ConnectionFactory;
use crate::config::ProxyConfig;
use crate::session::SessionCache;
use std::sync::Arc;

/// Shared application state, passed to every handler.
pub struct AppState {
    pub config: ProxyConfig,
    pub sessions: Arc<SessionCache>,
    pub factory: Arc<dyn ConnectionFactory>,
}
