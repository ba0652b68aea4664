//! Database connection capability.
//!
//! The native wire protocol is an external collaborator: the proxy only
//! depends on the [`Connection`] and [`ConnectionFactory`] traits defined
//! here. The production implementation lives in [`native`]; tests use stub
//! implementations.

pub mod native;

use crate::trace::TraceSink;
use crate::value::Value;
use async_trait::async_trait;
use thiserror::Error;

pub use native::NativeConnectionFactory;

/// Credentials resolved from a request.
///
/// `user` is mandatory, `password` defaults to empty, `database` to the
/// configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Request verbose diagnostic-log emission for this call only.
    pub trace: bool,
}

/// Column metadata returned alongside row data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
}

/// Execution progress counters, as far as the connection reports them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressInfo {
    pub read_rows: Option<u64>,
    pub read_bytes: Option<u64>,
    pub written_rows: Option<u64>,
    pub written_bytes: Option<u64>,
    pub total_rows_to_read: Option<u64>,
}

/// Raw output of one execution call.
#[derive(Debug, Clone, Default)]
pub struct NativeOutput {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
    pub progress: Option<ProgressInfo>,
    pub elapsed_ns: Option<u64>,
}

/// Failure reported by the driver. Carries only a message string; the HTTP
/// status is decided later by substring classification.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ConnectionError {
    pub message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One live database connection.
///
/// Session connections are owned by the session cache and reused across
/// requests; non-session connections live for a single request.
#[async_trait]
pub trait Connection: Send {
    /// Execute `sql`, returning rows, column metadata, and whatever
    /// execution metadata the connection exposes. When a sink is given,
    /// diagnostic lines emitted during this call are appended to it.
    async fn execute(
        &mut self,
        sql: &str,
        opts: ExecuteOptions,
        sink: Option<&TraceSink>,
    ) -> Result<NativeOutput, ConnectionError>;

    /// Release the connection. Best effort; errors are swallowed.
    async fn disconnect(&mut self);
}

/// Creates connections from request credentials.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
        sink: Option<&TraceSink>,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}
