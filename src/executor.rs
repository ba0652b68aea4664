//! Query execution and statistics assembly.
//!
//! Issues one query on a connection and shapes the raw driver output into a
//! [`QueryResult`]: column metadata, rows, a statistics mapping mirroring the
//! ClickHouse HTTP API (`read_rows`, `elapsed_ns`, ...) and any trace lines
//! captured during the call.

use crate::client::{ColumnMeta, Connection, ExecuteOptions, NativeOutput};
use crate::error::ProxyError;
use crate::trace::TraceSink;
use crate::value::Value;
use log::debug;
use serde_json::{json, Map as JsonMap, Value as JsonValue};

/// Result of one execution call, ready for serialization.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
    pub statistics: JsonMap<String, JsonValue>,
    pub trace_lines: Vec<String>,
}

/// Execute `sql` on `connection`. When `trace_enabled`, the connection is
/// asked for verbose diagnostic output for this call only and the sink's
/// captured lines are attached to the result.
pub async fn execute(
    connection: &mut dyn Connection,
    sql: &str,
    trace_enabled: bool,
    sink: Option<&TraceSink>,
) -> Result<QueryResult, ProxyError> {
    debug!("Executing query: {}", sql);

    let opts = ExecuteOptions {
        trace: trace_enabled,
    };
    let output = connection
        .execute(sql, opts, sink)
        .await
        .map_err(|e| ProxyError::from_execution_message(e.message))?;

    let statistics = build_statistics(&output);
    let trace_lines = match (trace_enabled, sink) {
        (true, Some(sink)) => sink.drain(),
        _ => Vec::new(),
    };

    Ok(QueryResult {
        columns: output.columns,
        rows: output.rows,
        statistics,
        trace_lines,
    })
}

/// Assemble the statistics mapping. Progress counters and elapsed time are
/// included only when the connection reported them; `result_rows` and
/// `result_bytes` are always computed here. `result_bytes` sums the UTF-8
/// byte length of each value's string form — an approximation of result
/// size, not the wire-encoded byte count.
fn build_statistics(output: &NativeOutput) -> JsonMap<String, JsonValue> {
    let mut statistics = JsonMap::new();

    if let Some(progress) = &output.progress {
        if let Some(v) = progress.read_rows {
            statistics.insert("read_rows".to_string(), json!(v));
        }
        if let Some(v) = progress.read_bytes {
            statistics.insert("read_bytes".to_string(), json!(v));
        }
        if let Some(v) = progress.written_rows {
            statistics.insert("written_rows".to_string(), json!(v));
        }
        if let Some(v) = progress.written_bytes {
            statistics.insert("written_bytes".to_string(), json!(v));
        }
        if let Some(v) = progress.total_rows_to_read {
            statistics.insert("total_rows_to_read".to_string(), json!(v));
        }
    }

    if let Some(elapsed_ns) = output.elapsed_ns {
        statistics.insert("elapsed_ns".to_string(), json!(elapsed_ns));
        statistics.insert("elapsed_ms".to_string(), json!(elapsed_ns as f64 / 1_000_000.0));
    }

    statistics.insert("result_rows".to_string(), json!(output.rows.len()));
    let result_bytes: usize = output
        .rows
        .iter()
        .flat_map(|row| row.iter())
        .map(Value::string_form_len)
        .sum();
    statistics.insert("result_bytes".to_string(), json!(result_bytes));

    statistics
}
