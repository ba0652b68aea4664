//! Native-protocol connection backed by the `klickhouse` driver.
//!
//! Everything klickhouse-specific stays inside this module: credentials are
//! turned into client options, result blocks are flattened into rows of the
//! proxy's own [`Value`] union, and driver errors are reduced to message
//! strings for later classification.

use super::{
    ColumnMeta, Connection, ConnectionError, ConnectionFactory, Credentials, ExecuteOptions,
    NativeOutput,
};
use crate::config::ProxyConfig;
use crate::trace::TraceSink;
use crate::value::Value;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use futures_util::StreamExt;
use klickhouse::{Client, ClientOptions, Value as ChValue};
use log::debug;
use std::time::{Duration, Instant};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const TRACE_LOGGER: &str = "clickhouse_proxy.connection";

/// Creates native-protocol connections to the configured ClickHouse server.
pub struct NativeConnectionFactory {
    addr: String,
}

impl NativeConnectionFactory {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            addr: config.clickhouse_addr(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for NativeConnectionFactory {
    async fn connect(
        &self,
        credentials: &Credentials,
        sink: Option<&TraceSink>,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let mut options = ClientOptions::default();
        options.username = credentials.user.clone();
        options.password = credentials.password.clone();
        options.default_database = credentials.database.clone();

        if let Some(sink) = sink {
            sink.emit(
                "DEBUG",
                TRACE_LOGGER,
                &format!("connecting to {} as '{}'", self.addr, credentials.user),
            );
        }

        let client = tokio::time::timeout(CONNECT_TIMEOUT, Client::connect(&self.addr, options))
            .await
            .map_err(|_| {
                ConnectionError::new(format!("Can't connect to {}: connect timeout", self.addr))
            })?
            .map_err(|e| ConnectionError::new(e.to_string()))?;

        if let Some(sink) = sink {
            sink.emit("DEBUG", TRACE_LOGGER, "connection established");
        }
        debug!("Connected to ClickHouse at {}", self.addr);

        Ok(Box::new(NativeConnection {
            client: Some(client),
            addr: self.addr.clone(),
        }))
    }
}

/// One live native-protocol connection.
pub struct NativeConnection {
    client: Option<Client>,
    addr: String,
}

#[async_trait]
impl Connection for NativeConnection {
    async fn execute(
        &mut self,
        sql: &str,
        opts: ExecuteOptions,
        sink: Option<&TraceSink>,
    ) -> Result<NativeOutput, ConnectionError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ConnectionError::new("Connection already closed"))?;

        let verbose = opts.trace;
        if verbose {
            if let Some(sink) = sink {
                sink.emit(
                    "DEBUG",
                    TRACE_LOGGER,
                    &format!("executing on {}: {}", self.addr, sql),
                );
            }
        }

        let started = Instant::now();
        let mut stream = client
            .query_raw(sql)
            .await
            .map_err(|e| ConnectionError::new(e.to_string()))?;

        let mut columns: Vec<ColumnMeta> = Vec::new();
        let mut rows: Vec<Vec<Value>> = Vec::new();

        while let Some(block) = stream.next().await {
            let block = block.map_err(|e| ConnectionError::new(e.to_string()))?;

            if columns.is_empty() && !block.column_types.is_empty() {
                columns = block
                    .column_types
                    .iter()
                    .map(|(name, ty)| ColumnMeta {
                        name: name.clone(),
                        type_name: ty.to_string(),
                    })
                    .collect();
            }

            let block_rows = block.rows as usize;
            if block_rows == 0 {
                continue;
            }

            // Column-major to row-major
            let cols: Vec<Vec<ChValue>> =
                block.column_data.into_iter().map(|(_, data)| data).collect();
            for i in 0..block_rows {
                let mut row = Vec::with_capacity(cols.len());
                for col in &cols {
                    row.push(convert_value(col[i].clone()));
                }
                rows.push(row);
            }

            if verbose {
                if let Some(sink) = sink {
                    sink.emit(
                        "DEBUG",
                        TRACE_LOGGER,
                        &format!("received block: {} row(s)", block_rows),
                    );
                }
            }
        }

        let elapsed = started.elapsed();
        if verbose {
            if let Some(sink) = sink {
                sink.emit(
                    "DEBUG",
                    TRACE_LOGGER,
                    &format!(
                        "query finished: {} row(s) in {:.3}ms",
                        rows.len(),
                        elapsed.as_secs_f64() * 1000.0
                    ),
                );
            }
        }

        Ok(NativeOutput {
            columns,
            rows,
            // klickhouse does not surface progress packets through its query
            // API; statistics degrade to elapsed/result counters.
            progress: None,
            elapsed_ns: Some(elapsed.as_nanos() as u64),
        })
    }

    async fn disconnect(&mut self) {
        if self.client.take().is_some() {
            debug!("Disconnected from ClickHouse at {}", self.addr);
        }
    }
}

/// Map one driver value into the proxy's closed value union. Kinds the proxy
/// does not model (IPs, UUIDs, maps, enums, ...) fall back to their default
/// string form.
fn convert_value(value: ChValue) -> Value {
    match value {
        ChValue::Null => Value::Null,
        ChValue::Int8(v) => Value::Int(v as i64),
        ChValue::Int16(v) => Value::Int(v as i64),
        ChValue::Int32(v) => Value::Int(v as i64),
        ChValue::Int64(v) => Value::Int(v),
        ChValue::UInt8(v) => Value::UInt(v as u64),
        ChValue::UInt16(v) => Value::UInt(v as u64),
        ChValue::UInt32(v) => Value::UInt(v as u64),
        ChValue::UInt64(v) => Value::UInt(v),
        ChValue::Float32(v) => Value::Float(v as f64),
        ChValue::Float64(v) => Value::Float(v),
        ChValue::Decimal32(scale, digits) => Value::Decimal {
            digits: digits as i128,
            scale: scale as u32,
        },
        ChValue::Decimal64(scale, digits) => Value::Decimal {
            digits: digits as i128,
            scale: scale as u32,
        },
        ChValue::Decimal128(scale, digits) => Value::Decimal {
            digits,
            scale: scale as u32,
        },
        ChValue::String(bytes) => {
            let bytes = bytes.to_vec();
            match String::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            }
        }
        ChValue::Date(d) => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            Value::Date(epoch + ChronoDuration::days(d.0 as i64))
        }
        ChValue::DateTime(dt) => match Utc.timestamp_opt(dt.1 as i64, 0).single() {
            Some(ts) => Value::Timestamp(ts),
            None => Value::String(format!("{:?}", dt)),
        },
        ChValue::Array(items) => Value::Array(items.into_iter().map(convert_value).collect()),
        ChValue::Tuple(items) => Value::Nested(items.into_iter().map(convert_value).collect()),
        other => Value::String(format!("{:?}", other)),
    }
}
