// Configuration module
//
// All settings come from environment variables, read once at startup and
// immutable afterwards. Defaults match the ClickHouse native-protocol
// conventions (port 9000, database "default").

use std::env;

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Target ClickHouse host (CLICKHOUSE_HOST)
    pub clickhouse_host: String,
    /// Target ClickHouse native-protocol port (CLICKHOUSE_PORT)
    pub clickhouse_port: u16,
    /// Database used when a request names none (CLICKHOUSE_DATABASE)
    pub clickhouse_database: String,
    /// HTTP listen port (PORT)
    pub server_port: u16,
    /// Log level for the tracing filter (LOG_LEVEL)
    pub log_level: String,
    /// Actix worker count, 0 = one per core (WORKERS)
    pub workers: usize,
}

fn default_clickhouse_host() -> String {
    "localhost".to_string()
}

fn default_clickhouse_port() -> u16 {
    9000
}

fn default_clickhouse_database() -> String {
    "default".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            clickhouse_host: default_clickhouse_host(),
            clickhouse_port: default_clickhouse_port(),
            clickhouse_database: default_clickhouse_database(),
            server_port: default_server_port(),
            log_level: default_log_level(),
            workers: 0,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = ProxyConfig::default();

        if let Ok(host) = env::var("CLICKHOUSE_HOST") {
            config.clickhouse_host = host;
        }
        if let Ok(port) = env::var("CLICKHOUSE_PORT") {
            config.clickhouse_port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid CLICKHOUSE_PORT value: {}", port))?;
        }
        if let Ok(database) = env::var("CLICKHOUSE_DATABASE") {
            config.clickhouse_database = database;
        }
        if let Ok(port) = env::var("PORT") {
            config.server_port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid PORT value: {}", port))?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(workers) = env::var("WORKERS") {
            config.workers = workers
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid WORKERS value: {}", workers))?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.clickhouse_host.is_empty() {
            return Err(anyhow::anyhow!("ClickHouse host cannot be empty"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        Ok(())
    }

    /// Native-protocol address of the target ClickHouse server.
    pub fn clickhouse_addr(&self) -> String {
        format!("{}:{}", self.clickhouse_host, self.clickhouse_port)
    }
}
