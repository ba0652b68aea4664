// ClickHouse HTTP Proxy
//
// HTTP-facing gateway that forwards SQL to ClickHouse over the native
// protocol, for clients that cannot speak it themselves (browsers,
// serverless runtimes without native driver support).

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Result;
use clickhouse_proxy::client::{ConnectionFactory, NativeConnectionFactory};
use clickhouse_proxy::config::ProxyConfig;
use clickhouse_proxy::handlers::AppState;
use clickhouse_proxy::session::SessionCache;
use clickhouse_proxy::{logging, routes};
use log::info;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::from_env()?;

    logging::init_logging(&config.log_level)?;

    info!("Starting ClickHouse HTTP Proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("Server configuration:");
    info!("  PORT: {}", config.server_port);
    info!("  CLICKHOUSE_HOST: {}", config.clickhouse_host);
    info!("  CLICKHOUSE_PORT: {}", config.clickhouse_port);
    info!("  CLICKHOUSE_DATABASE: {}", config.clickhouse_database);

    let sessions = Arc::new(SessionCache::new());
    let factory: Arc<dyn ConnectionFactory> = Arc::new(NativeConnectionFactory::new(&config));

    let state = web::Data::new(AppState {
        config: config.clone(),
        sessions: sessions.clone(),
        factory,
    });

    let bind_addr = format!("0.0.0.0:{}", config.server_port);
    info!("Starting HTTP server on {}", bind_addr);
    info!("ClickHouse target: {}", config.clickhouse_addr());

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes::configure_routes)
    })
    .bind(&bind_addr)?
    .workers(if config.workers == 0 {
        num_cpus::get()
    } else {
        config.workers
    })
    .run()
    .await?;

    // Drain session connections before exit; disconnect is best effort.
    sessions.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}
