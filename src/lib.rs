//! ClickHouse HTTP Proxy Library
//!
//! Exposes the proxy modules for integration testing.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod params;
pub mod response;
pub mod routes;
pub mod serialize;
pub mod session;
pub mod trace;
pub mod value;
