//! HTTP route registration.
//!
//! Mirrors the ClickHouse HTTP API surface: `/health` and the bare root are
//! health checks, `/query` (any prefix) and the root execute SQL, OPTIONS
//! answers the CORS preflight on every path, and everything else gets the
//! 404 error envelope.

use crate::error::ProxyError;
use crate::handlers;
use crate::response;
use actix_web::http::{Method, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};

/// Configure all proxy routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/health")
            .route(web::get().to(handlers::health::health))
            .route(web::method(Method::OPTIONS).to(preflight))
            .default_service(web::route().to(fallback)),
    )
    .service(
        web::resource("/")
            .route(web::get().to(handlers::query::get_root))
            .route(web::post().to(handlers::query::post_query))
            .route(web::method(Method::OPTIONS).to(preflight))
            .default_service(web::route().to(fallback)),
    )
    // Any path starting with /query, slash-separated or not
    .service(
        web::resource("/query{tail:.*}")
            .route(web::get().to(handlers::query::get_query))
            .route(web::post().to(handlers::query::post_query))
            .route(web::method(Method::OPTIONS).to(preflight))
            .default_service(web::route().to(fallback)),
    )
    .default_service(web::route().to(fallback));
}

/// CORS preflight: 200 with the CORS headers and an empty body.
async fn preflight() -> HttpResponse {
    response::builder_with_cors(StatusCode::OK).finish()
}

/// Unmatched path: preflight still succeeds, anything else is the 404
/// envelope naming the path.
async fn fallback(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        preflight().await
    } else {
        response::error_json(&ProxyError::NotFound(req.path().to_string()))
    }
}
