//! Defines routes for the bucket manager JSON API.
//!
//! ## Structure
//! - `GET    /health`               — liveness
//! - `GET    /ready`                — readiness (session + store probe)
//! - `GET    /api/objects?prefix=`  — entries directly under a prefix
//! - `DELETE /api/objects/{*key}`   — delete one object
//! - `POST   /api/upload`           — multipart upload (`file`, `key`)
//! - `GET    /api/download/{*key}`  — signed download URL
//! - `POST   /api/test`             — connection test
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        health_handlers::{health, ready},
        object_handlers::{
            delete_object, download_url, list_objects, test_connection, upload_object,
        },
    },
    services::session::StoreSession,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{delete, get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Build the router. Uploads larger than `max_upload_bytes` are rejected
/// with 413 before reaching the store.
pub fn routes(max_upload_bytes: usize) -> Router<StoreSession> {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/objects", get(list_objects))
        .route("/api/objects/{*key}", delete(delete_object))
        .route(
            "/api/upload",
            post(upload_object).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/download/{*key}", get(download_url))
        .route("/api/test", post(test_connection))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
