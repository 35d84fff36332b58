//! Health & readiness handlers.
//!
//! - GET /health -> liveness with a timestamp, never touches the store
//! - GET /ready  -> readiness: session configured and store reachable

use crate::services::session::StoreSession;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    )
}

/// `GET /ready`
///
/// Reports each check separately. HTTP 200 when all pass, 503 otherwise.
pub async fn ready(State(session): State<StoreSession>) -> impl IntoResponse {
    let mut checks = HashMap::new();

    let store_check = match session.current() {
        Ok(gateway) => {
            checks.insert(
                "session",
                CheckStatus {
                    ok: true,
                    error: None,
                },
            );
            match gateway.probe().await {
                Ok(()) => CheckStatus {
                    ok: true,
                    error: None,
                },
                Err(e) => CheckStatus {
                    ok: false,
                    error: Some(e.to_string()),
                },
            }
        }
        Err(e) => {
            checks.insert(
                "session",
                CheckStatus {
                    ok: false,
                    error: Some(e.to_string()),
                },
            );
            CheckStatus {
                ok: false,
                error: Some("skipped".into()),
            }
        }
    };
    checks.insert("store", store_check);

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
