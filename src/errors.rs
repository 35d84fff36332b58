use crate::services::gateway::GatewayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: a status code plus the message shown to the user.
///
/// Serialized as `{"error": <message>, "status": <code>}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// 400 Bad Request, for malformed input caught before any remote call.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = self.status.as_u16(), error = %self.message, "request failed");
        }
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(format!("{:#}", err))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Mismatch { .. } | GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Remote { .. } => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_to_distinct_statuses() {
        let cases = [
            (GatewayError::NotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (
                GatewayError::Validation("file key is required".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::Mismatch {
                    field: "Bucket",
                    expected: "b2".into(),
                    actual: "b1".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (GatewayError::remote("list", "timeout"), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn mismatch_message_is_surfaced_verbatim() {
        let err = AppError::from(GatewayError::Mismatch {
            field: "Bucket",
            expected: "b2".into(),
            actual: "b1".into(),
        });
        assert_eq!(
            err.message,
            "Bucket mismatch. Backend configured for: b2 (requested: b1)"
        );
    }
}
