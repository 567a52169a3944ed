// API error type and its JSON rendering

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use vexor_sandbox::{ErrorKind, SandboxError};

use crate::collaborators::CollaboratorError;
use crate::metrics;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Upstream(#[from] CollaboratorError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sandbox(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Compilation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Runtime => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Machine-readable `kind` field of the error body
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "validation_error",
            ApiError::Sandbox(e) => e.kind().code(),
            ApiError::Upstream(_) => "upstream_error",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Sandbox(e) => e.user_message(),
            ApiError::Upstream(e) => format!("{} request failed, please try again later", e.service()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Upstream(e) => {
                metrics::COLLABORATOR_FAILURES
                    .with_label_values(&[e.service()])
                    .inc();
                error!(error = %e, "Collaborator call failed");
            }
            ApiError::Sandbox(e) if status.is_server_error() => {
                error!(error = %e, kind = self.code(), "Sandbox failure");
            }
            _ => warn!(error = %self, kind = self.code(), "Request rejected"),
        }

        (
            status,
            Json(json!({
                "error": self.message(),
                "kind": self.code(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vexor_sandbox::SourceOrigin;

    #[test]
    fn test_sandbox_errors_map_to_statuses() {
        let cases = [
            (SandboxError::Validation("x".into()), StatusCode::BAD_REQUEST, "validation_error"),
            (
                SandboxError::Compilation {
                    origin: SourceOrigin::UserCode,
                    message: "x".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
                "compilation_error",
            ),
            (SandboxError::Timeout { timeout_ms: 1 }, StatusCode::GATEWAY_TIMEOUT, "execution_timeout"),
            (SandboxError::OutOfMemory { limit_mb: 8 }, StatusCode::INTERNAL_SERVER_ERROR, "runtime_error"),
            (SandboxError::Overloaded { waited_ms: 1 }, StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn test_upstream_errors_hide_details() {
        let api = ApiError::from(CollaboratorError::Status {
            service: "gemini",
            status: 401,
            body: "API key not valid".into(),
        });
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(api.code(), "upstream_error");
        assert!(!api.message().contains("API key"));
    }
}
