use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// Errors surfaced by the login endpoints.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Request lacks the required `sid`.
    #[error("missing sid")]
    MissingSessionId,

    /// Caller-supplied `sid` is not a well-formed session id.
    #[error("invalid sid")]
    InvalidSessionId,

    /// The platform failed to mint a QR code.
    #[error("QR issuance failed: {0}")]
    Issuance(#[source] Error),

    /// Authorization code exchange or profile lookup failed.
    #[error("authorization failed: {0}")]
    Authorization(#[source] Error),

    /// Push request failed verification or decoding.
    #[error("webhook rejected: {0}")]
    Webhook(#[source] Error),

    /// The endpoint belongs to a feature that is switched off.
    #[error("feature disabled")]
    Disabled,

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoginError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingSessionId | Self::InvalidSessionId | Self::Authorization(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Issuance(_) => StatusCode::BAD_GATEWAY,
            Self::Webhook(Error::Signature) => StatusCode::FORBIDDEN,
            Self::Webhook(_) => StatusCode::BAD_REQUEST,
            Self::Disabled => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Issuance(_) | Self::Authorization(_) => {
                tracing::error!(error = %self, "Login platform call failed");
            }
            Self::Webhook(_) => tracing::warn!(error = %self, "Webhook request rejected"),
            Self::Config(_) => tracing::error!(error = %self, "Login configuration error"),
            _ => {}
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<Error> for LoginError {
    fn from(e: Error) -> Self {
        match e {
            Error::Config(msg) => Self::Config(msg),
            other => Self::Webhook(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_4xx() {
        assert_eq!(LoginError::MissingSessionId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(LoginError::InvalidSessionId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            LoginError::Webhook(Error::Signature).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(LoginError::Disabled.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn issuance_failure_is_bad_gateway() {
        let err = LoginError::Issuance(Error::Api {
            operation: "qrcode create",
            errcode: 45009,
            errmsg: "api freq out of limit".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
