use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{AuthError, ProvisionError, StoreError};

/// Access errors for read endpoints.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// No authenticated identity in the session.
    #[error("Unauthorized")]
    Unauthenticated,

    /// Authenticated (or not) but lacking the required role.
    #[error("Forbidden")]
    Forbidden,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            Self::Store(ref e) => {
                tracing::error!(error = %e, "Store error while serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let reason = match self {
            Self::InvalidSignature => "Invalid signature.",
            Self::InvalidNonce => "Invalid nonce.",
            Self::MalformedPayload(_) => "Malformed SSO payload.",
        };
        (StatusCode::BAD_REQUEST, reason).into_response()
    }
}

impl IntoResponse for ProvisionError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::UnknownDomain(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Conflict { .. } => (StatusCode::CONFLICT, self.to_string()),
            Self::DnsProviderFailure(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail.clone()),
            Self::PersistenceFailure(detail) => {
                tracing::error!(error = %detail, "Persistence failure during registration");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to save data to database.".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
