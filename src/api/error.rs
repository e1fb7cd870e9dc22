//! API error taxonomy.
//!
//! Validation, authentication, and conflict rejections carry their message
//! to the client; internal failures (storage, hashing, token issuance) are
//! logged with detail and answered with a generic body.

use crate::{password, patch, store::StoreError, token};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid or missing credentials")]
    Unauthenticated,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("failed to issue token")]
    TokenIssuance(#[source] token::Error),
    #[error("password hashing failed")]
    Hashing(#[from] password::Error),
    #[error("failed to build update patch")]
    Patch(#[from] patch::Error),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            Self::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            Self::TokenIssuance(err) => {
                error!("Failed to issue token: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to issue token".to_string(),
                )
            }
            Self::Hashing(err) => {
                error!("Password hashing failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            Self::Patch(err) => {
                error!("Failed to build update patch: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            Self::Storage(err) => {
                error!("Storage failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn errors_map_to_documented_statuses() {
        assert_eq!(
            status_of(ApiError::Validation("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ApiError::NotFound("missing".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::Conflict("dup".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApiError::Storage(StoreError::Timeout)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::TokenIssuance(token::Error::MissingSecret)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
