//! Authentication gate for protected routes.
//!
//! Runs before every handler that requires an authenticated actor: extracts
//! the bearer token, verifies it against the token service, and injects the
//! resolved identity into the request extensions. Rejections are uniform
//! 401s with a fixed message; verification detail goes to the log only.

use crate::api::{error::ApiError, AppState};
use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;
use tracing::debug;

/// The authenticated actor, as resolved from the token's subject claim.
///
/// Retrievable by downstream handlers via `Extension<Identity>` without
/// re-parsing the token.
#[derive(Clone, Debug)]
pub struct Identity {
    pub subject: String,
}

/// Extract the token from an `Authorization` header value.
///
/// The header must be exactly two whitespace-separated tokens whose first is
/// the literal scheme `Bearer`, compared case-insensitively. Surrounding
/// whitespace around the token is tolerated.
#[must_use]
pub fn parse_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    Some(token)
}

pub async fn require_auth(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let Some(token) = parse_bearer(header) else {
        return ApiError::Unauthenticated.into_response();
    };

    let claims = match state.tokens.verify(token) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Rejected bearer token: {err}");
            return ApiError::Unauthenticated.into_response();
        }
    };

    let Some(subject) = claims.subject() else {
        debug!("Verified token carries no usable subject claim");
        return ApiError::Unauthenticated.into_response();
    };

    request.extensions_mut().insert(Identity { subject });
    next.run(request).await
}
