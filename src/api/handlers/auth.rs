//! Login, signup, and current-user endpoints.
//!
//! The only handlers that ever see a plaintext password; it is verified or
//! hashed in place and never stored or logged. Login failures are uniform
//! 401s so responses do not reveal whether an email is registered.

use axum::{extract::Extension, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::api::{
    error::{ApiError, ApiResult},
    gate::Identity,
    handlers::{actor_id, require_payload, valid_email},
    AppState,
};
use crate::models::{AuthResponse, ErrorResponse, LoginRequest, SignupRequest, User, UserProfile};
use crate::password::{self, MIN_PASSWORD_LEN};
use crate::store::{collections, filter_eq, from_document, to_document, EntityId, Store};

pub(crate) async fn find_user_by_email(
    store: &dyn Store,
    email: &str,
) -> ApiResult<Option<User>> {
    let doc = store
        .find_one(collections::USERS, &filter_eq("email", email))
        .await?;
    Ok(doc.map(from_document).transpose()?)
}

pub(crate) async fn find_user_by_id(
    store: &dyn Store,
    id: &EntityId,
) -> ApiResult<Option<User>> {
    let doc = store
        .find_one(collections::USERS, &filter_eq("_id", id))
        .await?;
    Ok(doc.map(from_document).transpose()?)
}

fn validate_signup(details: &SignupRequest) -> ApiResult<()> {
    if !(5..=25).contains(&details.username.chars().count()) {
        return Err(ApiError::Validation(
            "username must be between 5 and 25 characters".to_string(),
        ));
    }
    if !valid_email(&details.email) {
        return Err(ApiError::Validation("invalid email address".to_string()));
    }
    if details.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Invalid signup details", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn signup(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<SignupRequest>>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let details = require_payload(payload)?;
    validate_signup(&details)?;

    if find_user_by_email(state.store.as_ref(), &details.email)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "a user with this email already exists".to_string(),
        ));
    }

    let password_hash = password::hash(&details.password)?;
    let now = Utc::now();
    let user = User {
        id: EntityId::generate(),
        username: details.username,
        email: details.email,
        password_hash,
        project_ids: Vec::new(),
        company_id: None,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .insert_one(collections::USERS, to_document(&user)?)
        .await?;

    // The credential write already happened: a signing failure from here on
    // is surfaced as its own condition, never as a silent success.
    let token = state
        .tokens
        .sign(user.id.as_str())
        .map_err(ApiError::TokenIssuance)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let details = require_payload(payload)?;

    let Some(user) = find_user_by_email(state.store.as_ref(), &details.email).await? else {
        debug!("Login attempt for unknown email");
        return Err(ApiError::Unauthenticated);
    };

    if !password::verify(&user.password_hash, &details.password) {
        debug!("Login attempt with wrong password");
        return Err(ApiError::Unauthenticated);
    }

    let token = state
        .tokens
        .sign(user.id.as_str())
        .map_err(ApiError::TokenIssuance)?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

// Stateless tokens have nothing to revoke server-side; logout just tells the
// client to drop the token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Client should discard its token")
    ),
    tag = "auth"
)]
pub async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Authenticated user profile", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(
    state: Extension<Arc<AppState>>,
    identity: Extension<Identity>,
) -> ApiResult<Json<UserProfile>> {
    let id = actor_id(&identity)?;
    let user = find_user_by_id(state.store.as_ref(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(Json(user.into()))
}
