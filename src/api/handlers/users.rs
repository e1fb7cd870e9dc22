//! User lookup, partial update, and deletion.

use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::api::{
    error::{ApiError, ApiResult},
    handlers::{auth::find_user_by_id, parse_entity_id, require_payload, valid_email},
    AppState,
};
use crate::models::{
    BugReport, ErrorResponse, MessageResponse, UpdateUserRequest, UserPatch, UserProfile,
};
use crate::password::{self, MIN_PASSWORD_LEN};
use crate::patch::build_patch;
use crate::store::{collections, filter_eq, from_document};

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User profile", body = UserProfile),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    state: Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let id = parse_entity_id(&user_id, "user")?;
    let user = find_user_by_id(state.store.as_ref(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = MessageResponse),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
#[instrument(skip(state, payload))]
pub async fn update_user(
    state: Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Option<Json<UpdateUserRequest>>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&user_id, "user")?;
    let details = require_payload(payload)?;
    validate_update(&details)?;

    let mut patch = build_patch(&UserPatch {
        username: details.username,
        email: details.email,
    })?;
    if !details.password.is_empty() {
        // The plaintext never reaches the patch document.
        let hashed = password::hash(&details.password)?;
        patch.insert("passwordHash".to_string(), Value::String(hashed));
    }
    if patch.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    patch.insert("updatedAt".to_string(), serde_json::json!(Utc::now()));

    let modified = state
        .store
        .update_one(collections::USERS, &filter_eq("_id", &id), &patch)
        .await?;
    if modified == 0 {
        return Err(ApiError::NotFound("user not found".to_string()));
    }

    Ok(Json(MessageResponse {
        message: "user updated".to_string(),
    }))
}

fn validate_update(details: &UpdateUserRequest) -> ApiResult<()> {
    if !details.username.is_empty() && !(5..=25).contains(&details.username.chars().count()) {
        return Err(ApiError::Validation(
            "username must be between 5 and 25 characters".to_string(),
        ));
    }
    if !details.email.is_empty() && !valid_email(&details.email) {
        return Err(ApiError::Validation("invalid email address".to_string()));
    }
    if !details.password.is_empty() && details.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn delete_user(
    state: Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&user_id, "user")?;
    let deleted = state
        .store
        .delete_one(collections::USERS, &filter_eq("_id", &id))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("user not found".to_string()));
    }
    Ok(Json(MessageResponse {
        message: "user deleted".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/reports",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Bug reports submitted by the user", body = [BugReport])
    ),
    tag = "users"
)]
pub async fn user_reports(
    state: Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<BugReport>>> {
    let id = parse_entity_id(&user_id, "user")?;
    let docs = state
        .store
        .find(collections::REPORTS, &filter_eq("reporterId", &id))
        .await?;
    let reports = docs
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<BugReport>, _>>()?;
    Ok(Json(reports))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_validation_skips_empty_fields() {
        assert!(validate_update(&UpdateUserRequest::default()).is_ok());
    }

    #[test]
    fn update_validation_checks_supplied_fields() {
        assert!(validate_update(&UpdateUserRequest {
            username: "abc".to_string(),
            ..UpdateUserRequest::default()
        })
        .is_err());
        assert!(validate_update(&UpdateUserRequest {
            email: "broken".to_string(),
            ..UpdateUserRequest::default()
        })
        .is_err());
        assert!(validate_update(&UpdateUserRequest {
            password: "short".to_string(),
            ..UpdateUserRequest::default()
        })
        .is_err());
        assert!(validate_update(&UpdateUserRequest {
            username: "adalovelace".to_string(),
            email: "ada@example.test".to_string(),
            password: "longenough".to_string(),
        })
        .is_ok());
    }
}
