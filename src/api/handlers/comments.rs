//! Comments attached to bug reports.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use crate::api::{
    error::{ApiError, ApiResult},
    gate::Identity,
    handlers::{actor_id, parse_entity_id, reports::find_report_by_id, require_payload},
    AppState,
};
use crate::models::{Comment, CreateCommentRequest, ErrorResponse, MessageResponse};
use crate::store::{collections, filter_eq, from_document, to_document, EntityId};

const MAX_COMMENT_LEN: usize = 1000;

#[utoipa::path(
    get,
    path = "/api/v1/bug-reports/{report_id}/comments",
    params(("report_id" = String, Path, description = "Bug report id")),
    responses(
        (status = 200, description = "Comments on the report", body = [Comment]),
        (status = 404, description = "Bug report not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
pub async fn report_comments(
    state: Extension<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> ApiResult<Json<Vec<Comment>>> {
    let id = parse_entity_id(&report_id, "report")?;
    if find_report_by_id(state.store.as_ref(), &id).await?.is_none() {
        return Err(ApiError::NotFound("bug report not found".to_string()));
    }

    let docs = state
        .store
        .find(collections::COMMENTS, &filter_eq("reportId", &id))
        .await?;
    let comments = docs
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<Comment>, _>>()?;
    Ok(Json(comments))
}

#[utoipa::path(
    post,
    path = "/api/v1/bug-reports/{report_id}/comments",
    params(("report_id" = String, Path, description = "Bug report id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 400, description = "Invalid comment", body = ErrorResponse),
        (status = 404, description = "Bug report not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
#[instrument(skip(state, payload))]
pub async fn create_comment(
    state: Extension<Arc<AppState>>,
    identity: Extension<Identity>,
    Path(report_id): Path<String>,
    payload: Option<Json<CreateCommentRequest>>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let author_id = actor_id(&identity)?;
    let id = parse_entity_id(&report_id, "report")?;
    let details = require_payload(payload)?;

    if details.content.trim().is_empty() {
        return Err(ApiError::Validation("comment content is required".to_string()));
    }
    if details.content.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::Validation(format!(
            "comment content must be at most {MAX_COMMENT_LEN} characters"
        )));
    }

    if find_report_by_id(state.store.as_ref(), &id).await?.is_none() {
        return Err(ApiError::NotFound("bug report not found".to_string()));
    }

    let comment = Comment {
        id: EntityId::generate(),
        author_id,
        report_id: id,
        content: details.content,
        created_at: Utc::now(),
    };

    state
        .store
        .insert_one(collections::COMMENTS, to_document(&comment)?)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{comment_id}",
    params(("comment_id" = String, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment deleted", body = MessageResponse),
        (status = 404, description = "Comment not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
pub async fn delete_comment(
    state: Extension<Arc<AppState>>,
    Path(comment_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&comment_id, "comment")?;
    let deleted = state
        .store
        .delete_one(collections::COMMENTS, &filter_eq("_id", &id))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("comment not found".to_string()));
    }
    Ok(Json(MessageResponse {
        message: "comment deleted".to_string(),
    }))
}
