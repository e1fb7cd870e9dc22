//! Project CRUD, including sparse updates of the nested report template.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use crate::api::{
    error::{ApiError, ApiResult},
    gate::Identity,
    handlers::{actor_id, parse_entity_id, require_payload},
    AppState,
};
use crate::models::{
    CreateProjectRequest, ErrorResponse, MessageResponse, Project, UpdateProjectRequest,
};
use crate::patch::build_patch;
use crate::store::{collections, filter_eq, from_document, to_document, Document, EntityId};

#[utoipa::path(
    get,
    path = "/api/v1/projects",
    responses(
        (status = 200, description = "All projects", body = [Project])
    ),
    tag = "projects"
)]
pub async fn list_projects(state: Extension<Arc<AppState>>) -> ApiResult<Json<Vec<Project>>> {
    let docs = state
        .store
        .find(collections::PROJECTS, &Document::new())
        .await?;
    let projects = docs
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<Project>, _>>()?;
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/api/v1/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid project details", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[instrument(skip(state, payload))]
pub async fn create_project(
    state: Extension<Arc<AppState>>,
    identity: Extension<Identity>,
    payload: Option<Json<CreateProjectRequest>>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let owner_id = actor_id(&identity)?;
    let details = require_payload(payload)?;
    if details.name.trim().is_empty() {
        return Err(ApiError::Validation("project name is required".to_string()));
    }

    let project = Project {
        id: EntityId::generate(),
        name: details.name,
        description: details.description,
        template: details.template.unwrap_or_default(),
        owner_id: owner_id.clone(),
        admin_ids: vec![owner_id.clone()],
        member_ids: vec![owner_id],
        report_ids: Vec::new(),
    };

    state
        .store
        .insert_one(collections::PROJECTS, to_document(&project)?)
        .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{project_id}",
    params(("project_id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project", body = Project),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn get_project(
    state: Extension<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Project>> {
    let id = parse_entity_id(&project_id, "project")?;
    let doc = state
        .store
        .find_one(collections::PROJECTS, &filter_eq("_id", &id))
        .await?
        .ok_or_else(|| ApiError::NotFound("project not found".to_string()))?;
    Ok(Json(from_document(doc)?))
}

#[utoipa::path(
    put,
    path = "/api/v1/projects/{project_id}",
    params(("project_id" = String, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = MessageResponse),
        (status = 400, description = "Empty update", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[instrument(skip(state, payload))]
pub async fn update_project(
    state: Extension<Arc<AppState>>,
    Path(project_id): Path<String>,
    payload: Option<Json<UpdateProjectRequest>>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&project_id, "project")?;
    let details = require_payload(payload)?;

    // Only the fields the client actually set make it into the patch;
    // template fields flatten to template.* paths.
    let patch = build_patch(&details)?;
    if patch.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }

    let modified = state
        .store
        .update_one(collections::PROJECTS, &filter_eq("_id", &id), &patch)
        .await?;
    if modified == 0 {
        return Err(ApiError::NotFound("project not found".to_string()));
    }

    Ok(Json(MessageResponse {
        message: "project updated".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/projects/{project_id}",
    params(("project_id" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deleted", body = MessageResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn delete_project(
    state: Extension<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&project_id, "project")?;
    let deleted = state
        .store
        .delete_one(collections::PROJECTS, &filter_eq("_id", &id))
        .await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("project not found".to_string()));
    }
    Ok(Json(MessageResponse {
        message: "project deleted".to_string(),
    }))
}
