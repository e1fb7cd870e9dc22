//! Bug report submission, lookup, and status transitions.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::api::{
    error::{ApiError, ApiResult},
    gate::Identity,
    handlers::{
        actor_id, auth::find_user_by_id, companies::find_company_by_id, parse_entity_id,
        require_payload,
    },
    AppState,
};
use crate::models::{
    BugReport, CreateBugReportRequest, ErrorResponse, MessageResponse, ReportStatus,
    UpdateBugReportRequest, UpdateReportStatusRequest,
};
use crate::patch::build_patch;
use crate::store::{collections, filter_eq, from_document, to_document, Document, EntityId, Store};

pub(crate) async fn find_report_by_id(
    store: &dyn Store,
    id: &EntityId,
) -> ApiResult<Option<BugReport>> {
    let doc = store
        .find_one(collections::REPORTS, &filter_eq("_id", id))
        .await?;
    Ok(doc.map(from_document).transpose()?)
}

#[utoipa::path(
    get,
    path = "/api/v1/bug-reports",
    responses(
        (status = 200, description = "All bug reports", body = [BugReport])
    ),
    tag = "bug-reports"
)]
pub async fn list_reports(state: Extension<Arc<AppState>>) -> ApiResult<Json<Vec<BugReport>>> {
    let docs = state
        .store
        .find(collections::REPORTS, &Document::new())
        .await?;
    let reports = docs
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<BugReport>, _>>()?;
    Ok(Json(reports))
}

#[utoipa::path(
    post,
    path = "/api/v1/bug-reports",
    request_body = CreateBugReportRequest,
    responses(
        (status = 201, description = "Bug report submitted", body = BugReport),
        (status = 400, description = "Invalid report details", body = ErrorResponse),
        (status = 404, description = "Company or reporter not found", body = ErrorResponse)
    ),
    tag = "bug-reports"
)]
#[instrument(skip(state, payload))]
pub async fn create_report(
    state: Extension<Arc<AppState>>,
    identity: Extension<Identity>,
    payload: Option<Json<CreateBugReportRequest>>,
) -> ApiResult<(StatusCode, Json<BugReport>)> {
    let reporter_id = actor_id(&identity)?;
    let details = require_payload(payload)?;
    if details.title.trim().is_empty() || details.description.trim().is_empty() {
        return Err(ApiError::Validation(
            "title and description are required".to_string(),
        ));
    }
    let company_id = parse_entity_id(&details.company_id, "company")?;

    let company = find_company_by_id(state.store.as_ref(), &company_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("company not found".to_string()))?;

    if find_user_by_id(state.store.as_ref(), &reporter_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("user not found".to_string()));
    }

    let now = Utc::now();
    let report = BugReport {
        id: EntityId::generate(),
        title: details.title,
        description: details.description,
        severity: details.severity,
        status: ReportStatus::Pending,
        steps_to_reproduce: details.steps_to_reproduce,
        is_anonymous: details.is_anonymous,
        reporter_id,
        company_id,
        company_name: company.name,
        submitted_at: now,
        updated_at: now,
    };

    state
        .store
        .insert_one(collections::REPORTS, to_document(&report)?)
        .await?;

    Ok((StatusCode::CREATED, Json(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/bug-reports/{report_id}",
    params(("report_id" = String, Path, description = "Bug report id")),
    responses(
        (status = 200, description = "Bug report", body = BugReport),
        (status = 404, description = "Bug report not found", body = ErrorResponse)
    ),
    tag = "bug-reports"
)]
pub async fn get_report(
    state: Extension<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> ApiResult<Json<BugReport>> {
    let id = parse_entity_id(&report_id, "report")?;
    let report = find_report_by_id(state.store.as_ref(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("bug report not found".to_string()))?;
    Ok(Json(report))
}

#[utoipa::path(
    put,
    path = "/api/v1/bug-reports/{report_id}",
    params(("report_id" = String, Path, description = "Bug report id")),
    request_body = UpdateBugReportRequest,
    responses(
        (status = 200, description = "Bug report updated", body = MessageResponse),
        (status = 400, description = "Empty update", body = ErrorResponse),
        (status = 404, description = "Bug report not found", body = ErrorResponse)
    ),
    tag = "bug-reports"
)]
#[instrument(skip(state, payload))]
pub async fn update_report(
    state: Extension<Arc<AppState>>,
    Path(report_id): Path<String>,
    payload: Option<Json<UpdateBugReportRequest>>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&report_id, "report")?;
    let details = require_payload(payload)?;

    let mut patch = build_patch(&details)?;
    if patch.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    patch.insert("updatedAt".to_string(), json!(Utc::now()));

    let modified = state
        .store
        .update_one(collections::REPORTS, &filter_eq("_id", &id), &patch)
        .await?;
    if modified == 0 {
        return Err(ApiError::NotFound("bug report not found".to_string()));
    }

    Ok(Json(MessageResponse {
        message: "bug report updated".to_string(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/bug-reports/{report_id}/status",
    params(("report_id" = String, Path, description = "Bug report id")),
    request_body = UpdateReportStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = MessageResponse),
        (status = 404, description = "Bug report not found", body = ErrorResponse)
    ),
    tag = "bug-reports"
)]
#[instrument(skip(state, payload))]
pub async fn update_status(
    state: Extension<Arc<AppState>>,
    Path(report_id): Path<String>,
    payload: Option<Json<UpdateReportStatusRequest>>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_entity_id(&report_id, "report")?;
    let details = require_payload(payload)?;

    let mut patch = Document::new();
    patch.insert("status".to_string(), json!(details.status));
    patch.insert("updatedAt".to_string(), json!(Utc::now()));

    let modified = state
        .store
        .update_one(collections::REPORTS, &filter_eq("_id", &id), &patch)
        .await?;
    if modified == 0 {
        return Err(ApiError::NotFound("bug report not found".to_string()));
    }

    Ok(Json(MessageResponse {
        message: "status updated".to_string(),
    }))
}
