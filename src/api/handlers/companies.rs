//! Company listing, creation, membership, and per-company reports.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, instrument};

use crate::api::{
    error::{ApiError, ApiResult},
    gate::Identity,
    handlers::{actor_id, auth::find_user_by_id, parse_entity_id, require_payload},
    AppState,
};
use crate::models::{
    BugReport, Company, CreateCompanyRequest, ErrorResponse, JoinCompanyRequest, MessageResponse,
};
use crate::store::{
    collections, filter_eq, from_document, to_document, Document, EntityId, Store,
};

pub(crate) async fn find_company_by_id(
    store: &dyn Store,
    id: &EntityId,
) -> ApiResult<Option<Company>> {
    let doc = store
        .find_one(collections::COMPANIES, &filter_eq("_id", id))
        .await?;
    Ok(doc.map(from_document).transpose()?)
}

#[utoipa::path(
    get,
    path = "/api/v1/companies",
    responses(
        (status = 200, description = "All companies", body = [Company])
    ),
    tag = "companies"
)]
pub async fn list_companies(state: Extension<Arc<AppState>>) -> ApiResult<Json<Vec<Company>>> {
    let docs = state
        .store
        .find(collections::COMPANIES, &Document::new())
        .await?;
    let companies = docs
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<Company>, _>>()?;
    Ok(Json(companies))
}

#[utoipa::path(
    post,
    path = "/api/v1/companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created", body = Company),
        (status = 400, description = "Invalid company details", body = ErrorResponse),
        (status = 409, description = "Owner already has a company", body = ErrorResponse)
    ),
    tag = "companies"
)]
#[instrument(skip(state, payload))]
pub async fn create_company(
    state: Extension<Arc<AppState>>,
    identity: Extension<Identity>,
    payload: Option<Json<CreateCompanyRequest>>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    let owner_id = actor_id(&identity)?;
    let details = require_payload(payload)?;
    if details.name.trim().is_empty() {
        return Err(ApiError::Validation("company name is required".to_string()));
    }

    let existing = state
        .store
        .find_one(collections::COMPANIES, &filter_eq("ownerId", &owner_id))
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "user already has a company".to_string(),
        ));
    }

    let now = Utc::now();
    let company = Company {
        id: EntityId::generate(),
        name: details.name,
        industry: details.industry,
        description: details.description,
        website: details.website,
        owner_id: owner_id.clone(),
        accepting_reports: true,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .insert_one(collections::COMPANIES, to_document(&company)?)
        .await?;

    // Link the owner to the company; the company itself is already created,
    // so a failure here is logged rather than failing the request.
    let mut link = Document::new();
    link.insert("companyId".to_string(), company.id.clone().into());
    link.insert("updatedAt".to_string(), json!(now));
    if let Err(err) = state
        .store
        .update_one(collections::USERS, &filter_eq("_id", &owner_id), &link)
        .await
    {
        error!("Failed to link user to company: {err}");
    }

    Ok((StatusCode::CREATED, Json(company)))
}

#[utoipa::path(
    post,
    path = "/api/v1/companies/join",
    request_body = JoinCompanyRequest,
    responses(
        (status = 200, description = "Joined company", body = MessageResponse),
        (status = 404, description = "Company not found", body = ErrorResponse),
        (status = 409, description = "User already belongs to a company", body = ErrorResponse)
    ),
    tag = "companies"
)]
#[instrument(skip(state, payload))]
pub async fn join_company(
    state: Extension<Arc<AppState>>,
    identity: Extension<Identity>,
    payload: Option<Json<JoinCompanyRequest>>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = actor_id(&identity)?;
    let details = require_payload(payload)?;
    let company_id = parse_entity_id(&details.company_id, "company")?;

    let company = find_company_by_id(state.store.as_ref(), &company_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("company not found".to_string()))?;

    let user = find_user_by_id(state.store.as_ref(), &user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    if user.company_id.is_some() {
        return Err(ApiError::Conflict(
            "user is already part of a company".to_string(),
        ));
    }

    let mut link = Document::new();
    link.insert("companyId".to_string(), company_id.into());
    link.insert("updatedAt".to_string(), json!(Utc::now()));
    state
        .store
        .update_one(collections::USERS, &filter_eq("_id", &user_id), &link)
        .await?;

    Ok(Json(MessageResponse {
        message: format!("successfully joined {}", company.name),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/companies/{company_id}/reports",
    params(("company_id" = String, Path, description = "Company id")),
    responses(
        (status = 200, description = "Bug reports filed against the company", body = [BugReport]),
        (status = 404, description = "Company not found", body = ErrorResponse)
    ),
    tag = "companies"
)]
pub async fn company_reports(
    state: Extension<Arc<AppState>>,
    Path(company_id): Path<String>,
) -> ApiResult<Json<Vec<BugReport>>> {
    let id = parse_entity_id(&company_id, "company")?;
    if find_company_by_id(state.store.as_ref(), &id).await?.is_none() {
        return Err(ApiError::NotFound("company not found".to_string()));
    }

    let docs = state
        .store
        .find(collections::REPORTS, &filter_eq("companyId", &id))
        .await?;
    let reports = docs
        .into_iter()
        .map(from_document)
        .collect::<Result<Vec<BugReport>, _>>()?;
    Ok(Json(reports))
}
