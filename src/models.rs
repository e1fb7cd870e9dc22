//! Entity records and API request/response types.
//!
//! Entities serialize to the same camelCase shape in storage documents and
//! API responses. The one deliberate exception is the user record, whose
//! password hash never leaves the process; responses carry [`UserProfile`].

use crate::store::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stored user record. Not a response type: it carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub project_ids: Vec<EntityId>,
    #[serde(default)]
    pub company_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sanitized user representation returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub username: String,
    pub email: String,
    pub project_ids: Vec<EntityId>,
    pub company_id: Option<EntityId>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            project_ids: user.project_ids,
            company_id: user.company_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    pub owner_id: EntityId,
    pub accepting_reports: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bug report template a project asks reporters to follow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportTemplate {
    pub title: String,
    pub description: String,
    pub steps: String,
    pub expected_behaviour: String,
    pub additional_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template: ReportTemplate,
    pub owner_id: EntityId,
    #[serde(default)]
    pub admin_ids: Vec<EntityId>,
    #[serde(default)]
    pub member_ids: Vec<EntityId>,
    #[serde(default)]
    pub report_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Accepted,
    Rejected,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BugReport {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: ReportStatus,
    #[serde(default)]
    pub steps_to_reproduce: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub reporter_id: EntityId,
    pub company_id: EntityId,
    pub company_name: String,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub author_id: EntityId,
    pub report_id: EntityId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Partial user update; empty fields are left untouched.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// The patchable user fields, as persisted (the password arrives separately
/// and is stored as a hash).
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCompanyRequest {
    pub name: String,
    pub industry: String,
    pub description: String,
    pub website: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinCompanyRequest {
    pub company_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template: Option<ReportTemplate>,
}

/// Partial project update; nested template fields flatten to dotted paths.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: String,
    pub description: String,
    pub template: ReportTemplate,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBugReportRequest {
    pub company_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub steps_to_reproduce: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Partial bug report update; absent severity means "leave as is".
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateBugReportRequest {
    pub title: String,
    pub description: String,
    pub steps_to_reproduce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReportStatusRequest {
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// Successful login/signup payload: the bearer token plus the sanitized user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
