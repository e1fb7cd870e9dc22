//! OpenAPI document for the HTTP surface, served as plain JSON.

use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "bugtrail",
        description = "Bug tracking backend API"
    ),
    paths(
        crate::api::handlers::health::health,
        crate::api::handlers::auth::signup,
        crate::api::handlers::auth::login,
        crate::api::handlers::auth::logout,
        crate::api::handlers::auth::me,
        crate::api::handlers::users::get_user,
        crate::api::handlers::users::update_user,
        crate::api::handlers::users::delete_user,
        crate::api::handlers::users::user_reports,
        crate::api::handlers::companies::list_companies,
        crate::api::handlers::companies::create_company,
        crate::api::handlers::companies::join_company,
        crate::api::handlers::companies::company_reports,
        crate::api::handlers::projects::list_projects,
        crate::api::handlers::projects::create_project,
        crate::api::handlers::projects::get_project,
        crate::api::handlers::projects::update_project,
        crate::api::handlers::projects::delete_project,
        crate::api::handlers::reports::list_reports,
        crate::api::handlers::reports::create_report,
        crate::api::handlers::reports::get_report,
        crate::api::handlers::reports::update_report,
        crate::api::handlers::reports::update_status,
        crate::api::handlers::comments::report_comments,
        crate::api::handlers::comments::create_comment,
        crate::api::handlers::comments::delete_comment,
    ),
    components(schemas(
        crate::models::AuthResponse,
        crate::models::BugReport,
        crate::models::Comment,
        crate::models::Company,
        crate::models::CreateBugReportRequest,
        crate::models::CreateCommentRequest,
        crate::models::CreateCompanyRequest,
        crate::models::CreateProjectRequest,
        crate::models::ErrorResponse,
        crate::models::JoinCompanyRequest,
        crate::models::LoginRequest,
        crate::models::MessageResponse,
        crate::models::Project,
        crate::models::ReportStatus,
        crate::models::ReportTemplate,
        crate::models::Severity,
        crate::models::SignupRequest,
        crate::models::UpdateBugReportRequest,
        crate::models::UpdateProjectRequest,
        crate::models::UpdateReportStatusRequest,
        crate::models::UpdateUserRequest,
        crate::models::UserProfile,
    )),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User management"),
        (name = "companies", description = "Company management"),
        (name = "projects", description = "Project management"),
        (name = "bug-reports", description = "Bug report submission and triage"),
        (name = "comments", description = "Comments on bug reports"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_auth_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/v1/auth/signup"));
        assert!(paths.contains_key("/api/v1/auth/login"));
        assert!(paths.contains_key("/api/v1/bug-reports/{report_id}/status"));
        assert!(paths.contains_key("/health"));
    }
}
