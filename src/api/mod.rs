//! Router construction and server wiring.

use crate::{store::Store, token::TokenService};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod error;
pub mod gate;
pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Read-only state shared by every request: the storage handle and the
/// token service. Built once at startup, never mutated afterwards.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }
}

/// Build the application router with all routes and layers registered.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .route("/api/v1/auth/signup", post(handlers::auth::signup))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/logout", post(handlers::auth::logout));

    let protected = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::me))
        .route(
            "/api/v1/users/:user_id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            "/api/v1/users/:user_id/reports",
            get(handlers::users::user_reports),
        )
        .route(
            "/api/v1/companies",
            get(handlers::companies::list_companies).post(handlers::companies::create_company),
        )
        .route(
            "/api/v1/companies/join",
            post(handlers::companies::join_company),
        )
        .route(
            "/api/v1/companies/:company_id/reports",
            get(handlers::companies::company_reports),
        )
        .route(
            "/api/v1/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route(
            "/api/v1/projects/:project_id",
            get(handlers::projects::get_project)
                .put(handlers::projects::update_project)
                .delete(handlers::projects::delete_project),
        )
        .route(
            "/api/v1/bug-reports",
            get(handlers::reports::list_reports).post(handlers::reports::create_report),
        )
        .route(
            "/api/v1/bug-reports/:report_id",
            get(handlers::reports::get_report).put(handlers::reports::update_report),
        )
        .route(
            "/api/v1/bug-reports/:report_id/status",
            put(handlers::reports::update_status),
        )
        .route(
            "/api/v1/bug-reports/:report_id/comments",
            get(handlers::comments::report_comments).post(handlers::comments::create_comment),
        )
        .route(
            "/api/v1/comments/:comment_id",
            delete(handlers::comments::delete_comment),
        )
        // Every route above requires a valid bearer token before the
        // handler runs.
        .layer(middleware::from_fn(gate::require_auth));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any);

    public.merge(protected).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(state)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
