use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{Caller, ListingId, Role, UserId};
use super::export::{ExportQuery, PipelineExport};
use super::repository::{AnalyticsSink, AtsStore, NotificationDispatcher};
use super::service::{ExternalApplyError, ExternalApplyService};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

type SharedService<S, N, E> = Arc<ExternalApplyService<S, N, E>>;

/// HTTP surface of the external-apply workflow.
pub fn external_apply_router<S, N, E>(service: SharedService<S, N, E>) -> Router
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    Router::new()
        .route(
            "/employer/settings/ats-defaults",
            post(employer_defaults_handler::<S, N, E>),
        )
        .route(
            "/employer/internships/ats-config",
            post(listing_config_handler::<S, N, E>),
        )
        .route(
            "/employer/applications/ats",
            post(bulk_handler::<S, N, E>),
        )
        .route(
            "/employer/applications/ats/export",
            get(export_handler::<S, N, E>),
        )
        .route(
            "/internships/:listing_id/ats-config",
            get(effective_config_handler::<S, N, E>),
        )
        .route("/apply/:listing_id", post(submit_handler::<S, N, E>))
        .route(
            "/apply/:listing_id/external",
            get(external_redirect_handler::<S, N, E>),
        )
        .with_state(service)
}

/// Identity resolved upstream. A missing or malformed user id means the
/// request is not signed in; an unknown role reads as no role.
pub fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(UserId::parse)?;
    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Role::from_label);

    Some(Caller { user_id, role })
}

fn signed_in(headers: &HeaderMap) -> Result<Caller, ExternalApplyError> {
    caller_from_headers(headers).ok_or(ExternalApplyError::Unauthenticated)
}

impl IntoResponse for ExternalApplyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "external apply request failed");
            "Something went wrong. Please try again.".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn employer_defaults_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    let result = signed_in(&headers)
        .and_then(|caller| service.update_employer_defaults(&caller, &body));
    match result {
        Ok(defaults) => (StatusCode::OK, Json(defaults)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn listing_config_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    let result =
        signed_in(&headers).and_then(|caller| service.configure_listing(&caller, &body));
    match result {
        Ok(effective) => {
            (StatusCode::OK, Json(json!({ "ok": true, "effective": effective }))).into_response()
        }
        Err(error) => error.into_response(),
    }
}

async fn bulk_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    match signed_in(&headers).and_then(|caller| service.bulk_update(&caller, &body)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn export_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    match signed_in(&headers).and_then(|caller| service.export_pipeline(&caller, &query)) {
        Ok(PipelineExport::Csv(body)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"ats-pipeline.csv\"",
                ),
            ],
            body,
        )
            .into_response(),
        Ok(PipelineExport::Summary(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn effective_config_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    Path(listing_id): Path<String>,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    let result = ListingId::parse(&listing_id)
        .ok_or_else(|| ExternalApplyError::NotFound("Internship not found.".to_string()))
        .and_then(|id| service.effective_config(&id));
    match result {
        Ok(effective) => (StatusCode::OK, Json(effective)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn submit_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    let result = signed_in(&headers).and_then(|caller| {
        let listing_id = ListingId::parse(&listing_id).ok_or_else(|| {
            ExternalApplyError::InvalidInput("listing id must be a valid identifier.".to_string())
        })?;
        service.submit_application(&caller, &listing_id)
    });
    match result {
        Ok(submitted) => (StatusCode::CREATED, Json(submitted)).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalApplyParams {
    pub application: Option<String>,
}

async fn external_redirect_handler<S, N, E>(
    State(service): State<SharedService<S, N, E>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
    Query(params): Query<ExternalApplyParams>,
) -> Response
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    let caller = caller_from_headers(&headers);
    let listing_id = ListingId::parse(&listing_id);

    match service.external_click(
        caller.as_ref(),
        listing_id.as_ref(),
        params.application.as_deref(),
    ) {
        Ok(redirect) => Redirect::temporary(&redirect.location).into_response(),
        Err(rejection) => Redirect::to(&rejection.location(listing_id.as_ref())).into_response(),
    }
}
