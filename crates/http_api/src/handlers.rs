use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use serde::de::DeserializeOwned;
use tracing::info;

use app_api::{
    AggregationsRequest, AppContext, ExportRequest, MetricsQueryRequest, OkResponse, RangeRequest,
};
use telemetry_app::{AppError, util::run_blocking};

use crate::{auth, errors::HttpError, state::HttpState};

pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

async fn blocking<T, F>(state: &HttpState, work: F) -> Result<T, HttpError>
where
    F: FnOnce(&AppContext) -> telemetry_app::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let context = state.context.clone();
    Ok(run_blocking(move || work(&context)).await?)
}

fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::InvalidInput(format!("invalid request body: {err}")))
}

pub async fn query_metrics(
    State(state): State<HttpState>,
    Query(req): Query<MetricsQueryRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let response = blocking(&state, move |ctx| app_api::query_metrics(ctx, req)).await?;
    Ok(Json(response))
}

pub async fn ingest_metric(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let value = serde_json::from_slice(&body)
        .map_err(|err| AppError::InvalidInput(format!("invalid metric body: {err}")))?;
    let response = app_api::ingest_metric(&state.context, value).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn aggregations(
    State(state): State<HttpState>,
    Query(req): Query<AggregationsRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let response = blocking(&state, move |ctx| app_api::aggregations(ctx, req)).await?;
    Ok(Json(response))
}

pub async fn costs(
    State(state): State<HttpState>,
    Query(req): Query<RangeRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let response = blocking(&state, move |ctx| app_api::costs(ctx, req)).await?;
    Ok(Json(response))
}

pub async fn export_metrics(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let req: ExportRequest = optional_json(&body)?;
    let response = blocking(&state, move |ctx| app_api::export_metrics(ctx, req)).await?;
    Ok(Json(response))
}

pub async fn list_plans(State(state): State<HttpState>) -> Result<impl IntoResponse, HttpError> {
    let response = blocking(&state, app_api::list_plans).await?;
    Ok(Json(response))
}

pub async fn get_plan(
    State(state): State<HttpState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let response = blocking(&state, move |ctx| app_api::get_plan(ctx, &name)).await?;
    Ok(Json(response))
}

pub async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    Json(app_api::health(&state.context))
}

pub async fn shutdown(
    State(state): State<HttpState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, HttpError> {
    auth::verify_bearer(&headers, uri.query(), &state.auth_token)?;
    info!(grace_ms = SHUTDOWN_GRACE.as_millis() as u64, "shutdown requested");
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        shutdown.cancel();
    });
    Ok(Json(OkResponse { ok: true }))
}

pub async fn not_found(uri: Uri) -> HttpError {
    HttpError::new(
        StatusCode::NOT_FOUND,
        format!("no route for {}", uri.path()),
        Some("not_found".to_string()),
    )
}
