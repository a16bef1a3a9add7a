use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::ServiceError;
use crate::ingest;
use crate::institute::Registry;
use crate::models::{ClusterSet, ExportFormat, NewFeedback, NewInstitute, DEFAULT_INSTITUTE};
use crate::state::AppState;

type AppResult = Result<Response, ServiceError>;

/// Malformed or missing JSON bodies become a 400 with the usual error shape.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ServiceError::Validation(format!("Malformed payload: {}", rejection.body_text()))
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct InstituteQuery {
    pub institute_id: Option<String>,
}

impl InstituteQuery {
    fn institute(&self) -> String {
        resolve_institute(self.institute_id.as_deref())
    }
}

fn resolve_institute(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_INSTITUTE)
        .to_string()
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewFeedback>, JsonRejection>,
) -> AppResult {
    let payload = json_body(body)?;
    let id = ingest::submit(state.store.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "id": id })),
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub institute_id: Option<String>,
}

pub async fn process_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> AppResult {
    let payload = json_body(body)?;
    let institute_id = resolve_institute(payload.institute_id.as_deref());
    let set = state.engine.process(&institute_id).await?;
    Ok(Json(json!({
        "status": "success",
        "institute_id": set.institute_id,
        "computed_at": set.computed_at,
        "clusters": set.clusters,
    }))
    .into_response())
}

pub async fn results_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstituteQuery>,
) -> AppResult {
    let set = state.reporter.results(&query.institute()).await?;
    Ok(Json(set).into_response())
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstituteQuery>,
) -> AppResult {
    let stats = state.reporter.stats(&query.institute()).await?;
    Ok(Json(stats).into_response())
}

pub async fn alerts_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstituteQuery>,
) -> AppResult {
    let alerts = state.reporter.critical_alerts(&query.institute()).await?;
    Ok(Json(json!({ "alerts": alerts })).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub results: Option<ClusterSet>,
    #[serde(default)]
    pub institute_id: Option<String>,
}

pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
    body: Result<Json<ExportRequest>, JsonRejection>,
) -> AppResult {
    let payload = json_body(body)?;
    let format: ExportFormat = format.parse().map_err(ServiceError::Validation)?;
    let institute_id = resolve_institute(
        payload
            .institute_id
            .as_deref()
            .or(payload.results.as_ref().map(|set| set.institute_id.as_str())),
    );

    let url = state
        .reporter
        .export(&institute_id, format, payload.results)
        .await?;
    Ok(Json(json!({ "url": url })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub id: String,
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> AppResult {
    let payload = json_body(body)?;
    match Registry::new(state.store.as_ref()).verify(&payload.id).await {
        Ok(institute) => Ok(Json(json!({ "valid": true, "name": institute.name })).into_response()),
        Err(ServiceError::NotFound(message)) => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "valid": false, "name": null, "error": message })),
        )
            .into_response()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub admin_id: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult {
    let payload = json_body(body)?;
    let institute = Registry::new(state.store.as_ref())
        .authenticate(&payload.id, &payload.admin_id, &payload.password)
        .await?;
    Ok(Json(json!({ "valid": true, "name": institute.name, "id": institute.id })).into_response())
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewInstitute>, JsonRejection>,
) -> AppResult {
    let payload = json_body(body)?;
    let id = Registry::new(state.store.as_ref()).register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "id": id })),
    )
        .into_response())
}
