use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Analysis already running for institute {0}, try again shortly")]
    Conflict(String),

    #[error("Analysis failed: {0}")]
    Processing(String),

    #[error("Analysis timed out after {0}s")]
    Timeout(u64),

    #[error("Nothing to export: {0}")]
    Export(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Export(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Processing(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServiceError::Internal(e) => {
                error!("Internal error: {e:#}");
                "Internal server error".to_string()
            }
            ServiceError::Processing(detail) => {
                error!("Analysis failed: {detail}");
                "Analysis failed".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            ServiceError::Validation("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Conflict("Default".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ServiceError::Timeout(5).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ServiceError::Export("none".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    async fn error_body(error: ServiceError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_detail_is_not_exposed() {
        let (status, body) =
            error_body(ServiceError::Internal(anyhow::anyhow!("password=hunter2 at db"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn synthesis_detail_is_not_exposed() {
        let (status, body) = error_body(ServiceError::Processing(
            "problem statement: upstream key sk-123 rejected at 10.0.0.5".into(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Analysis failed" }));
    }
}
