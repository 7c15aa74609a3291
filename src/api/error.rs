use crate::services::pipeline::{PipelineError, PipelineStage, StageFailure};
use crate::services::staging::StagingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Message returned for any failure inside the upload pipeline.
pub const UPLOAD_FAILED: &str = "Error uploading file.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Upload(#[from] PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, stage) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg, None),
            AppError::Upload(e) => {
                let status = match &e.source {
                    StageFailure::Staging(StagingError::TooLarge { .. }) => {
                        StatusCode::PAYLOAD_TOO_LARGE
                    }
                    StageFailure::Staging(StagingError::InvalidFilename(_)) => {
                        StatusCode::BAD_REQUEST
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, UPLOAD_FAILED.to_string(), Some(e.stage))
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "stage": stage.map(|s: PipelineStage| s.as_str()),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ledger::LedgerError;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_pipeline_failure_is_generic_with_stage() {
        let err = AppError::from(PipelineError {
            stage: PipelineStage::LedgerRecord,
            completed: vec![PipelineStage::Staging, PipelineStage::PrimaryTransfer],
            source: StageFailure::Ledger(LedgerError::Transaction("nonce too low".to_string())),
        });

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], UPLOAD_FAILED);
        assert_eq!(json["stage"], "ledger_record");
        assert!(!String::from_utf8_lossy(&body).contains("nonce"));
    }

    #[tokio::test]
    async fn test_too_large_maps_to_413() {
        let err = AppError::from(PipelineError {
            stage: PipelineStage::Staging,
            completed: vec![],
            source: StageFailure::Staging(StagingError::TooLarge { limit: 1 }),
        });
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
