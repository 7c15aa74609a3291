use crate::api::error::AppError;
use crate::services::pipeline::UploadOutcome;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

pub const UPLOAD_SUCCEEDED: &str =
    "File successfully uploaded, hash stored on blockchain, and replicated to the replica store.";

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
    pub remote_path: String,
    pub digest: String,
    pub transaction_hash: String,
    pub size: u64,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        Self {
            success: true,
            message: UPLOAD_SUCCEEDED.to_string(),
            filename: outcome.filename,
            remote_path: outcome.remote_path,
            digest: outcome.digest,
            transaction_hash: outcome.receipt.transaction_hash,
            size: outcome.size,
        }
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "Single file in the `file` field"),
    responses(
        (status = 200, description = "Stored on both targets and recorded on the ledger", body = UploadResponse),
        (status = 400, description = "No file provided"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Pipeline failed; body names the failed stage")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut staged = None;

    let result: Result<Json<UploadResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let err_msg = e.to_string();
            if err_msg.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(err_msg)
            }
        })? {
            if field.name() != Some("file") || staged.is_some() {
                continue;
            }

            let original_filename = field.file_name().unwrap_or("unnamed").to_string();
            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);

            staged = Some(state.pipeline.stage(&original_filename, reader).await?);
        }

        let staged = staged
            .take()
            .ok_or(AppError::BadRequest("No file provided".to_string()))?;

        let outcome = state.pipeline.process(staged).await?;
        Ok(Json(outcome.into()))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees the response instead of a reset
            tracing::warn!("Upload failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}
