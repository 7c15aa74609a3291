use crate::AppState;
use crate::services::ledger::LedgerContext;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub ledger: LedgerContext,
    pub primary: String,
    pub replica: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service status and the ledger binding established at startup", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        ledger: state.pipeline.ledger().context().clone(),
        primary: state.pipeline.primary().target().endpoint(),
        replica: state.pipeline.replica().target().endpoint(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
