use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppError;
use crate::orchestration::SyncReport;

pub async fn sync_catalogue(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    Ok(Json(state.synchronizer.sync_all().await?))
}
