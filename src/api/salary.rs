use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::collections::BTreeSet;

use super::AppState;
use crate::domain::{parse_date, TrafficCategory, UserId};
use crate::engine::CalculationResult;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryBody {
    pub user_id: i64,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub commit: bool,
    /// Empty means every category.
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Sync the catalogue, then count one user's salary under that user's lock.
pub async fn calculate_salary(
    State(state): State<AppState>,
    Json(body): Json<SalaryBody>,
) -> Result<Json<CalculationResult>, AppError> {
    let user = UserId::new(body.user_id);
    let start = parse_day(&body.start_date, "startDate")?;
    let end = parse_day(&body.end_date, "endDate")?;
    let categories = parse_categories(&body.categories)?;

    let _guard = state.locks.acquire(user).await;

    state.synchronizer.sync_all().await?;
    let result = state
        .orchestrator
        .calculate_user_salary(user, start, end, body.commit, &categories)
        .await?;

    Ok(Json(result))
}

fn parse_day(raw: &str, field: &str) -> Result<chrono::NaiveDate, AppError> {
    parse_date(raw).map_err(|_| AppError::BadRequest(format!("Invalid {}: {:?}", field, raw)))
}

fn parse_categories(raw: &[String]) -> Result<BTreeSet<TrafficCategory>, AppError> {
    if raw.is_empty() {
        return Ok(TrafficCategory::ALL.into_iter().collect());
    }
    raw.iter()
        .map(|c| {
            TrafficCategory::parse(c)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown traffic category {:?}", c)))
        })
        .collect()
}
