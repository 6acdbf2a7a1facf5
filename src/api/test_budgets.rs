use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::AppState;
use crate::domain::{
    parse_date, Decimal, OfferId, TestDraft, TestId, TrafficCategory, TrafficSourceId, UserId,
    DEFAULT_LIFETIME_DAYS,
};
use crate::engine;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestBody {
    pub user_id: i64,
    pub category: String,
    pub budget: Decimal,
    /// Defaults to the full budget.
    pub balance: Option<Decimal>,
    pub offer_ids: BTreeSet<i64>,
    pub traffic_source_ids: BTreeSet<i64>,
    #[serde(default)]
    pub geos: BTreeSet<String>,
    #[serde(default)]
    pub one_budget_for_all_offers: bool,
    #[serde(default)]
    pub one_budget_for_all_traffic_sources: bool,
    #[serde(default)]
    pub one_budget_for_all_geo: bool,
    pub adding_date: Option<String>,
    pub lifetime_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub today: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestIdsResponse {
    pub test_ids: Vec<TestId>,
}

pub async fn create_test(
    State(state): State<AppState>,
    Json(body): Json<CreateTestBody>,
) -> Result<(StatusCode, Json<TestIdsResponse>), AppError> {
    let category = TrafficCategory::parse(&body.category).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown traffic category {:?}", body.category))
    })?;
    let adding_date = match body.adding_date.as_deref() {
        Some(raw) => parse_day(raw)?,
        None => Utc::now().date_naive(),
    };

    let draft = TestDraft {
        user_id: UserId::new(body.user_id),
        category,
        budget: body.budget,
        balance: body.balance.unwrap_or(body.budget),
        offer_ids: body.offer_ids.into_iter().map(OfferId::new).collect(),
        traffic_source_ids: body
            .traffic_source_ids
            .into_iter()
            .map(TrafficSourceId::new)
            .collect(),
        geos: body.geos,
        one_budget_for_all_offers: body.one_budget_for_all_offers,
        one_budget_for_all_traffic_sources: body.one_budget_for_all_traffic_sources,
        one_budget_for_all_geo: body.one_budget_for_all_geo,
        adding_date,
        lifetime_days: body.lifetime_days.unwrap_or(DEFAULT_LIFETIME_DAYS),
        archived: false,
    };

    let id = state.repo.create_test(&draft).await?;
    Ok((StatusCode::CREATED, Json(TestIdsResponse { test_ids: vec![id] })))
}

/// Replace a test holding several values on one budget by one test per value.
pub async fn split_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TestIdsResponse>, AppError> {
    let id = TestId::new(id);
    let test = state
        .repo
        .get_test(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test {} not found", id)))?;

    if test.draft.split_violation().is_none() {
        return Ok(Json(TestIdsResponse { test_ids: vec![id] }));
    }

    let parts = engine::split_test(&test.draft);
    let test_ids = state.repo.replace_test(id, &parts).await?;
    tracing::info!(test = %id, parts = test_ids.len(), "Split test");

    Ok(Json(TestIdsResponse { test_ids }))
}

pub async fn archive_expired_tests(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<ArchiveQuery>,
) -> Result<Json<TestIdsResponse>, AppError> {
    let today: NaiveDate = match params.today.as_deref() {
        Some(raw) => parse_day(raw)?,
        None => Utc::now().date_naive(),
    };

    let test_ids = state
        .repo
        .archive_expired(UserId::new(user_id), today)
        .await?;
    Ok(Json(TestIdsResponse { test_ids }))
}

fn parse_day(raw: &str) -> Result<NaiveDate, AppError> {
    parse_date(raw).map_err(|_| AppError::BadRequest(format!("Invalid date: {:?}", raw)))
}
