use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use payledger::api::{self, AppState};
use payledger::config::{Config, DeltaMode, ExhaustedTestPolicy};
use payledger::datasource::MockDataSource;
use payledger::db::init_db;
use payledger::domain::{
    Campaign, CampaignId, Decimal, Offer, OfferId, Period, TestDraft, TestId, TrafficCategory,
    TrafficSourceId, User, UserId,
};
use payledger::orchestration::{SalaryOrchestrator, Synchronizer};
use payledger::{InMemoryMemo, Repository};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn tracker() -> MockDataSource {
    MockDataSource::new()
        .with_user(UserId::new(1), "alice")
        .with_offer(Offer {
            id: OfferId::new(10),
            geo: "Brazil".to_string(),
            name: "offer".to_string(),
            group: "g".to_string(),
            network: "n".to_string(),
        })
        .with_campaigns(
            UserId::new(1),
            Period::new(day(6, 1), day(6, 15)),
            vec![Campaign {
                id: CampaignId::new(7),
                name: "camp-7".to_string(),
                category: Some(TrafficCategory::Admin),
                traffic_source_id: TrafficSourceId::new(5),
                user_id: UserId::new(1),
                revenue: d("6000"),
                cost: d("5950"),
                profit: d("50"),
                offer_ids: [OfferId::new(10)].into_iter().collect(),
            }],
        )
}

async fn setup_test_app() -> (axum::Router, Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let mut alice = User::new(UserId::new(1), "alice".to_string());
    alice.salary_group = 1;
    alice.balances.insert(TrafficCategory::Admin, d("-20"));
    repo.save_user(&alice).await.unwrap();

    let config = Config {
        port: 0,
        database_path: db_path,
        tracker_api_url: "http://example.invalid".to_string(),
        tracker_api_key: "key".to_string(),
        tracker_timezone: "+3:00".to_string(),
        delta_mode: DeltaMode::History,
        delta_lookback_days: 14,
        exhausted_test_policy: ExhaustedTestPolicy::Archive,
    };

    let datasource = Arc::new(tracker());
    let synchronizer = Arc::new(Synchronizer::new(datasource.clone(), repo.clone()));
    let orchestrator = Arc::new(SalaryOrchestrator::new(
        datasource,
        repo.clone(),
        Arc::new(InMemoryMemo::new()),
        config,
    ));
    let state = AppState::new(repo.clone(), orchestrator, synchronizer);

    (api::create_router(state), repo, temp_dir)
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn multi_offer_test() -> TestDraft {
    TestDraft {
        user_id: UserId::new(1),
        category: TrafficCategory::Admin,
        budget: d("100"),
        balance: d("80"),
        offer_ids: [OfferId::new(10), OfferId::new(11)].into_iter().collect(),
        traffic_source_ids: [TrafficSourceId::new(5)].into_iter().collect(),
        geos: BTreeSet::new(),
        one_budget_for_all_offers: false,
        one_budget_for_all_traffic_sources: false,
        one_budget_for_all_geo: false,
        adding_date: day(6, 1),
        lifetime_days: 60,
        archived: false,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, body) = send(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, body) = send(app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_salary_endpoint_commits() {
    let (app, repo, _temp) = setup_test_app().await;

    let (status, body) = send(
        app,
        "POST",
        "/v1/salary",
        Some(json!({
            "userId": 1,
            "startDate": "2024-06-01",
            "endDate": "2024-06-15",
            "commit": true,
            "categories": ["ADMIN"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["login"], "alice");
    assert_eq!(body["committed"], true);
    let admin = &body["categories"]["ADMIN"];
    assert_eq!(admin["result"]["amount"], 16.5);
    assert_eq!(
        admin["result"]["calculation"],
        "(-20.0 + 50.0 + 0.0 + 0.0) * 0.55 = 16.5"
    );
    assert!(admin.get("teamLeadOverride").is_none());

    let user = repo.get_user(UserId::new(1)).await.unwrap().unwrap();
    assert_eq!(user.balance(TrafficCategory::Admin), Decimal::zero());
    assert_eq!(repo.reports_for(UserId::new(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_salary_endpoint_rejects_unknown_category() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, body) = send(
        app,
        "POST",
        "/v1/salary",
        Some(json!({
            "userId": 1,
            "startDate": "2024-06-01",
            "endDate": "2024-06-15",
            "categories": ["RADIO"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("RADIO"));
}

#[tokio::test]
async fn test_salary_endpoint_unknown_user() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, _body) = send(
        app,
        "POST",
        "/v1/salary",
        Some(json!({
            "userId": 99,
            "startDate": "2024-06-01",
            "endDate": "2024-06-15"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_salary_endpoint_unsplit_test_conflict() {
    let (app, repo, _temp) = setup_test_app().await;
    let test_id = repo.create_test(&multi_offer_test()).await.unwrap();

    let (status, body) = send(
        app,
        "POST",
        "/v1/salary",
        Some(json!({
            "userId": 1,
            "startDate": "2024-06-01",
            "endDate": "2024-06-15",
            "commit": true,
            "categories": ["ADMIN"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains(&format!("Test with id {}", test_id)));
}

#[tokio::test]
async fn test_sync_endpoint_counts_new_records() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, body) = send(app, "POST", "/v1/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    // alice was already stored locally
    assert_eq!(body["users"], 0);
    assert_eq!(body["offers"], 1);
}

#[tokio::test]
async fn test_split_endpoint_replaces_test() {
    let (app, repo, _temp) = setup_test_app().await;
    let test_id = repo.create_test(&multi_offer_test()).await.unwrap();

    let (status, body) = send(
        app,
        "POST",
        &format!("/v1/tests/{}/split", test_id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["testIds"].as_array().unwrap().len(), 2);
    assert!(repo.get_test(test_id).await.unwrap().is_none());

    let tests = repo.active_tests(UserId::new(1)).await.unwrap();
    assert_eq!(tests.len(), 2);
    assert!(tests.iter().all(|t| t.draft.offer_ids.len() == 1));
    assert!(tests.iter().all(|t| t.draft.balance == d("80")));
}

#[tokio::test]
async fn test_split_endpoint_unknown_test() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, _body) = send(app, "POST", "/v1/tests/404/split", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_test_endpoint_validates() {
    let (app, _repo, _temp) = setup_test_app().await;

    let (status, body) = send(
        app,
        "POST",
        "/v1/tests",
        Some(json!({
            "userId": 1,
            "category": "ADMIN",
            "budget": 100,
            "balance": 150,
            "offerIds": [10],
            "trafficSourceIds": [5]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Test balance can't be greater than test budget."
    );
}

#[tokio::test]
async fn test_create_test_endpoint_stores_test() {
    let (app, repo, _temp) = setup_test_app().await;

    let (status, body) = send(
        app,
        "POST",
        "/v1/tests",
        Some(json!({
            "userId": 1,
            "category": "ADMIN",
            "budget": 100,
            "offerIds": [10],
            "trafficSourceIds": [5],
            "addingDate": "2024-06-01"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let id = TestId::new(body["testIds"][0].as_i64().unwrap());
    let test = repo.get_test(id).await.unwrap().unwrap();
    assert_eq!(test.draft.balance, d("100"));
    assert_eq!(test.draft.lifetime_days, 60);
}

#[tokio::test]
async fn test_archive_endpoint_uses_given_day() {
    let (app, repo, _temp) = setup_test_app().await;
    let mut draft = multi_offer_test();
    draft.offer_ids = [OfferId::new(10)].into_iter().collect();
    draft.lifetime_days = 10;
    let test_id = repo.create_test(&draft).await.unwrap();

    let (status, body) = send(
        app,
        "POST",
        "/v1/users/1/tests/archive?today=2024-06-11",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["testIds"], json!([test_id.as_i64()]));
    assert!(repo.active_tests(UserId::new(1)).await.unwrap().is_empty());
}
