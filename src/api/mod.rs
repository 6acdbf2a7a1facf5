pub mod health;
pub mod locks;
pub mod salary;
pub mod sync;
pub mod test_budgets;

use crate::db::Repository;
use crate::orchestration::{SalaryOrchestrator, Synchronizer};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use locks::UserLocks;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub orchestrator: Arc<SalaryOrchestrator>,
    pub synchronizer: Arc<Synchronizer>,
    pub locks: UserLocks,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        orchestrator: Arc<SalaryOrchestrator>,
        synchronizer: Arc<Synchronizer>,
    ) -> Self {
        Self {
            repo,
            orchestrator,
            synchronizer,
            locks: UserLocks::new(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/salary", post(salary::calculate_salary))
        .route("/v1/sync", post(sync::sync_catalogue))
        .route("/v1/tests", post(test_budgets::create_test))
        .route("/v1/tests/:id/split", post(test_budgets::split_test))
        .route(
            "/v1/users/:id/tests/archive",
            post(test_budgets::archive_expired_tests),
        )
        .layer(cors)
        .with_state(state)
}
