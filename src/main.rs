use payledger::orchestration::{SalaryOrchestrator, Synchronizer};
use payledger::{
    api, config::Config, db::init_db, BinomDataSource, DataSource, InMemoryMemo, Repository,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let datasource: Arc<dyn DataSource> = Arc::new(BinomDataSource::new(
        config.tracker_api_url.clone(),
        config.tracker_api_key.clone(),
        config.tracker_timezone.clone(),
    ));
    let synchronizer = Arc::new(Synchronizer::new(datasource.clone(), repo.clone()));
    let orchestrator = Arc::new(SalaryOrchestrator::new(
        datasource,
        repo.clone(),
        Arc::new(InMemoryMemo::new()),
        config.clone(),
    ));

    let app = api::create_router(api::AppState::new(repo, orchestrator, synchronizer));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        delta_mode = ?config.delta_mode,
        "Server listening on {}",
        addr
    );

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
