pub mod api;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use cache::{InMemoryMemo, MemoStore};
pub use config::Config;
pub use datasource::{BinomDataSource, DataSource, DataSourceError, MockDataSource};
pub use db::{init_db, Repository};
pub use domain::{Decimal, Period, TrafficCategory, UserId};
pub use engine::CalculationResult;
pub use error::AppError;
pub use orchestration::{SalaryError, SalaryOrchestrator, Synchronizer};
