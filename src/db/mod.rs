//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and schema setup
//! - SQLite pragma configuration
//! - Repository layer for the ledger tables

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{CommitPlan, NewReport, Repository, TestAdminError};
