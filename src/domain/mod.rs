//! Domain types for the salary ledger.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Identifiers, traffic categories and reporting periods
//! - Users, campaigns, offers, traffic sources, tests, dependencies and reports
//! - Audit trails pairing each total with its contributing terms

pub mod audit;
pub mod campaign;
pub mod decimal;
pub mod dependency;
pub mod primitives;
pub mod report;
pub mod test_budget;
pub mod user;

pub use audit::{AuditTerm, AuditTrail, AuditedAmount};
pub use campaign::{Campaign, Offer, TrafficSource};
pub use decimal::{Decimal, MONEY_SCALE};
pub use dependency::PercentDependency;
pub use primitives::{
    parse_date, CampaignId, OfferId, Period, ReportId, TestId, TrafficCategory, TrafficSourceId,
    UserId,
};
pub use report::{CampaignSnapshot, Report, ReportCategory};
pub use test_budget::{
    SplitDimension, TestBudget, TestDraft, ValidationError, DEFAULT_LIFETIME_DAYS,
};
pub use user::{apply_period_result, User, INACTIVE_SALARY_GROUP};
