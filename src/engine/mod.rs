//! Pure computation engine for salary calculations.
//!
//! Nothing here performs I/O. The orchestrator fetches data, calls these
//! functions in order and decides what to persist.

use crate::domain::{AuditedAmount, Decimal, Period, TrafficCategory, UserId};
use serde::Serialize;
use std::collections::BTreeMap;

pub mod commission;
pub mod reconciliation;
pub mod settlement;
pub mod splitter;
pub mod test_ledger;

pub use commission::{
    find_dependency_cycle, override_from_subordinates, tier_percent, SubordinateProfit,
};
pub use reconciliation::{
    combine_report_deltas, compute_deltas, profit_for_period, DeltaOutcome, PeriodProfit,
};
pub use settlement::{settle, CategoryInputs, Settlement};
pub use splitter::split_test;
pub use test_ledger::{
    ensure_split, profit_with_tests, DominantGeos, LedgerError, LedgerOutcome,
    TestBalanceChange, TestLedger,
};

/// Breakdown of one traffic category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub start_balance: Decimal,
    pub revenue: Decimal,
    pub profit: Decimal,
    pub delta: AuditedAmount,
    pub tests: AuditedAmount,
    /// Present only for leads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_lead_override: Option<AuditedAmount>,
    pub result: AuditedAmount,
}

/// Output of one salary calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub user_id: UserId,
    pub login: String,
    pub period: Period,
    pub committed: bool,
    pub total_revenue: Decimal,
    pub percent: Decimal,
    pub categories: BTreeMap<TrafficCategory, CategoryBreakdown>,
}

impl CalculationResult {
    pub fn amount(&self, category: TrafficCategory) -> Option<Decimal> {
        self.categories.get(&category).map(|c| c.result.amount)
    }
}
