//! Promotional test budgets.
//!
//! A test shields an employee from salary deduction for losses made on a
//! defined slice of offers, traffic sources and (optionally) geo, up to its
//! budget. Its balance is consumed by losing campaigns and the test retires
//! once the balance is gone or its lifetime has elapsed.

use crate::domain::{Decimal, OfferId, TestId, TrafficCategory, TrafficSourceId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Default lifetime of a test in days.
pub const DEFAULT_LIFETIME_DAYS: u32 = 60;

/// Dimension along which a test can hold more than one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDimension {
    Offers,
    TrafficSources,
    Geo,
}

impl fmt::Display for SplitDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitDimension::Offers => write!(f, "offers"),
            SplitDimension::TrafficSources => write!(f, "traffic sources"),
            SplitDimension::Geo => write!(f, "geo"),
        }
    }
}

/// Test contents without an identity; used for creation and splitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDraft {
    pub user_id: UserId,
    pub category: TrafficCategory,
    pub budget: Decimal,
    pub balance: Decimal,
    pub offer_ids: BTreeSet<OfferId>,
    pub traffic_source_ids: BTreeSet<TrafficSourceId>,
    #[serde(default)]
    pub geos: BTreeSet<String>,
    #[serde(default)]
    pub one_budget_for_all_offers: bool,
    #[serde(default)]
    pub one_budget_for_all_traffic_sources: bool,
    #[serde(default)]
    pub one_budget_for_all_geo: bool,
    pub adding_date: NaiveDate,
    pub lifetime_days: u32,
    #[serde(default)]
    pub archived: bool,
}

/// A persisted test budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestBudget {
    pub id: TestId,
    #[serde(flatten)]
    pub draft: TestDraft,
}

/// Data-entry rule violations for tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Test budget must be positive.")]
    BudgetNotPositive,
    #[error("Test balance must be positive.")]
    BalanceNotPositive,
    #[error("Test balance can't be greater than test budget.")]
    BalanceExceedsBudget,
    #[error("Traffic source [{0}] pinned to another user.")]
    TrafficSourceOfAnotherUser(TrafficSourceId),
    #[error("This test already exists.")]
    Duplicate,
}

impl TestDraft {
    /// Budget and balance rules enforced when a test is entered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.budget.is_positive() {
            return Err(ValidationError::BudgetNotPositive);
        }
        if !self.balance.is_positive() {
            return Err(ValidationError::BalanceNotPositive);
        }
        if self.balance > self.budget {
            return Err(ValidationError::BalanceExceedsBudget);
        }
        Ok(())
    }

    /// First dimension (offers, then traffic sources, then geo) holding more
    /// than one value without the matching "one budget for all" flag.
    pub fn split_violation(&self) -> Option<SplitDimension> {
        if self.offer_ids.len() > 1 && !self.one_budget_for_all_offers {
            Some(SplitDimension::Offers)
        } else if self.traffic_source_ids.len() > 1 && !self.one_budget_for_all_traffic_sources {
            Some(SplitDimension::TrafficSources)
        } else if self.geos.len() > 1 && !self.one_budget_for_all_geo {
            Some(SplitDimension::Geo)
        } else {
            None
        }
    }

    /// Whether `lifetime_days` have passed since the test was added.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        (today - self.adding_date).num_days() >= i64::from(self.lifetime_days)
    }

    /// Same slice of offers, traffic sources and geo for the same user and category.
    pub fn same_slice(&self, other: &TestDraft) -> bool {
        self.user_id == other.user_id
            && self.category == other.category
            && self.offer_ids == other.offer_ids
            && self.traffic_source_ids == other.traffic_source_ids
            && self.geos == other.geos
    }
}

impl TestBudget {
    pub fn new(id: TestId, draft: TestDraft) -> Self {
        Self { id, draft }
    }
}
