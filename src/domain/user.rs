//! Employees mirrored from the tracker and their carry-forward balances.

use crate::domain::{Decimal, TrafficCategory, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Salary group value marking a user that takes no part in calculations.
pub const INACTIVE_SALARY_GROUP: i32 = -1;

/// An employee as known to the tracker, plus local salary settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub is_lead: bool,
    /// Commission tier; [`INACTIVE_SALARY_GROUP`] when inactive.
    pub salary_group: i32,
    /// Running balance per category. Absent categories are zero.
    #[serde(default)]
    pub balances: BTreeMap<TrafficCategory, Decimal>,
}

impl User {
    /// A freshly synced user: not a lead, inactive, zero balances.
    pub fn new(id: UserId, login: String) -> Self {
        Self {
            id,
            login,
            is_lead: false,
            salary_group: INACTIVE_SALARY_GROUP,
            balances: BTreeMap::new(),
        }
    }

    pub fn balance(&self, category: TrafficCategory) -> Decimal {
        self.balances
            .get(&category)
            .copied()
            .unwrap_or_default()
            .round_money()
    }

    pub fn is_active(&self) -> bool {
        self.salary_group > 0
    }
}

/// Stored balance after a period closes.
///
/// Only a negative remainder carries forward; a non-negative amount was paid
/// out as salary and resets the balance to zero.
pub fn apply_period_result(amount: Decimal) -> Decimal {
    if amount.is_negative() {
        amount.round_money()
    } else {
        Decimal::zero()
    }
}
