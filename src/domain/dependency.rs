//! Team-lead percent dependencies.

use crate::domain::{Decimal, UserId};
use serde::{Deserialize, Serialize};

/// `to_user` (a lead) earns `percent` of `from_user`'s positive net profit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentDependency {
    pub from_user: UserId,
    pub to_user: UserId,
    pub percent: Decimal,
}
