//! Persisted period reports.

use crate::domain::{CampaignId, Decimal, Period, ReportId, TrafficCategory, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Figures a report recorded for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCategory {
    pub revenue: Decimal,
    pub profit: Decimal,
    pub percent: Decimal,
    pub amount: Decimal,
}

/// Campaign profit as it was visible when a report was generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub campaign_id: CampaignId,
    pub category: TrafficCategory,
    pub profit: Decimal,
}

/// A persisted salary report, the reference point for later deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub user_id: UserId,
    pub period: Period,
    pub categories: BTreeMap<TrafficCategory, ReportCategory>,
    pub campaigns: Vec<CampaignSnapshot>,
}
