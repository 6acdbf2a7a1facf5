//! Profit-for-period totals and delta detection against earlier snapshots.

use crate::domain::{AuditTrail, Campaign, CampaignId, Decimal, Period, TrafficCategory};
use std::collections::{BTreeMap, BTreeSet};

/// Revenue and profit per category for one window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeriodProfit {
    pub revenue: BTreeMap<TrafficCategory, Decimal>,
    pub profit: BTreeMap<TrafficCategory, Decimal>,
}

impl PeriodProfit {
    pub fn revenue_of(&self, category: TrafficCategory) -> Decimal {
        self.revenue.get(&category).copied().unwrap_or_default()
    }

    pub fn profit_of(&self, category: TrafficCategory) -> Decimal {
        self.profit.get(&category).copied().unwrap_or_default()
    }

    /// Revenue summed over the active categories; drives the commission tier.
    pub fn total_revenue(&self) -> Decimal {
        self.revenue.values().copied().sum::<Decimal>().round_money()
    }
}

/// Sum revenue and profit of the campaigns in `categories`.
///
/// Every active category is present in the output, zero when nothing matched.
pub fn profit_for_period(
    campaigns: &[Campaign],
    categories: &BTreeSet<TrafficCategory>,
) -> PeriodProfit {
    let mut revenue: BTreeMap<TrafficCategory, Decimal> =
        categories.iter().map(|c| (*c, Decimal::zero())).collect();
    let mut profit = revenue.clone();

    for campaign in campaigns {
        let Some(category) = campaign.category.filter(|c| categories.contains(c)) else {
            continue;
        };
        if let Some(r) = revenue.get_mut(&category) {
            *r += campaign.revenue;
        }
        if let Some(p) = profit.get_mut(&category) {
            *p += campaign.profit;
        }
    }

    for value in revenue.values_mut().chain(profit.values_mut()) {
        *value = value.round_money();
    }

    PeriodProfit { revenue, profit }
}

/// Result of comparing fresh campaign figures with a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaOutcome {
    pub by_category: BTreeMap<TrafficCategory, AuditTrail>,
    /// Campaigns whose profit rose, with the fresh profit to write back.
    pub raised: Vec<(CampaignId, Decimal)>,
}

impl DeltaOutcome {
    pub fn total(&self, category: TrafficCategory) -> Decimal {
        self.by_category
            .get(&category)
            .map(AuditTrail::total)
            .unwrap_or_default()
    }
}

/// Profit that appeared on already-reported campaigns after the report closed.
///
/// Only increases count. Campaigns missing from `stored` are new and
/// contribute nothing; decreases are ignored.
pub fn compute_deltas(
    current: &[Campaign],
    stored: &BTreeMap<CampaignId, Decimal>,
    categories: &BTreeSet<TrafficCategory>,
) -> DeltaOutcome {
    let mut outcome = DeltaOutcome {
        by_category: categories.iter().map(|c| (*c, AuditTrail::new())).collect(),
        raised: Vec::new(),
    };

    for campaign in current {
        let Some(category) = campaign.category.filter(|c| categories.contains(c)) else {
            continue;
        };
        let Some(stored_profit) = stored.get(&campaign.id) else {
            continue;
        };
        if campaign.profit > *stored_profit {
            let diff = campaign.profit - *stored_profit;
            if let Some(trail) = outcome.by_category.get_mut(&category) {
                trail.push(diff, campaign.id.to_string());
            }
            outcome.raised.push((campaign.id, campaign.profit));
        }
    }

    outcome
}

/// Fold per-report deltas into one trail per category, one term per report period.
pub fn combine_report_deltas(
    per_report: &[(Period, DeltaOutcome)],
    categories: &BTreeSet<TrafficCategory>,
) -> BTreeMap<TrafficCategory, AuditTrail> {
    let mut combined: BTreeMap<TrafficCategory, AuditTrail> =
        categories.iter().map(|c| (*c, AuditTrail::new())).collect();

    for (period, outcome) in per_report {
        for (category, trail) in combined.iter_mut() {
            let total = outcome.total(*category);
            if total.is_positive() {
                trail.push(total, period.to_string());
            }
        }
    }

    combined
}
