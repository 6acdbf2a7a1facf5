//! Tracker-sourced records: campaigns, offers and traffic sources.

use crate::domain::{CampaignId, Decimal, OfferId, TrafficCategory, TrafficSourceId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A campaign with its statistics for some window, and the offers it routes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    /// `None` when the tracker reports a group outside the known categories.
    pub category: Option<TrafficCategory>,
    pub traffic_source_id: TrafficSourceId,
    pub user_id: UserId,
    pub revenue: Decimal,
    pub cost: Decimal,
    pub profit: Decimal,
    pub offer_ids: BTreeSet<OfferId>,
}

impl Campaign {
    /// True when the campaign belongs to one of `categories`.
    pub fn in_categories(&self, categories: &BTreeSet<TrafficCategory>) -> bool {
        self.category
            .map(|c| categories.contains(&c))
            .unwrap_or(false)
    }
}

/// Offer catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub geo: String,
    pub name: String,
    pub group: String,
    pub network: String,
}

/// Traffic source restricted to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSource {
    pub id: TrafficSourceId,
    pub name: String,
    pub owner_user_id: Option<UserId>,
    pub campaigns_count: i64,
    pub has_tokens: bool,
}
