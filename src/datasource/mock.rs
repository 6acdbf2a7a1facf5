//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError, TrackerUser};
use crate::domain::{Campaign, CampaignId, Offer, OfferId, Period, TrafficSource, UserId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock tracker that returns predefined data.
///
/// Campaigns are stored per user and period. Their offer ids are served by
/// `fetch_campaign_offers`, as the real tracker does.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    users: Vec<TrackerUser>,
    offers: Vec<Offer>,
    traffic_sources: Vec<TrafficSource>,
    campaigns: HashMap<(UserId, Period), Vec<Campaign>>,
    campaign_offers: HashMap<CampaignId, Vec<OfferId>>,
    geos: HashMap<CampaignId, Option<String>>,
    failure: Option<DataSourceError>,
    geo_calls: Arc<AtomicUsize>,
    offer_calls: Arc<AtomicUsize>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: UserId, login: &str) -> Self {
        self.users.push(TrackerUser {
            id,
            login: login.to_string(),
        });
        self
    }

    pub fn with_offer(mut self, offer: Offer) -> Self {
        self.offers.push(offer);
        self
    }

    pub fn with_traffic_source(mut self, source: TrafficSource) -> Self {
        self.traffic_sources.push(source);
        self
    }

    /// Campaigns the tracker reports for `user` over exactly `period`.
    pub fn with_campaigns(mut self, user: UserId, period: Period, campaigns: Vec<Campaign>) -> Self {
        for campaign in &campaigns {
            self.campaign_offers
                .insert(campaign.id, campaign.offer_ids.iter().copied().collect());
        }
        self.campaigns
            .entry((user, period))
            .or_default()
            .extend(campaigns);
        self
    }

    /// Dominant geo for a campaign; `None` means no clicks.
    pub fn with_geo(mut self, campaign: CampaignId, geo: Option<&str>) -> Self {
        self.geos.insert(campaign, geo.map(str::to_string));
        self
    }

    /// Make every call fail with `error`.
    pub fn with_failure(mut self, error: DataSourceError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn geo_calls(&self) -> usize {
        self.geo_calls.load(Ordering::SeqCst)
    }

    pub fn offer_calls(&self) -> usize {
        self.offer_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), DataSourceError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_users(&self) -> Result<Vec<TrackerUser>, DataSourceError> {
        self.check()?;
        Ok(self.users.clone())
    }

    async fn fetch_offers(&self) -> Result<Vec<Offer>, DataSourceError> {
        self.check()?;
        Ok(self.offers.clone())
    }

    async fn fetch_traffic_sources(
        &self,
        users: &[UserId],
    ) -> Result<Vec<TrafficSource>, DataSourceError> {
        self.check()?;
        Ok(self
            .traffic_sources
            .iter()
            .filter(|ts| ts.owner_user_id.map(|u| users.contains(&u)).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn fetch_campaigns(
        &self,
        user: UserId,
        period: Period,
    ) -> Result<Vec<Campaign>, DataSourceError> {
        self.check()?;
        Ok(self
            .campaigns
            .get(&(user, period))
            .map(|list| {
                list.iter()
                    .map(|c| Campaign {
                        offer_ids: BTreeSet::new(),
                        ..c.clone()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_campaign_offers(
        &self,
        campaign: CampaignId,
    ) -> Result<Vec<OfferId>, DataSourceError> {
        self.check()?;
        self.offer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .campaign_offers
            .get(&campaign)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_dominant_geo(
        &self,
        campaign: CampaignId,
        _period: Period,
    ) -> Result<Option<String>, DataSourceError> {
        self.check()?;
        self.geo_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.geos.get(&campaign).cloned().flatten())
    }
}
