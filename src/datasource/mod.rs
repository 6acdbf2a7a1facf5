//! Data source abstraction for the ad tracker: users, offers, traffic
//! sources, campaign statistics and geo attribution.

use crate::domain::{Campaign, CampaignId, Offer, OfferId, Period, TrafficSource, UserId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod binom;
pub mod mock;

pub use binom::BinomDataSource;
pub use mock::MockDataSource;

/// A user as listed by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerUser {
    pub id: UserId,
    pub login: String,
}

/// Data source trait for the tracker.
///
/// Implementations must distinguish "fetched, empty" (`Ok` with nothing in
/// it) from "could not fetch" (`Err`).
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    async fn fetch_users(&self) -> Result<Vec<TrackerUser>, DataSourceError>;

    async fn fetch_offers(&self) -> Result<Vec<Offer>, DataSourceError>;

    /// Traffic sources restricted to one of `users`.
    ///
    /// A source belongs to a user only when that user's filtered listing
    /// differs from the global one.
    async fn fetch_traffic_sources(
        &self,
        users: &[UserId],
    ) -> Result<Vec<TrafficSource>, DataSourceError>;

    /// Campaign statistics for `user` over `period`.
    ///
    /// The tracker listing carries no offers, so `offer_ids` is empty; use
    /// [`fetch_campaign_offers`](Self::fetch_campaign_offers) to fill it.
    async fn fetch_campaigns(
        &self,
        user: UserId,
        period: Period,
    ) -> Result<Vec<Campaign>, DataSourceError>;

    /// Offer ids a campaign routes traffic to.
    async fn fetch_campaign_offers(
        &self,
        campaign: CampaignId,
    ) -> Result<Vec<OfferId>, DataSourceError>;

    /// Country with the most clicks for `campaign` in `period`, `None` without clicks.
    async fn fetch_dominant_geo(
        &self,
        campaign: CampaignId,
        period: Period,
    ) -> Result<Option<String>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    /// Connection timeout, DNS failure and the like
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Invalid JSON or a response missing expected fields
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Error: {0}")]
    Other(String),
}
