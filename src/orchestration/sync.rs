use crate::datasource::{DataSource, DataSourceError};
use crate::db::Repository;
use crate::domain::User;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Mirrors the tracker's users, offers and traffic sources into the database.
///
/// Only records not yet known locally are inserted; local salary settings
/// and balances are never overwritten.
#[derive(Clone)]
pub struct Synchronizer {
    datasource: Arc<dyn DataSource>,
    repo: Arc<Repository>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub users: usize,
    pub offers: usize,
    pub traffic_sources: usize,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl Synchronizer {
    pub fn new(datasource: Arc<dyn DataSource>, repo: Arc<Repository>) -> Self {
        Self { datasource, repo }
    }

    pub async fn sync_users(&self) -> Result<usize, SyncError> {
        let users: Vec<User> = self
            .datasource
            .fetch_users()
            .await?
            .into_iter()
            .map(|u| User::new(u.id, u.login))
            .collect();
        let inserted = self.repo.insert_new_users(&users).await?;
        info!("Users synced: {} fetched, {} new", users.len(), inserted);
        Ok(inserted)
    }

    /// Also the forced re-sync used when a campaign references an unknown offer.
    pub async fn sync_offers(&self) -> Result<usize, SyncError> {
        let offers = self.datasource.fetch_offers().await?;
        let inserted = self.repo.insert_new_offers(&offers).await?;
        info!("Offers synced: {} fetched, {} new", offers.len(), inserted);
        Ok(inserted)
    }

    /// Requires users to be synced first; sources are looked up per known user.
    pub async fn sync_traffic_sources(&self) -> Result<usize, SyncError> {
        let users = self.repo.list_user_ids().await?;
        let sources = self.datasource.fetch_traffic_sources(&users).await?;
        let inserted = self.repo.insert_new_traffic_sources(&sources).await?;
        info!(
            "Traffic sources synced: {} fetched, {} new",
            sources.len(),
            inserted
        );
        Ok(inserted)
    }

    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        Ok(SyncReport {
            users: self.sync_users().await?,
            offers: self.sync_offers().await?,
            traffic_sources: self.sync_traffic_sources().await?,
        })
    }
}
