//! Repository layer for database operations.
//!
//! Methods are organized across submodules by entity:
//! - `users.rs` - users, carry-forward balances and percent dependencies
//! - `catalog.rs` - offers and traffic sources
//! - `campaigns.rs` - local campaign mirror
//! - `test_budgets.rs` - test budgets and their administration
//! - `reports.rs` - committed reports and campaign snapshots
//!
//! Commit-time writes of one calculation go through [`Repository::apply_commit`].

mod campaigns;
mod catalog;
mod reports;
mod test_budgets;
mod users;

pub use test_budgets::TestAdminError;

use crate::config::ExhaustedTestPolicy;
use crate::domain::{
    parse_date, Campaign, CampaignId, CampaignSnapshot, Decimal, Period, ReportCategory,
    ReportId, TestId, TrafficCategory, UserId,
};
use crate::engine::TestBalanceChange;
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::BTreeMap;
use tracing::info;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

/// A report to create on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub period: Period,
    pub categories: BTreeMap<TrafficCategory, ReportCategory>,
    pub campaigns: Vec<CampaignSnapshot>,
}

/// Everything one committing calculation writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    pub user_id: UserId,
    /// New stored balance per calculated category.
    pub balances: BTreeMap<TrafficCategory, Decimal>,
    pub test_changes: Vec<TestBalanceChange>,
    pub exhausted_policy: ExhaustedTestPolicy,
    /// Tests whose lifetime elapsed before this run.
    pub expired_tests: Vec<TestId>,
    /// Current-period campaigns with their offer ids.
    pub campaigns: Vec<Campaign>,
    pub report: NewReport,
    /// Snapshot profits of earlier reports that rose since they were taken.
    pub snapshot_updates: Vec<(ReportId, CampaignId, Decimal)>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write a calculation's results in one transaction.
    ///
    /// Nothing is written if any statement fails. Every offer referenced by
    /// `plan.campaigns` must already be in the catalogue.
    ///
    /// # Errors
    /// Returns an error if any database operation fails.
    pub async fn apply_commit(&self, plan: &CommitPlan) -> Result<ReportId, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for (category, balance) in &plan.balances {
            write_balance(&mut tx, plan.user_id, *category, *balance).await?;
        }

        for change in plan.test_changes.iter().filter(|c| c.needs_persist()) {
            if !change.is_exhausted() {
                sqlx::query("UPDATE tests SET balance = ? WHERE id = ?")
                    .bind(change.end_balance.to_canonical_string())
                    .bind(change.test_id.as_i64())
                    .execute(&mut *tx)
                    .await?;
                continue;
            }
            match plan.exhausted_policy {
                ExhaustedTestPolicy::Archive => {
                    sqlx::query("UPDATE tests SET balance = ?, archived = 1 WHERE id = ?")
                        .bind(change.end_balance.to_canonical_string())
                        .bind(change.test_id.as_i64())
                        .execute(&mut *tx)
                        .await?;
                }
                ExhaustedTestPolicy::Delete => {
                    sqlx::query("DELETE FROM tests WHERE id = ?")
                        .bind(change.test_id.as_i64())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        for test_id in &plan.expired_tests {
            sqlx::query("UPDATE tests SET archived = 1 WHERE id = ?")
                .bind(test_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }

        for campaign in &plan.campaigns {
            campaigns::upsert_campaign(&mut tx, campaign).await?;
        }

        let report_id = reports::insert_report(&mut tx, plan.user_id, &plan.report).await?;

        for (report, campaign, profit) in &plan.snapshot_updates {
            sqlx::query(
                "UPDATE report_campaigns SET profit = ? WHERE report_id = ? AND campaign_id = ?",
            )
            .bind(profit.to_canonical_string())
            .bind(report.as_i64())
            .bind(campaign.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            user = %plan.user_id,
            report = %report_id,
            campaigns = plan.campaigns.len(),
            "Committed calculation for {}",
            plan.report.period
        );
        Ok(report_id)
    }
}

pub(crate) async fn write_balance(
    tx: &mut Transaction<'_, Sqlite>,
    user: UserId,
    category: TrafficCategory,
    balance: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_balances (user_id, category, balance)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id, category) DO UPDATE SET balance = excluded.balance
        "#,
    )
    .bind(user.as_i64())
    .bind(category.as_str())
    .bind(balance.round_money().to_canonical_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str_canonical(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn date_col(row: &SqliteRow, column: &str) -> Result<NaiveDate, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse_date(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn category_col(row: &SqliteRow, column: &str) -> Result<TrafficCategory, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    TrafficCategory::parse(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unknown traffic category {:?}", raw).into(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }
}

#[cfg(test)]
mod commit_tests {
    use super::test_support::setup_test_db;
    use super::*;
    use crate::domain::{Offer, OfferId, TestDraft, TrafficSourceId, User};
    use std::collections::BTreeSet;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        )
    }

    fn campaign(id: i64, offer: i64) -> Campaign {
        Campaign {
            id: CampaignId::new(id),
            name: format!("c{}", id),
            category: Some(TrafficCategory::Push),
            traffic_source_id: TrafficSourceId::new(5),
            user_id: UserId::new(1),
            revenue: d("10"),
            cost: d("50"),
            profit: d("-40"),
            offer_ids: [OfferId::new(offer)].into_iter().collect(),
        }
    }

    fn offer(id: i64) -> Offer {
        Offer {
            id: OfferId::new(id),
            geo: "BR".to_string(),
            name: format!("offer {}", id),
            group: "g".to_string(),
            network: "n".to_string(),
        }
    }

    fn draft() -> TestDraft {
        TestDraft {
            user_id: UserId::new(1),
            category: TrafficCategory::Push,
            budget: d("100"),
            balance: d("100"),
            offer_ids: [OfferId::new(10)].into_iter().collect(),
            traffic_source_ids: [TrafficSourceId::new(5)].into_iter().collect(),
            geos: BTreeSet::new(),
            one_budget_for_all_offers: false,
            one_budget_for_all_traffic_sources: false,
            one_budget_for_all_geo: false,
            adding_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            lifetime_days: 60,
            archived: false,
        }
    }

    fn plan(test_id: TestId, end_balance: &str) -> CommitPlan {
        CommitPlan {
            user_id: UserId::new(1),
            balances: [(TrafficCategory::Push, d("-12.5"))].into_iter().collect(),
            test_changes: vec![TestBalanceChange {
                test_id,
                start_balance: d("100"),
                end_balance: d(end_balance),
            }],
            exhausted_policy: ExhaustedTestPolicy::Archive,
            expired_tests: Vec::new(),
            campaigns: vec![campaign(77, 10)],
            report: NewReport {
                period: period(),
                categories: BTreeMap::new(),
                campaigns: vec![CampaignSnapshot {
                    campaign_id: CampaignId::new(77),
                    category: TrafficCategory::Push,
                    profit: d("-40"),
                }],
            },
            snapshot_updates: Vec::new(),
        }
    }

    async fn seeded() -> (Repository, tempfile::TempDir, TestId) {
        let (repo, temp) = setup_test_db().await;
        repo.save_user(&User::new(UserId::new(1), "alice".to_string()))
            .await
            .unwrap();
        repo.insert_new_offers(&[offer(10)]).await.unwrap();
        let test_id = repo.create_test(&draft()).await.unwrap();
        (repo, temp, test_id)
    }

    #[tokio::test]
    async fn test_commit_writes_everything() {
        let (repo, _temp, test_id) = seeded().await;

        let report_id = repo.apply_commit(&plan(test_id, "60")).await.unwrap();

        let user = repo.get_user(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(user.balance(TrafficCategory::Push), d("-12.5"));

        let test = repo.get_test(test_id).await.unwrap().unwrap();
        assert_eq!(test.draft.balance, d("60"));
        assert!(!test.draft.archived);

        let stored = repo.stored_campaigns(UserId::new(1)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].offer_ids, [OfferId::new(10)].into_iter().collect());

        let reports = repo.reports_for(UserId::new(1)).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, report_id);
        assert_eq!(reports[0].campaigns[0].profit, d("-40"));
    }

    #[tokio::test]
    async fn test_exhausted_test_is_archived() {
        let (repo, _temp, test_id) = seeded().await;
        repo.apply_commit(&plan(test_id, "-5")).await.unwrap();

        let test = repo.get_test(test_id).await.unwrap().unwrap();
        assert!(test.draft.archived);
        assert!(repo.active_tests(UserId::new(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_test_is_deleted_under_delete_policy() {
        let (repo, _temp, test_id) = seeded().await;
        let mut plan = plan(test_id, "0");
        plan.exhausted_policy = ExhaustedTestPolicy::Delete;
        repo.apply_commit(&plan).await.unwrap();

        assert!(repo.get_test(test_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let (repo, _temp, test_id) = seeded().await;
        let mut plan = plan(test_id, "60");
        // Offer 999 is not in the catalogue, so the link insert fails.
        plan.campaigns.push(campaign(78, 999));

        assert!(repo.apply_commit(&plan).await.is_err());

        let user = repo.get_user(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(user.balance(TrafficCategory::Push), Decimal::zero());
        let test = repo.get_test(test_id).await.unwrap().unwrap();
        assert_eq!(test.draft.balance, d("100"));
        assert!(repo.stored_campaigns(UserId::new(1)).await.unwrap().is_empty());
        assert!(repo.reports_for(UserId::new(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_updates_apply() {
        let (repo, _temp, test_id) = seeded().await;
        let report_id = repo.apply_commit(&plan(test_id, "60")).await.unwrap();

        let mut next = plan(test_id, "60");
        next.report.period = Period::new(
            NaiveDate::from_ymd_opt(2024, 6, 16).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        );
        next.snapshot_updates = vec![(report_id, CampaignId::new(77), d("-10"))];
        repo.apply_commit(&next).await.unwrap();

        let reports = repo.reports_for(UserId::new(1)).await.unwrap();
        assert_eq!(reports[0].campaigns[0].profit, d("-10"));
    }
}
