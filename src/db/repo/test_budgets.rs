//! Test budgets and their administration.

use super::{category_col, date_col, decimal_col, Repository};
use crate::domain::{
    OfferId, TestBudget, TestDraft, TestId, TrafficSourceId, UserId, ValidationError,
};
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TestAdminError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

const TEST_COLUMNS: &str = r#"
    SELECT id, user_id, category, budget, balance,
           one_budget_for_all_offers, one_budget_for_all_traffic_sources, one_budget_for_all_geo,
           adding_date, lifetime_days, archived
    FROM tests
"#;

#[derive(Default)]
struct Links {
    offers: BTreeMap<i64, BTreeSet<OfferId>>,
    sources: BTreeMap<i64, BTreeSet<TrafficSourceId>>,
    geos: BTreeMap<i64, BTreeSet<String>>,
}

impl Repository {
    /// Non-archived tests of `user`, ordered by id.
    pub async fn active_tests(&self, user: UserId) -> Result<Vec<TestBudget>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = ? AND archived = 0 ORDER BY id ASC",
            TEST_COLUMNS
        ))
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(&rows).await
    }

    /// Every test of `user`, archived ones included.
    pub async fn all_tests(&self, user: UserId) -> Result<Vec<TestBudget>, sqlx::Error> {
        let rows = sqlx::query(&format!("{} WHERE user_id = ? ORDER BY id ASC", TEST_COLUMNS))
            .bind(user.as_i64())
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(&rows).await
    }

    pub async fn get_test(&self, id: TestId) -> Result<Option<TestBudget>, sqlx::Error> {
        let rows = sqlx::query(&format!("{} WHERE id = ?", TEST_COLUMNS))
            .bind(id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(self.hydrate(&rows).await?.into_iter().next())
    }

    /// Validate and store a new test.
    ///
    /// Rejects bad amounts, traffic sources pinned to another user and exact
    /// duplicates of an existing test.
    pub async fn create_test(&self, draft: &TestDraft) -> Result<TestId, TestAdminError> {
        draft.validate()?;

        for source in &draft.traffic_source_ids {
            match self.traffic_source_owner(*source).await? {
                Some(Some(owner)) if owner == draft.user_id => {}
                // Not mirrored yet; the next sync decides ownership.
                None => {}
                _ => return Err(ValidationError::TrafficSourceOfAnotherUser(*source).into()),
            }
        }

        let existing = self.all_tests(draft.user_id).await?;
        if existing.iter().any(|t| t.draft.same_slice(draft)) {
            return Err(ValidationError::Duplicate.into());
        }

        let mut tx = self.pool.begin().await?;
        let id = insert_test(&mut tx, draft).await?;
        tx.commit().await?;

        info!(test = %id, user = %draft.user_id, "Created test");
        Ok(id)
    }

    /// Replace a test by `parts` atomically. Returns the new ids in order.
    pub async fn replace_test(
        &self,
        id: TestId,
        parts: &[TestDraft],
    ) -> Result<Vec<TestId>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tests WHERE id = ?")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(parts.len());
        for part in parts {
            ids.push(insert_test(&mut tx, part).await?);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Archive active tests of `user` whose lifetime has elapsed by `today`.
    pub async fn archive_expired(
        &self,
        user: UserId,
        today: NaiveDate,
    ) -> Result<Vec<TestId>, sqlx::Error> {
        let expired: Vec<TestId> = self
            .active_tests(user)
            .await?
            .into_iter()
            .filter(|t| t.draft.is_expired(today))
            .map(|t| t.id)
            .collect();

        if expired.is_empty() {
            return Ok(expired);
        }

        let mut tx = self.pool.begin().await?;
        for id in &expired {
            sqlx::query("UPDATE tests SET archived = 1 WHERE id = ?")
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(user = %user, count = expired.len(), "Archived expired tests");
        Ok(expired)
    }

    async fn hydrate(&self, rows: &[SqliteRow]) -> Result<Vec<TestBudget>, sqlx::Error> {
        let mut links = Links::default();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            self.load_links(id, &mut links).await?;
        }

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                let lifetime: i64 = row.try_get("lifetime_days")?;
                Ok(TestBudget::new(
                    TestId::new(id),
                    TestDraft {
                        user_id: UserId::new(row.try_get("user_id")?),
                        category: category_col(row, "category")?,
                        budget: decimal_col(row, "budget")?,
                        balance: decimal_col(row, "balance")?,
                        offer_ids: links.offers.remove(&id).unwrap_or_default(),
                        traffic_source_ids: links.sources.remove(&id).unwrap_or_default(),
                        geos: links.geos.remove(&id).unwrap_or_default(),
                        one_budget_for_all_offers: row.try_get("one_budget_for_all_offers")?,
                        one_budget_for_all_traffic_sources: row
                            .try_get("one_budget_for_all_traffic_sources")?,
                        one_budget_for_all_geo: row.try_get("one_budget_for_all_geo")?,
                        adding_date: date_col(row, "adding_date")?,
                        lifetime_days: u32::try_from(lifetime).unwrap_or(0),
                        archived: row.try_get("archived")?,
                    },
                ))
            })
            .collect()
    }

    async fn load_links(&self, id: i64, links: &mut Links) -> Result<(), sqlx::Error> {
        for r in sqlx::query("SELECT offer_id FROM test_offers WHERE test_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
        {
            links
                .offers
                .entry(id)
                .or_default()
                .insert(OfferId::new(r.try_get("offer_id")?));
        }

        for r in sqlx::query("SELECT traffic_source_id FROM test_traffic_sources WHERE test_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
        {
            links
                .sources
                .entry(id)
                .or_default()
                .insert(TrafficSourceId::new(r.try_get("traffic_source_id")?));
        }

        for r in sqlx::query("SELECT geo FROM test_geos WHERE test_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?
        {
            links.geos.entry(id).or_default().insert(r.try_get("geo")?);
        }

        Ok(())
    }
}

async fn insert_test(
    tx: &mut Transaction<'_, Sqlite>,
    draft: &TestDraft,
) -> Result<TestId, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO tests (
            user_id, category, budget, balance,
            one_budget_for_all_offers, one_budget_for_all_traffic_sources, one_budget_for_all_geo,
            adding_date, lifetime_days, archived
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(draft.user_id.as_i64())
    .bind(draft.category.as_str())
    .bind(draft.budget.to_canonical_string())
    .bind(draft.balance.to_canonical_string())
    .bind(draft.one_budget_for_all_offers)
    .bind(draft.one_budget_for_all_traffic_sources)
    .bind(draft.one_budget_for_all_geo)
    .bind(draft.adding_date.to_string())
    .bind(i64::from(draft.lifetime_days))
    .bind(draft.archived)
    .execute(&mut **tx)
    .await?;

    let id = result.last_insert_rowid();

    for offer in &draft.offer_ids {
        sqlx::query("INSERT INTO test_offers (test_id, offer_id) VALUES (?, ?)")
            .bind(id)
            .bind(offer.as_i64())
            .execute(&mut **tx)
            .await?;
    }
    for source in &draft.traffic_source_ids {
        sqlx::query("INSERT INTO test_traffic_sources (test_id, traffic_source_id) VALUES (?, ?)")
            .bind(id)
            .bind(source.as_i64())
            .execute(&mut **tx)
            .await?;
    }
    for geo in &draft.geos {
        sqlx::query("INSERT INTO test_geos (test_id, geo) VALUES (?, ?)")
            .bind(id)
            .bind(geo)
            .execute(&mut **tx)
            .await?;
    }

    Ok(TestId::new(id))
}
