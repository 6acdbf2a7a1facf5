//! Offer and traffic source catalogue.

use super::Repository;
use crate::domain::{Offer, OfferId, TrafficSource, TrafficSourceId, UserId};
use sqlx::Row;
use std::collections::BTreeSet;

impl Repository {
    /// Insert offers not yet in the catalogue. Returns how many were new.
    pub async fn insert_new_offers(&self, offers: &[Offer]) -> Result<usize, sqlx::Error> {
        if offers.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for offer in offers {
            let result = sqlx::query(
                r#"
                INSERT INTO offers (id, geo, name, offer_group, network)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(offer.id.as_i64())
            .bind(&offer.geo)
            .bind(&offer.name)
            .bind(&offer.group)
            .bind(&offer.network)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// The subset of `ids` present in the catalogue.
    pub async fn known_offer_ids(
        &self,
        ids: &BTreeSet<OfferId>,
    ) -> Result<BTreeSet<OfferId>, sqlx::Error> {
        let mut known = BTreeSet::new();
        for id in ids {
            let found = sqlx::query("SELECT 1 FROM offers WHERE id = ?")
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
            if found.is_some() {
                known.insert(*id);
            }
        }
        Ok(known)
    }

    /// Insert traffic sources not yet known. Returns how many were new.
    pub async fn insert_new_traffic_sources(
        &self,
        sources: &[TrafficSource],
    ) -> Result<usize, sqlx::Error> {
        if sources.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for source in sources {
            let result = sqlx::query(
                r#"
                INSERT INTO traffic_sources (id, name, owner_user_id, campaigns_count, has_tokens)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(source.id.as_i64())
            .bind(&source.name)
            .bind(source.owner_user_id.map(|u| u.as_i64()))
            .bind(source.campaigns_count)
            .bind(source.has_tokens)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Owner of a traffic source: `None` when the source is unknown,
    /// `Some(None)` when it is shared.
    pub async fn traffic_source_owner(
        &self,
        id: TrafficSourceId,
    ) -> Result<Option<Option<UserId>>, sqlx::Error> {
        let row = sqlx::query("SELECT owner_user_id FROM traffic_sources WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            r.try_get::<Option<i64>, _>("owner_user_id")
                .map(|owner| owner.map(UserId::new))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use crate::domain::User;

    fn offer(id: i64) -> Offer {
        Offer {
            id: OfferId::new(id),
            geo: "CL".to_string(),
            name: format!("offer {}", id),
            group: "finance".to_string(),
            network: "net".to_string(),
        }
    }

    #[tokio::test]
    async fn test_offers_insert_once() {
        let (repo, _temp) = setup_test_db().await;

        assert_eq!(repo.insert_new_offers(&[offer(1), offer(2)]).await.unwrap(), 2);
        assert_eq!(repo.insert_new_offers(&[offer(2), offer(3)]).await.unwrap(), 1);

        let asked: BTreeSet<_> = [1, 3, 9].into_iter().map(OfferId::new).collect();
        let known = repo.known_offer_ids(&asked).await.unwrap();
        assert_eq!(known, [1, 3].into_iter().map(OfferId::new).collect());
    }

    #[tokio::test]
    async fn test_traffic_source_owner() {
        let (repo, _temp) = setup_test_db().await;
        repo.save_user(&User::new(UserId::new(4), "dan".to_string()))
            .await
            .unwrap();

        let source = TrafficSource {
            id: TrafficSourceId::new(11),
            name: "push-net".to_string(),
            owner_user_id: Some(UserId::new(4)),
            campaigns_count: 3,
            has_tokens: true,
        };
        assert_eq!(repo.insert_new_traffic_sources(&[source]).await.unwrap(), 1);

        assert_eq!(
            repo.traffic_source_owner(TrafficSourceId::new(11)).await.unwrap(),
            Some(Some(UserId::new(4)))
        );
        assert_eq!(
            repo.traffic_source_owner(TrafficSourceId::new(12)).await.unwrap(),
            None
        );
    }
}
