//! Local campaign mirror.

use super::{decimal_col, Repository};
use crate::domain::{Campaign, CampaignId, OfferId, TrafficCategory, TrafficSourceId, UserId};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::{BTreeMap, BTreeSet};

/// Insert a campaign or refresh its statistics, and link its offers.
pub(super) async fn upsert_campaign(
    tx: &mut Transaction<'_, Sqlite>,
    campaign: &Campaign,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO campaigns (id, name, category, traffic_source_id, user_id, revenue, cost, profit)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            traffic_source_id = excluded.traffic_source_id,
            revenue = excluded.revenue,
            cost = excluded.cost,
            profit = excluded.profit
        "#,
    )
    .bind(campaign.id.as_i64())
    .bind(&campaign.name)
    .bind(campaign.category.map(|c| c.as_str()))
    .bind(campaign.traffic_source_id.as_i64())
    .bind(campaign.user_id.as_i64())
    .bind(campaign.revenue.to_canonical_string())
    .bind(campaign.cost.to_canonical_string())
    .bind(campaign.profit.to_canonical_string())
    .execute(&mut **tx)
    .await?;

    for offer in &campaign.offer_ids {
        sqlx::query(
            "INSERT INTO campaign_offers (campaign_id, offer_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(campaign.id.as_i64())
        .bind(offer.as_i64())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

impl Repository {
    /// Campaigns mirrored for `user`, with offers, ordered by id.
    pub async fn stored_campaigns(&self, user: UserId) -> Result<Vec<Campaign>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, category, traffic_source_id, user_id, revenue, cost, profit
            FROM campaigns
            WHERE user_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let link_rows = sqlx::query(
            r#"
            SELECT co.campaign_id, co.offer_id
            FROM campaign_offers co
            JOIN campaigns c ON c.id = co.campaign_id
            WHERE c.user_id = ?
            "#,
        )
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut links: BTreeMap<i64, BTreeSet<OfferId>> = BTreeMap::new();
        for r in &link_rows {
            links
                .entry(r.try_get("campaign_id")?)
                .or_default()
                .insert(OfferId::new(r.try_get("offer_id")?));
        }

        rows.iter()
            .map(|r| {
                let id: i64 = r.try_get("id")?;
                let category: Option<String> = r.try_get("category")?;
                Ok(Campaign {
                    id: CampaignId::new(id),
                    name: r.try_get("name")?,
                    category: category.as_deref().and_then(TrafficCategory::parse),
                    traffic_source_id: TrafficSourceId::new(r.try_get("traffic_source_id")?),
                    user_id: UserId::new(r.try_get("user_id")?),
                    revenue: decimal_col(r, "revenue")?,
                    cost: decimal_col(r, "cost")?,
                    profit: decimal_col(r, "profit")?,
                    offer_ids: links.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Offer ids linked to a mirrored campaign; `None` when it is not mirrored.
    pub async fn campaign_offer_ids(
        &self,
        campaign: CampaignId,
    ) -> Result<Option<BTreeSet<OfferId>>, sqlx::Error> {
        let exists = sqlx::query("SELECT 1 FROM campaigns WHERE id = ?")
            .bind(campaign.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query("SELECT offer_id FROM campaign_offers WHERE campaign_id = ?")
            .bind(campaign.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<i64, _>("offer_id").map(OfferId::new))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Some)
    }
}
