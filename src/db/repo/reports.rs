//! Committed reports and their campaign snapshots.

use super::{category_col, date_col, decimal_col, NewReport, Repository};
use crate::domain::{CampaignId, CampaignSnapshot, Period, Report, ReportCategory, ReportId, UserId};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::BTreeMap;

pub(super) async fn insert_report(
    tx: &mut Transaction<'_, Sqlite>,
    user: UserId,
    report: &NewReport,
) -> Result<ReportId, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO reports (user_id, start_date, end_date, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user.as_i64())
    .bind(report.period.start.to_string())
    .bind(report.period.end.to_string())
    .bind(chrono::Utc::now().timestamp_millis())
    .execute(&mut **tx)
    .await?;
    let id = result.last_insert_rowid();

    for (category, figures) in &report.categories {
        sqlx::query(
            r#"
            INSERT INTO report_categories (report_id, category, revenue, profit, percent, amount)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(category.as_str())
        .bind(figures.revenue.to_canonical_string())
        .bind(figures.profit.to_canonical_string())
        .bind(figures.percent.to_canonical_string())
        .bind(figures.amount.to_canonical_string())
        .execute(&mut **tx)
        .await?;
    }

    for snapshot in &report.campaigns {
        sqlx::query(
            r#"
            INSERT INTO report_campaigns (report_id, campaign_id, category, profit)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(snapshot.campaign_id.as_i64())
        .bind(snapshot.category.as_str())
        .bind(snapshot.profit.to_canonical_string())
        .execute(&mut **tx)
        .await?;
    }

    Ok(ReportId::new(id))
}

impl Repository {
    /// Reports of `user`, oldest period first.
    pub async fn reports_for(&self, user: UserId) -> Result<Vec<Report>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, start_date, end_date
            FROM reports
            WHERE user_id = ?
            ORDER BY start_date ASC, id ASC
            "#,
        )
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;

            let mut categories = BTreeMap::new();
            for r in sqlx::query(
                "SELECT category, revenue, profit, percent, amount FROM report_categories WHERE report_id = ?",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            {
                categories.insert(
                    category_col(&r, "category")?,
                    ReportCategory {
                        revenue: decimal_col(&r, "revenue")?,
                        profit: decimal_col(&r, "profit")?,
                        percent: decimal_col(&r, "percent")?,
                        amount: decimal_col(&r, "amount")?,
                    },
                );
            }

            let mut campaigns = Vec::new();
            for r in sqlx::query(
                r#"
                SELECT campaign_id, category, profit
                FROM report_campaigns
                WHERE report_id = ?
                ORDER BY campaign_id ASC
                "#,
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            {
                campaigns.push(CampaignSnapshot {
                    campaign_id: CampaignId::new(r.try_get("campaign_id")?),
                    category: category_col(&r, "category")?,
                    profit: decimal_col(&r, "profit")?,
                });
            }

            reports.push(Report {
                id: ReportId::new(id),
                user_id: user,
                period: Period::new(date_col(row, "start_date")?, date_col(row, "end_date")?),
                categories,
                campaigns,
            });
        }

        Ok(reports)
    }
}
