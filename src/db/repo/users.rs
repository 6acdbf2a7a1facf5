//! Users, balances and percent dependencies.

use super::{category_col, decimal_col, write_balance, Repository};
use crate::domain::{PercentDependency, User, UserId};
use sqlx::Row;
use std::collections::BTreeMap;

impl Repository {
    /// Insert users the database does not know yet.
    ///
    /// Existing users keep their lead flag, salary group and balances.
    /// Returns the number of newly inserted users.
    pub async fn insert_new_users(&self, users: &[User]) -> Result<usize, sqlx::Error> {
        if users.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for user in users {
            let result = sqlx::query(
                r#"
                INSERT INTO users (id, login, is_lead, salary_group)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(user.id.as_i64())
            .bind(&user.login)
            .bind(user.is_lead)
            .bind(user.salary_group)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Insert or fully overwrite a user, balances included.
    pub async fn save_user(&self, user: &User) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, login, is_lead, salary_group)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                login = excluded.login,
                is_lead = excluded.is_lead,
                salary_group = excluded.salary_group
            "#,
        )
        .bind(user.id.as_i64())
        .bind(&user.login)
        .bind(user.is_lead)
        .bind(user.salary_group)
        .execute(&mut *tx)
        .await?;

        for (category, balance) in &user.balances {
            write_balance(&mut tx, user.id, *category, *balance).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, sqlx::Error> {
        let Some(row) = sqlx::query("SELECT id, login, is_lead, salary_group FROM users WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let balance_rows =
            sqlx::query("SELECT category, balance FROM user_balances WHERE user_id = ?")
                .bind(id.as_i64())
                .fetch_all(&self.pool)
                .await?;

        let mut balances = BTreeMap::new();
        for r in &balance_rows {
            balances.insert(category_col(r, "category")?, decimal_col(r, "balance")?);
        }

        Ok(Some(User {
            id: UserId::new(row.try_get("id")?),
            login: row.try_get("login")?,
            is_lead: row.try_get("is_lead")?,
            salary_group: row.try_get("salary_group")?,
            balances,
        }))
    }

    pub async fn list_user_ids(&self) -> Result<Vec<UserId>, sqlx::Error> {
        let rows = sqlx::query("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<i64, _>("id").map(UserId::new))
            .collect()
    }

    pub async fn save_dependency(&self, dependency: &PercentDependency) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO percent_dependencies (from_user_id, to_user_id, percent)
            VALUES (?, ?, ?)
            ON CONFLICT(from_user_id, to_user_id) DO UPDATE SET percent = excluded.percent
            "#,
        )
        .bind(dependency.from_user.as_i64())
        .bind(dependency.to_user.as_i64())
        .bind(dependency.percent.to_canonical_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every dependency edge, ordered by lead then subordinate.
    pub async fn all_dependencies(&self) -> Result<Vec<PercentDependency>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT from_user_id, to_user_id, percent
            FROM percent_dependencies
            ORDER BY to_user_id ASC, from_user_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(PercentDependency {
                    from_user: UserId::new(r.try_get("from_user_id")?),
                    to_user: UserId::new(r.try_get("to_user_id")?),
                    percent: decimal_col(r, "percent")?,
                })
            })
            .collect()
    }
}
