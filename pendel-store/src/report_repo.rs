use async_trait::async_trait;
use chrono::NaiveDate;
use pendel_core::repository::{CounterRepository, StoreResult, SummaryRepository};
use pendel_core::summary::DailySummary;
use sqlx::PgPool;

use crate::db_err;

pub struct PgSummaryRepository {
    pool: PgPool,
}

impl PgSummaryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    date: NaiveDate,
    premium_booked: i64,
    non_premium_booked: i64,
    computed_non_premium_capacity: i64,
    premium_load_pct: f64,
}

impl From<SummaryRow> for DailySummary {
    fn from(row: SummaryRow) -> Self {
        DailySummary {
            date: row.date,
            premium_booked: row.premium_booked,
            non_premium_booked: row.non_premium_booked,
            computed_non_premium_capacity: row.computed_non_premium_capacity,
            premium_load_pct: row.premium_load_pct,
        }
    }
}

#[async_trait]
impl SummaryRepository for PgSummaryRepository {
    async fn upsert(&self, summary: &DailySummary) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (date, premium_booked, non_premium_booked,
                                         computed_non_premium_capacity, premium_load_pct)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (date) DO UPDATE SET
                premium_booked = EXCLUDED.premium_booked,
                non_premium_booked = EXCLUDED.non_premium_booked,
                computed_non_premium_capacity = EXCLUDED.computed_non_premium_capacity,
                premium_load_pct = EXCLUDED.premium_load_pct
            "#,
        )
        .bind(summary.date)
        .bind(summary.premium_booked)
        .bind(summary.non_premium_booked)
        .bind(summary.computed_non_premium_capacity)
        .bind(summary.premium_load_pct)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get(&self, date: NaiveDate) -> StoreResult<Option<DailySummary>> {
        let row: Option<SummaryRow> = sqlx::query_as(
            "SELECT date, premium_booked, non_premium_booked, computed_non_premium_capacity, \
             premium_load_pct FROM daily_summaries WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(Into::into))
    }
}

pub struct PgCounterRepository {
    pool: PgPool,
}

impl PgCounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterRepository for PgCounterRepository {
    async fn increment_bounded(&self, key: &str, max: i64) -> StoreResult<bool> {
        if max <= 0 {
            return Ok(false);
        }

        // Upsert with a guarded update: the first increment creates the row,
        // later ones only apply while strictly below the ceiling.
        let result = sqlx::query(
            r#"
            INSERT INTO counters (key, value) VALUES ($1, 1)
            ON CONFLICT (key) DO UPDATE SET value = counters.value + 1
            WHERE counters.value < $2
            "#,
        )
        .bind(key)
        .bind(max)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn decrement_floored(&self, key: &str) -> StoreResult<()> {
        sqlx::query("UPDATE counters SET value = GREATEST(value - 1, 0) WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(value.unwrap_or(0))
    }
}
