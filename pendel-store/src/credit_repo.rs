use async_trait::async_trait;
use chrono::NaiveDate;
use pendel_core::credit::{CreditDefaults, CreditPeriod};
use pendel_core::error::StoreError;
use pendel_core::repository::{CreditRepository, StoreResult};
use pendel_shared::RideType;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_err;

pub struct PgCreditRepository {
    pool: PgPool,
}

impl PgCreditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CreditRow {
    user_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
    standard_total: i32,
    standard_used: i32,
    grocery_total: i32,
    grocery_used: i32,
}

impl From<CreditRow> for CreditPeriod {
    fn from(row: CreditRow) -> Self {
        CreditPeriod {
            user_id: row.user_id,
            period_start: row.period_start,
            period_end: row.period_end,
            standard_total: row.standard_total,
            standard_used: row.standard_used,
            grocery_total: row.grocery_total,
            grocery_used: row.grocery_used,
        }
    }
}

fn used_column(kind: RideType) -> &'static str {
    match kind {
        RideType::Standard => "standard_used",
        RideType::Grocery => "grocery_used",
    }
}

fn total_column(kind: RideType) -> &'static str {
    match kind {
        RideType::Standard => "standard_total",
        RideType::Grocery => "grocery_total",
    }
}

#[async_trait]
impl CreditRepository for PgCreditRepository {
    async fn get_or_create(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
        defaults: CreditDefaults,
    ) -> StoreResult<CreditPeriod> {
        // Lazy creation: the insert is a no-op when the row exists, so two
        // first-access races converge on one row.
        sqlx::query(
            r#"
            INSERT INTO credit_periods (user_id, period_start, period_end,
                                        standard_total, standard_used, grocery_total, grocery_used)
            VALUES ($1, $2, $3, $4, 0, $5, 0)
            ON CONFLICT (user_id, period_start) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(period_start)
        .bind(period_end)
        .bind(defaults.standard_total)
        .bind(defaults.grocery_total)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let row: CreditRow = sqlx::query_as(
            "SELECT user_id, period_start, period_end, standard_total, standard_used, \
             grocery_total, grocery_used FROM credit_periods \
             WHERE user_id = $1 AND period_start = $2",
        )
        .bind(user_id)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::Conflict("credit period vanished after upsert".into()))?;

        Ok(row.into())
    }

    async fn try_debit(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        kind: RideType,
    ) -> StoreResult<bool> {
        let used = used_column(kind);
        let total = total_column(kind);
        let result = sqlx::query(&format!(
            "UPDATE credit_periods SET {used} = {used} + 1 \
             WHERE user_id = $1 AND period_start = $2 AND {used} < {total}"
        ))
        .bind(user_id)
        .bind(period_start)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn refund(
        &self,
        user_id: Uuid,
        period_start: NaiveDate,
        kind: RideType,
    ) -> StoreResult<()> {
        let used = used_column(kind);
        sqlx::query(&format!(
            "UPDATE credit_periods SET {used} = GREATEST({used} - 1, 0) \
             WHERE user_id = $1 AND period_start = $2"
        ))
        .bind(user_id)
        .bind(period_start)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
