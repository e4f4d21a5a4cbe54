use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use pendel_core::repository::{SlotRepository, StoreResult};
use pendel_core::slot::{Slot, TierUsage};
use pendel_shared::{Direction, ServiceTier};
use sqlx::PgPool;

use crate::{db_err, decode_err};

pub struct PgSlotRepository {
    pool: PgPool,
}

impl PgSlotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    slot_id: String,
    date: NaiveDate,
    direction: String,
    slot_type: String,
    arrival_start: NaiveTime,
    arrival_end: NaiveTime,
    max_premium: i32,
    used_premium: i32,
    max_non_premium: i32,
    used_non_premium: i32,
    fragile: bool,
}

impl SlotRow {
    fn into_slot(self) -> StoreResult<Slot> {
        Ok(Slot {
            slot_id: self.slot_id,
            date: self.date,
            direction: self.direction.parse().map_err(decode_err)?,
            slot_type: self.slot_type.parse().map_err(decode_err)?,
            arrival_start: self.arrival_start,
            arrival_end: self.arrival_end,
            max_premium: self.max_premium,
            used_premium: self.used_premium,
            max_non_premium: self.max_non_premium,
            used_non_premium: self.used_non_premium,
            fragile: self.fragile,
        })
    }
}

const SLOT_COLUMNS: &str = "slot_id, date, direction, slot_type, arrival_start, arrival_end, \
                            max_premium, used_premium, max_non_premium, used_non_premium, fragile";

fn used_column(tier: ServiceTier) -> &'static str {
    match tier {
        ServiceTier::Premium => "used_premium",
        ServiceTier::NonPremium => "used_non_premium",
    }
}

fn max_column(tier: ServiceTier) -> &'static str {
    match tier {
        ServiceTier::Premium => "max_premium",
        ServiceTier::NonPremium => "max_non_premium",
    }
}

#[async_trait]
impl SlotRepository for PgSlotRepository {
    async fn insert_missing(&self, slots: &[Slot]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut inserted = 0;

        for slot in slots {
            let result = sqlx::query(
                r#"
                INSERT INTO slots (slot_id, date, direction, slot_type, arrival_start, arrival_end,
                                   max_premium, used_premium, max_non_premium, used_non_premium, fragile)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (slot_id) DO NOTHING
                "#,
            )
            .bind(&slot.slot_id)
            .bind(slot.date)
            .bind(slot.direction.as_str())
            .bind(slot.slot_type.as_str())
            .bind(slot.arrival_start)
            .bind(slot.arrival_end)
            .bind(slot.max_premium)
            .bind(slot.used_premium)
            .bind(slot.max_non_premium)
            .bind(slot.used_non_premium)
            .bind(slot.fragile)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(db_err)?;
        Ok(inserted)
    }

    async fn get(&self, slot_id: &str) -> StoreResult<Option<Slot>> {
        let row: Option<SlotRow> =
            sqlx::query_as(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE slot_id = $1"))
                .bind(slot_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(SlotRow::into_slot).transpose()
    }

    async fn list_for_date(
        &self,
        date: NaiveDate,
        direction: Option<Direction>,
    ) -> StoreResult<Vec<Slot>> {
        let rows: Vec<SlotRow> = match direction {
            Some(dir) => {
                sqlx::query_as(&format!(
                    "SELECT {SLOT_COLUMNS} FROM slots WHERE date = $1 AND direction = $2 \
                     ORDER BY arrival_start"
                ))
                .bind(date)
                .bind(dir.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {SLOT_COLUMNS} FROM slots WHERE date = $1 \
                     ORDER BY direction, arrival_start"
                ))
                .bind(date)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.into_iter().map(SlotRow::into_slot).collect()
    }

    async fn try_reserve(&self, slot_id: &str, tier: ServiceTier) -> StoreResult<bool> {
        // Single conditional update: two racing callers on the last unit
        // cannot both pass the guard.
        let used = used_column(tier);
        let max = max_column(tier);
        let result = sqlx::query(&format!(
            "UPDATE slots SET {used} = {used} + 1 WHERE slot_id = $1 AND {used} < {max}"
        ))
        .bind(slot_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, slot_id: &str, tier: ServiceTier) -> StoreResult<()> {
        let used = used_column(tier);
        sqlx::query(&format!(
            "UPDATE slots SET {used} = GREATEST({used} - 1, 0) WHERE slot_id = $1"
        ))
        .bind(slot_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn tier_usage_for_date(&self, date: NaiveDate) -> StoreResult<TierUsage> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(used_premium), 0)::BIGINT,
                   COALESCE(SUM(max_premium), 0)::BIGINT,
                   COALESCE(SUM(used_non_premium), 0)::BIGINT,
                   COUNT(*) FILTER (WHERE slot_type = 'off_peak')
            FROM slots WHERE date = $1
            "#,
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(TierUsage {
            premium_used: row.0,
            premium_max: row.1,
            non_premium_used: row.2,
            off_peak_slots: row.3,
        })
    }

    async fn delete_for_date(&self, date: NaiveDate) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM slots WHERE date = $1")
            .bind(date)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
