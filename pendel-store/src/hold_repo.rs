use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pendel_core::error::StoreError;
use pendel_core::hold::Hold;
use pendel_core::repository::{HoldRepository, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db_err, decode_err};

pub struct PgHoldRepository {
    pool: PgPool,
}

impl PgHoldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    id: Uuid,
    slot_id: String,
    rider_id: Uuid,
    plan_type: String,
    origin: String,
    destination: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    confirmed_ride_id: Option<Uuid>,
}

impl HoldRow {
    fn into_hold(self) -> StoreResult<Hold> {
        Ok(Hold {
            id: self.id,
            slot_id: self.slot_id,
            rider_id: self.rider_id,
            plan_type: self.plan_type.parse().map_err(decode_err)?,
            origin: self.origin,
            destination: self.destination,
            created_at: self.created_at,
            expires_at: self.expires_at,
            status: self.status.parse().map_err(decode_err)?,
            confirmed_ride_id: self.confirmed_ride_id,
        })
    }
}

const HOLD_COLUMNS: &str = "id, slot_id, rider_id, plan_type, origin, destination, \
                            created_at, expires_at, status, confirmed_ride_id";

#[async_trait]
impl HoldRepository for PgHoldRepository {
    async fn insert(&self, hold: &Hold) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO holds (id, slot_id, rider_id, plan_type, origin, destination,
                               created_at, expires_at, status, confirmed_ride_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(hold.id)
        .bind(&hold.slot_id)
        .bind(hold.rider_id)
        .bind(hold.plan_type.as_str())
        .bind(&hold.origin)
        .bind(&hold.destination)
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .bind(hold.status.as_str())
        .bind(hold.confirmed_ride_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // The partial unique index on (slot_id, rider_id) WHERE active
            // turns a duplicate active hold into a conflict.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StoreError::Conflict(format!("active hold exists for slot {}", hold.slot_id)),
            ),
            Err(other) => Err(db_err(other)),
        }
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Hold>> {
        let row: Option<HoldRow> =
            sqlx::query_as(&format!("SELECT {HOLD_COLUMNS} FROM holds WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(HoldRow::into_hold).transpose()
    }

    async fn active_for(&self, slot_id: &str, rider_id: Uuid) -> StoreResult<Option<Hold>> {
        let row: Option<HoldRow> = sqlx::query_as(&format!(
            "SELECT {HOLD_COLUMNS} FROM holds \
             WHERE slot_id = $1 AND rider_id = $2 AND status = 'active'"
        ))
        .bind(slot_id)
        .bind(rider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(HoldRow::into_hold).transpose()
    }

    async fn confirm(&self, id: Uuid, ride_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE holds SET status = 'confirmed', confirmed_ride_id = $2
            WHERE id = $1 AND status = 'active' AND expires_at > $3
            "#,
        )
        .bind(id)
        .bind(ride_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE holds SET status = 'cancelled' WHERE id = $1 AND status = 'active'")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        // Conditional transition with RETURNING: a hold that a concurrent
        // confirm or cancel already won is not returned, and a second sweep
        // finds nothing left to flip.
        let rows: Vec<HoldRow> = sqlx::query_as(&format!(
            "UPDATE holds SET status = 'expired' \
             WHERE status = 'active' AND expires_at <= $1 \
             RETURNING {HOLD_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(HoldRow::into_hold).collect()
    }
}
