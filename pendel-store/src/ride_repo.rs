use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use pendel_core::repository::{RideRepository, StoreResult};
use pendel_core::ride::{Ride, RideStatus, RideTransition};
use pendel_shared::GeoPoint;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db_err, decode_err};

pub struct PgRideRepository {
    pool: PgPool,
}

impl PgRideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    user_id: Uuid,
    driver_id: Option<Uuid>,
    pickup_lat: f64,
    pickup_lng: f64,
    pickup_address: String,
    dropoff_lat: f64,
    dropoff_lng: f64,
    dropoff_address: String,
    pickup_time: DateTime<Utc>,
    pickup_window_start: DateTime<Utc>,
    pickup_window_end: DateTime<Utc>,
    arrival_target: DateTime<Utc>,
    arrival_window_start: DateTime<Utc>,
    arrival_window_end: DateTime<Utc>,
    ride_type: String,
    status: String,
    arrived_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    wait_minutes: i32,
    wait_charge_cents: i64,
    late_minutes: i32,
    compensation: String,
    compensation_applied: bool,
    slot_id: Option<String>,
    plan_type: String,
    created_at: DateTime<Utc>,
}

impl RideRow {
    fn into_ride(self) -> StoreResult<Ride> {
        Ok(Ride {
            id: self.id,
            user_id: self.user_id,
            driver_id: self.driver_id,
            pickup: GeoPoint::new(self.pickup_lat, self.pickup_lng, self.pickup_address),
            dropoff: GeoPoint::new(self.dropoff_lat, self.dropoff_lng, self.dropoff_address),
            pickup_time: self.pickup_time,
            pickup_window_start: self.pickup_window_start,
            pickup_window_end: self.pickup_window_end,
            arrival_target: self.arrival_target,
            arrival_window_start: self.arrival_window_start,
            arrival_window_end: self.arrival_window_end,
            ride_type: self.ride_type.parse().map_err(decode_err)?,
            status: self.status.parse().map_err(decode_err)?,
            arrived_at: self.arrived_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
            wait_minutes: self.wait_minutes,
            wait_charge_cents: self.wait_charge_cents,
            late_minutes: self.late_minutes,
            compensation: self.compensation.parse().map_err(decode_err)?,
            compensation_applied: self.compensation_applied,
            slot_id: self.slot_id,
            plan_type: self.plan_type.parse().map_err(decode_err)?,
            created_at: self.created_at,
        })
    }
}

const RIDE_COLUMNS: &str = "id, user_id, driver_id, pickup_lat, pickup_lng, pickup_address, \
                            dropoff_lat, dropoff_lng, dropoff_address, pickup_time, \
                            pickup_window_start, pickup_window_end, arrival_target, \
                            arrival_window_start, arrival_window_end, ride_type, status, \
                            arrived_at, started_at, completed_at, cancelled_at, wait_minutes, \
                            wait_charge_cents, late_minutes, compensation, compensation_applied, \
                            slot_id, plan_type, created_at";

const NOT_CANCELLED: &str =
    "status NOT IN ('cancelled_by_user', 'cancelled_by_admin', 'cancelled_by_driver', 'no_show')";

#[async_trait]
impl RideRepository for PgRideRepository {
    async fn insert(&self, ride: &Ride) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rides (id, user_id, driver_id, pickup_lat, pickup_lng, pickup_address,
                               dropoff_lat, dropoff_lng, dropoff_address, pickup_time,
                               pickup_window_start, pickup_window_end, arrival_target,
                               arrival_window_start, arrival_window_end, ride_type, status,
                               arrived_at, started_at, completed_at, cancelled_at, wait_minutes,
                               wait_charge_cents, late_minutes, compensation, compensation_applied,
                               slot_id, plan_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            "#,
        )
        .bind(ride.id)
        .bind(ride.user_id)
        .bind(ride.driver_id)
        .bind(ride.pickup.lat)
        .bind(ride.pickup.lng)
        .bind(&ride.pickup.address)
        .bind(ride.dropoff.lat)
        .bind(ride.dropoff.lng)
        .bind(&ride.dropoff.address)
        .bind(ride.pickup_time)
        .bind(ride.pickup_window_start)
        .bind(ride.pickup_window_end)
        .bind(ride.arrival_target)
        .bind(ride.arrival_window_start)
        .bind(ride.arrival_window_end)
        .bind(ride.ride_type.as_str())
        .bind(ride.status.as_str())
        .bind(ride.arrived_at)
        .bind(ride.started_at)
        .bind(ride.completed_at)
        .bind(ride.cancelled_at)
        .bind(ride.wait_minutes)
        .bind(ride.wait_charge_cents)
        .bind(ride.late_minutes)
        .bind(ride.compensation.as_str())
        .bind(ride.compensation_applied)
        .bind(&ride.slot_id)
        .bind(ride.plan_type.as_str())
        .bind(ride.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let row: Option<RideRow> =
            sqlx::query_as(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(RideRow::into_ride).transpose()
    }

    async fn update_transition(
        &self,
        id: Uuid,
        from: RideStatus,
        to: RideStatus,
        patch: &RideTransition,
    ) -> StoreResult<bool> {
        // One conditional update keyed on the previous status. A concurrent
        // transition on the same row makes this a zero-row update instead of
        // a double-applied side effect.
        let result = sqlx::query(
            r#"
            UPDATE rides SET
                status = $3,
                arrived_at = COALESCE($4, arrived_at),
                started_at = COALESCE($5, started_at),
                completed_at = COALESCE($6, completed_at),
                cancelled_at = COALESCE($7, cancelled_at),
                wait_minutes = COALESCE($8, wait_minutes),
                wait_charge_cents = COALESCE($9, wait_charge_cents),
                late_minutes = COALESCE($10, late_minutes),
                compensation = COALESCE($11, compensation),
                compensation_applied = COALESCE($12, compensation_applied),
                driver_id = COALESCE($13, driver_id)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(patch.arrived_at)
        .bind(patch.started_at)
        .bind(patch.completed_at)
        .bind(patch.cancelled_at)
        .bind(patch.wait_minutes)
        .bind(patch.wait_charge_cents)
        .bind(patch.late_minutes)
        .bind(patch.compensation.map(|c| c.as_str()))
        .bind(patch.compensation_applied)
        .bind(patch.driver_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_in_hour(&self, date: NaiveDate, hour: u32) -> StoreResult<i64> {
        let start = date
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default())
            .and_utc();
        let end = start + Duration::hours(1);

        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM rides \
             WHERE pickup_time >= $1 AND pickup_time < $2 AND {NOT_CANCELLED}"
        ))
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(count)
    }

    async fn has_overlap(
        &self,
        user_id: Uuid,
        pickup: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> StoreResult<bool> {
        let buffer = Duration::minutes(buffer_minutes);

        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM rides \
             WHERE user_id = $1 AND pickup_time BETWEEN $2 AND $3 AND {NOT_CANCELLED})"
        ))
        .bind(user_id)
        .bind(pickup - buffer)
        .bind(pickup + buffer)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(exists)
    }

    async fn count_for_date(&self, date: NaiveDate) -> StoreResult<i64> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1);

        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM rides \
             WHERE pickup_time >= $1 AND pickup_time < $2 AND {NOT_CANCELLED}"
        ))
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(count)
    }

    async fn list_for_date(&self, date: NaiveDate) -> StoreResult<Vec<Ride>> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1);

        let rows: Vec<RideRow> = sqlx::query_as(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides \
             WHERE pickup_time >= $1 AND pickup_time < $2 ORDER BY pickup_time"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(RideRow::into_ride).collect()
    }
}
