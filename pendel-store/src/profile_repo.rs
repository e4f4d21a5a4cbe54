use async_trait::async_trait;
use chrono::NaiveTime;
use pendel_core::repository::{RiderRepository, StoreResult, TemplateRepository};
use pendel_core::rider::Rider;
use pendel_core::template::ScheduleTemplate;
use pendel_shared::GeoPoint;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db_err, decode_err};

pub struct PgTemplateRepository {
    pool: PgPool,
}

impl PgTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    user_id: Uuid,
    day_of_week: i16,
    direction: String,
    arrival_time: NaiveTime,
}

impl TemplateRow {
    fn into_template(self) -> StoreResult<ScheduleTemplate> {
        Ok(ScheduleTemplate {
            user_id: self.user_id,
            day_of_week: self.day_of_week as u8,
            direction: self.direction.parse().map_err(decode_err)?,
            arrival_time: self.arrival_time,
        })
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn upsert(&self, template: &ScheduleTemplate) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule_templates (user_id, day_of_week, direction, arrival_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, day_of_week, direction)
            DO UPDATE SET arrival_time = EXCLUDED.arrival_time
            "#,
        )
        .bind(template.user_id)
        .bind(template.day_of_week as i16)
        .bind(template.direction.as_str())
        .bind(template.arrival_time)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn for_user(&self, user_id: Uuid) -> StoreResult<Vec<ScheduleTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            "SELECT user_id, day_of_week, direction, arrival_time FROM schedule_templates \
             WHERE user_id = $1 ORDER BY day_of_week, direction",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TemplateRow::into_template).collect()
    }
}

pub struct PgRiderRepository {
    pool: PgPool,
}

impl PgRiderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RiderRow {
    id: Uuid,
    plan_type: String,
    home_lat: f64,
    home_lng: f64,
    home_address: String,
    work_lat: f64,
    work_lng: f64,
    work_address: String,
    active: bool,
}

impl RiderRow {
    fn into_rider(self) -> StoreResult<Rider> {
        Ok(Rider {
            id: self.id,
            plan_type: self.plan_type.parse().map_err(decode_err)?,
            home: GeoPoint::new(self.home_lat, self.home_lng, self.home_address),
            work: GeoPoint::new(self.work_lat, self.work_lng, self.work_address),
            active: self.active,
        })
    }
}

const RIDER_COLUMNS: &str = "id, plan_type, home_lat, home_lng, home_address, \
                             work_lat, work_lng, work_address, active";

#[async_trait]
impl RiderRepository for PgRiderRepository {
    async fn upsert(&self, rider: &Rider) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO riders (id, plan_type, home_lat, home_lng, home_address,
                                work_lat, work_lng, work_address, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                plan_type = EXCLUDED.plan_type,
                home_lat = EXCLUDED.home_lat,
                home_lng = EXCLUDED.home_lng,
                home_address = EXCLUDED.home_address,
                work_lat = EXCLUDED.work_lat,
                work_lng = EXCLUDED.work_lng,
                work_address = EXCLUDED.work_address,
                active = EXCLUDED.active
            "#,
        )
        .bind(rider.id)
        .bind(rider.plan_type.as_str())
        .bind(rider.home.lat)
        .bind(rider.home.lng)
        .bind(&rider.home.address)
        .bind(rider.work.lat)
        .bind(rider.work.lng)
        .bind(&rider.work.address)
        .bind(rider.active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Rider>> {
        let row: Option<RiderRow> =
            sqlx::query_as(&format!("SELECT {RIDER_COLUMNS} FROM riders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(RiderRow::into_rider).transpose()
    }

    async fn list_active(&self) -> StoreResult<Vec<Rider>> {
        let rows: Vec<RiderRow> =
            sqlx::query_as(&format!("SELECT {RIDER_COLUMNS} FROM riders WHERE active"))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.into_iter().map(RiderRow::into_rider).collect()
    }
}
