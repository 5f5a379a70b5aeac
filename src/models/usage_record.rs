use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use super::ServiceCode;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub service_type_id: Uuid,
    pub code: ServiceCode,
    pub month: i32,
    pub year: i32,
    pub old_index: f64,
    pub new_index: f64,
    pub quantity: f64,
    pub reading_date: NaiveDateTime,
}

/// Previous-period reading keyed by apartment for import validation.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UsageHistory {
    pub room_number: i32,
    pub building_name: String,
    pub code: ServiceCode,
    pub new_index: f64,
    pub quantity: f64,
}
