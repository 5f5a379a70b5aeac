use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resident_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResidentStatus {
    Active,
    Temporary,
    Absent,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resident_relationship", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResidentRelationship {
    Owner,
    Spouse,
    Child,
    Parent,
    Tenant,
    Other,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: Uuid,
    pub full_name: String,
    pub id_card: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<NaiveDate>,
    pub home_town: Option<String>,
    pub relationship: Option<ResidentRelationship>,
    pub status: ResidentStatus,
    pub apartment_id: Option<Uuid>,
    #[serde(skip)]
    pub user_id: Option<Uuid>,
    // Joined from apartments/buildings
    pub room_number: Option<i32>,
    pub building_name: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResidentSummary {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub room_number: Option<i32>,
    pub building_name: Option<String>,
    pub status: ResidentStatus,
}
