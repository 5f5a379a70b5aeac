use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub created_at: NaiveDateTime,
    pub receiver_count: i64,
}

/// An announcement as seen by one resident.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResidentAnnouncement {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub sender_name: String,
    pub created_at: NaiveDateTime,
    pub is_read: bool,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementRecipient {
    pub resident_id: Uuid,
    pub resident_name: String,
    pub room_number: Option<i32>,
    pub building_name: Option<String>,
    pub is_read: bool,
}
