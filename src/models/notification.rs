use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    BillReminder,
    BillOverdue,
    IssueUpdate,
    GeneralAnnouncement,
    MaintenanceSchedule,
    SystemNotification,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::BillReminder => "BILL_REMINDER",
            NotificationType::BillOverdue => "BILL_OVERDUE",
            NotificationType::IssueUpdate => "ISSUE_UPDATE",
            NotificationType::GeneralAnnouncement => "GENERAL_ANNOUNCEMENT",
            NotificationType::MaintenanceSchedule => "MAINTENANCE_SCHEDULE",
            NotificationType::SystemNotification => "SYSTEM_NOTIFICATION",
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub recipient_name: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub notification_type: NotificationType,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
    pub read_at: Option<NaiveDateTime>,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
}
