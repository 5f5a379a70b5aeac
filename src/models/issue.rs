use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "issue_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    Electrical,
    Plumbing,
    Security,
    Cleaning,
    LostItem,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "issue_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Unprocessed,
    Processing,
    Processed,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Unprocessed => "UNPROCESSED",
            IssueStatus::Processing => "PROCESSING",
            IssueStatus::Processed => "PROCESSED",
        }
    }

    /// Tickets only move forward one step at a time
    pub fn can_transition_to(self, next: IssueStatus) -> bool {
        match self {
            IssueStatus::Unprocessed => next == IssueStatus::Processing,
            IssueStatus::Processing => next == IssueStatus::Processed,
            IssueStatus::Processed => false,
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub reporter_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub issue_type: IssueType,
    pub status: IssueStatus,
    pub created_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub id: Uuid,
    pub room_number: i32,
    pub building_name: String,
    pub reporter_name: String,
    pub title: String,
    pub description: Option<String>,
    pub status: IssueStatus,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub issue_type: IssueType,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_status_moves_forward_only() {
        use IssueStatus::*;

        assert!(Unprocessed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processed));

        assert!(!Unprocessed.can_transition_to(Processed));
        assert!(!Processing.can_transition_to(Unprocessed));
        assert!(!Processed.can_transition_to(Processing));
        assert!(!Processed.can_transition_to(Processed));
    }
}
