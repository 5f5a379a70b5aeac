use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::Database;
use crate::models::{Notification, NotificationType};
use crate::pagination::{Page, PageRequest};

const NOTIFICATION_SELECT: &str = r#"
    SELECT n.id, n.recipient_id, r.full_name AS recipient_name, n.title, n.message, n.type,
           n.is_read, n.created_at, n.read_at, n.reference_id, n.reference_type
    FROM notifications n
    JOIN residents r ON r.id = n.recipient_id
"#;

/// A notification about to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    pub types: Option<Vec<NotificationType>>,
    pub is_read: Option<bool>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub page: u32,
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

impl NotificationFilter {
    /// Column to order by; unknown names fall back to creation time
    pub fn sort_column(&self) -> &'static str {
        match self.sort_by.as_deref() {
            Some("title") => "n.title",
            Some("type") => "n.type",
            Some("isRead") => "n.is_read",
            _ => "n.created_at",
        }
    }

    pub fn sort_direction(&self) -> &'static str {
        match self.sort_direction.as_deref() {
            Some(direction) if direction.eq_ignore_ascii_case("ASC") => "ASC",
            _ => "DESC",
        }
    }

    pub fn page_request(&self) -> PageRequest {
        match self.size {
            Some(size) => PageRequest::new(self.page, size),
            None => PageRequest {
                page: self.page,
                ..PageRequest::default()
            },
        }
    }

    /// Start of `fromDate`
    pub fn from_time(&self) -> Option<NaiveDateTime> {
        self.from_date.map(|date| date.and_time(NaiveTime::MIN))
    }

    /// Exclusive upper bound: start of the day after `toDate`
    pub fn until_time(&self) -> Option<NaiveDateTime> {
        self.to_date
            .and_then(|date| date.checked_add_days(Days::new(1)))
            .map(|date| date.and_time(NaiveTime::MIN))
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>, recipient_id: Uuid) {
        query.push(" WHERE n.recipient_id = ").push_bind(recipient_id);

        if let Some(types) = self.types.as_ref().filter(|types| !types.is_empty()) {
            let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
            query.push(" AND n.type::text = ANY(").push_bind(names).push(")");
        }
        if let Some(is_read) = self.is_read {
            query.push(" AND n.is_read = ").push_bind(is_read);
        }
        if let Some(from) = self.from_time() {
            query.push(" AND n.created_at >= ").push_bind(from);
        }
        if let Some(until) = self.until_time() {
            query.push(" AND n.created_at < ").push_bind(until);
        }
    }
}

/// Insert one notification on an open connection or transaction
pub(crate) async fn insert_notification(
    conn: &mut PgConnection,
    item: &NewNotification,
) -> sqlx::Result<Uuid> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO notifications (id, recipient_id, title, message, type, reference_id, reference_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(item.recipient_id)
    .bind(&item.title)
    .bind(&item.message)
    .bind(item.notification_type)
    .bind(item.reference_id)
    .bind(&item.reference_type)
    .fetch_one(conn)
    .await
}

impl Database {
    /// Store a batch of notifications and return them as delivered
    pub async fn create_notifications(&self, items: &[NewNotification]) -> sqlx::Result<Vec<Notification>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(insert_notification(&mut tx, item).await?);
        }

        // Commit the transaction
        tx.commit().await?;

        self.notifications_by_ids(&ids).await
    }

    pub async fn notifications_by_ids(&self, ids: &[Uuid]) -> sqlx::Result<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(&format!(
            "{} WHERE n.id = ANY($1) ORDER BY n.created_at DESC",
            NOTIFICATION_SELECT
        ))
        .bind(ids.to_vec())
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn latest_notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        request: PageRequest,
    ) -> sqlx::Result<Page<Notification>> {
        let content = sqlx::query_as::<_, Notification>(&format!(
            r#"{}
            WHERE n.recipient_id = $1 AND (NOT $2 OR NOT n.is_read)
            ORDER BY n.created_at DESC, n.id
            LIMIT $3 OFFSET $4
            "#,
            NOTIFICATION_SELECT
        ))
        .bind(recipient_id)
        .bind(unread_only)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(self.get_pool())
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read)",
        )
        .bind(recipient_id)
        .bind(unread_only)
        .fetch_one(self.get_pool())
        .await?;

        Ok(Page::new(content, request, total))
    }

    pub async fn count_unread(&self, recipient_id: Uuid) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(recipient_id)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn filter_notifications(
        &self,
        recipient_id: Uuid,
        filter: &NotificationFilter,
    ) -> sqlx::Result<Page<Notification>> {
        let request = filter.page_request();

        let mut query = QueryBuilder::<Postgres>::new(NOTIFICATION_SELECT);
        filter.push_conditions(&mut query, recipient_id);
        query
            .push(format!(
                " ORDER BY {} {}, n.id",
                filter.sort_column(),
                filter.sort_direction()
            ))
            .push(" LIMIT ")
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());

        let content = query
            .build_query_as::<Notification>()
            .fetch_all(self.get_pool())
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications n");
        filter.push_conditions(&mut count, recipient_id);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(self.get_pool())
            .await?;

        Ok(Page::new(content, request, total))
    }

    /// Only the recipient may mark a notification read
    pub async fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND recipient_id = $2
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .execute(self.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> sqlx::Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = NOW() WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(recipient_id)
        .execute(self.get_pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_notification(&self, id: Uuid, recipient_id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Purge notifications created before `cutoff`
    pub async fn delete_notifications_before(&self, cutoff: NaiveDateTime) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(sort_by: Option<&str>, direction: Option<&str>) -> NotificationFilter {
        NotificationFilter {
            sort_by: sort_by.map(str::to_string),
            sort_direction: direction.map(str::to_string),
            ..NotificationFilter::default()
        }
    }

    #[test]
    fn sort_column_is_whitelisted() {
        assert_eq!(filter(Some("title"), None).sort_column(), "n.title");
        assert_eq!(filter(Some("type"), None).sort_column(), "n.type");
        assert_eq!(filter(Some("isRead"), None).sort_column(), "n.is_read");
        assert_eq!(filter(Some("createdAt"), None).sort_column(), "n.created_at");
        assert_eq!(filter(Some("1; DROP TABLE users"), None).sort_column(), "n.created_at");
        assert_eq!(filter(None, None).sort_column(), "n.created_at");
    }

    #[test]
    fn direction_defaults_to_descending() {
        assert_eq!(filter(None, Some("asc")).sort_direction(), "ASC");
        assert_eq!(filter(None, Some("ASC")).sort_direction(), "ASC");
        assert_eq!(filter(None, Some("sideways")).sort_direction(), "DESC");
        assert_eq!(filter(None, None).sort_direction(), "DESC");
    }

    #[test]
    fn date_bounds_cover_whole_days() {
        let filter = NotificationFilter {
            from_date: NaiveDate::from_ymd_opt(2024, 11, 1),
            to_date: NaiveDate::from_ymd_opt(2024, 11, 30),
            ..NotificationFilter::default()
        };

        assert_eq!(filter.from_time().unwrap().to_string(), "2024-11-01 00:00:00");
        assert_eq!(filter.until_time().unwrap().to_string(), "2024-12-01 00:00:00");
    }

    #[test]
    fn page_size_defaults_and_clamps() {
        let parsed: NotificationFilter = serde_json::from_value(serde_json::json!({
            "types": ["BILL_REMINDER", "ISSUE_UPDATE"],
            "isRead": false,
            "page": 2,
            "size": 1000
        }))
        .unwrap();

        assert_eq!(parsed.types.as_ref().unwrap()[1], NotificationType::IssueUpdate);
        assert_eq!(parsed.page_request().limit(), 100);
        assert_eq!(parsed.page_request().offset(), 200);
        assert_eq!(NotificationFilter::default().page_request().limit(), 20);
    }

    #[test]
    fn filter_sql_binds_every_condition() {
        let filter = NotificationFilter {
            types: Some(vec![NotificationType::BillOverdue]),
            is_read: Some(true),
            from_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..NotificationFilter::default()
        };

        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM notifications n");
        filter.push_conditions(&mut query, Uuid::nil());
        let sql = query.sql();

        assert!(sql.contains("n.recipient_id = $1"));
        assert!(sql.contains("n.type::text = ANY($2)"));
        assert!(sql.contains("n.is_read = $3"));
        assert!(sql.contains("n.created_at >= $4"));
        assert!(!sql.contains("n.created_at <"));
    }
}
