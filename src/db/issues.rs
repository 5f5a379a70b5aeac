use uuid::Uuid;

use super::Database;
use crate::models::{Issue, IssueStatus, IssueSummary, IssueType};

impl Database {
    pub async fn create_issue(
        &self,
        apartment_id: Uuid,
        reporter_id: Uuid,
        title: &str,
        description: Option<&str>,
        issue_type: IssueType,
    ) -> sqlx::Result<Issue> {
        sqlx::query_as::<_, Issue>(
            r#"
            INSERT INTO issues (id, apartment_id, reporter_id, title, description, type, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'UNPROCESSED')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(apartment_id)
        .bind(reporter_id)
        .bind(title)
        .bind(description)
        .bind(issue_type)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn list_issues(&self, status: Option<IssueStatus>) -> sqlx::Result<Vec<IssueSummary>> {
        sqlx::query_as::<_, IssueSummary>(
            r#"
            SELECT i.id, a.room_number, b.name AS building_name, r.full_name AS reporter_name,
                   i.title, i.description, i.status, i.type, i.created_at
            FROM issues i
            JOIN apartments a ON a.id = i.apartment_id
            JOIN buildings b ON b.id = a.building_id
            JOIN residents r ON r.id = i.reporter_id
            WHERE ($1::issue_status IS NULL OR i.status = $1)
            ORDER BY i.created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn get_issue(&self, id: Uuid) -> sqlx::Result<Issue> {
        sqlx::query_as::<_, Issue>("SELECT * FROM issues WHERE id = $1")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    /// Move a ticket from `from` to `to`; false if someone else moved it first
    pub async fn update_issue_status(
        &self,
        id: Uuid,
        from: IssueStatus,
        to: IssueStatus,
    ) -> sqlx::Result<bool> {
        let result = sqlx::query("UPDATE issues SET status = $1 WHERE id = $2 AND status = $3")
            .bind(to)
            .bind(id)
            .bind(from)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
