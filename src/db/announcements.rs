use uuid::Uuid;

use super::Database;
use super::notifications::{NewNotification, insert_notification};
use crate::models::{Announcement, AnnouncementRecipient, NotificationType, ResidentAnnouncement};

impl Database {
    /// Store an announcement, its recipients and one notification each.
    ///
    /// Returns the announcement id and the ids of the notifications created.
    pub async fn create_announcement(
        &self,
        sender_id: Uuid,
        title: &str,
        message: &str,
        recipients: &[Uuid],
    ) -> sqlx::Result<(Uuid, Vec<Uuid>)> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        let announcement_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO announcements (id, title, message, sender_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(message)
        .bind(sender_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO resident_announcements (resident_id, announcement_id)
            SELECT UNNEST($1::uuid[]), $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(recipients.to_vec())
        .bind(announcement_id)
        .execute(&mut *tx)
        .await?;

        let mut notification_ids = Vec::with_capacity(recipients.len());
        for &recipient_id in recipients {
            let item = NewNotification {
                recipient_id,
                title: title.to_string(),
                message: message.to_string(),
                notification_type: NotificationType::GeneralAnnouncement,
                reference_id: Some(announcement_id),
                reference_type: Some("ANNOUNCEMENT".to_string()),
            };
            notification_ids.push(insert_notification(&mut tx, &item).await?);
        }

        // Commit the transaction
        tx.commit().await?;

        Ok((announcement_id, notification_ids))
    }

    /// Newest first
    pub async fn list_announcements(&self) -> sqlx::Result<Vec<Announcement>> {
        sqlx::query_as::<_, Announcement>(
            r#"
            SELECT an.id, an.title, an.message, an.sender_id, u.username AS sender_name, an.created_at,
                   (SELECT COUNT(*) FROM resident_announcements ra WHERE ra.announcement_id = an.id) AS receiver_count
            FROM announcements an
            JOIN users u ON u.id = an.sender_id
            ORDER BY an.created_at DESC
            "#,
        )
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn announcement_exists(&self, id: Uuid) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM announcements WHERE id = $1)")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    pub async fn announcement_recipients(&self, id: Uuid) -> sqlx::Result<Vec<AnnouncementRecipient>> {
        sqlx::query_as::<_, AnnouncementRecipient>(
            r#"
            SELECT r.id AS resident_id, r.full_name AS resident_name, a.room_number,
                   b.name AS building_name, ra.is_read
            FROM resident_announcements ra
            JOIN residents r ON r.id = ra.resident_id
            LEFT JOIN apartments a ON a.id = r.apartment_id
            LEFT JOIN buildings b ON b.id = a.building_id
            WHERE ra.announcement_id = $1
            ORDER BY b.name ASC, a.room_number ASC, r.full_name ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn announcements_for_resident(&self, resident_id: Uuid) -> sqlx::Result<Vec<ResidentAnnouncement>> {
        sqlx::query_as::<_, ResidentAnnouncement>(
            r#"
            SELECT an.id, an.title, an.message, u.username AS sender_name, an.created_at, ra.is_read
            FROM resident_announcements ra
            JOIN announcements an ON an.id = ra.announcement_id
            JOIN users u ON u.id = an.sender_id
            WHERE ra.resident_id = $1
            ORDER BY an.created_at DESC
            "#,
        )
        .bind(resident_id)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn mark_announcement_read(&self, id: Uuid, resident_id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE resident_announcements SET is_read = TRUE WHERE announcement_id = $1 AND resident_id = $2",
        )
        .bind(id)
        .bind(resident_id)
        .execute(self.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
