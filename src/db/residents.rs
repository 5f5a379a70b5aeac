use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::{Database, like_pattern};
use crate::models::{Dropdown, Resident, ResidentRelationship, ResidentStatus, ResidentSummary};

const RESIDENT_SELECT: &str = r#"
    SELECT r.id, r.full_name, r.id_card, r.email, r.phone, r.dob, r.home_town,
           r.relationship, r.status, r.apartment_id, r.user_id,
           a.room_number, b.name AS building_name
    FROM residents r
    LEFT JOIN apartments a ON a.id = r.apartment_id
    LEFT JOIN buildings b ON b.id = a.building_id
"#;

const SUMMARY_SELECT: &str = r#"
    SELECT r.id, r.full_name, r.email, r.phone, a.room_number, b.name AS building_name, r.status
    FROM residents r
    LEFT JOIN apartments a ON a.id = r.apartment_id
    LEFT JOIN buildings b ON b.id = a.building_id
"#;

/// Fields accepted when creating or editing a resident
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentInput {
    pub full_name: String,
    pub id_card: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<NaiveDate>,
    pub home_town: Option<String>,
    pub relationship: Option<ResidentRelationship>,
    pub status: Option<ResidentStatus>,
    pub apartment_id: Option<Uuid>,
}

/// Unique personal identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    IdCard,
    Email,
    Phone,
}

impl Identity {
    fn column(self) -> &'static str {
        match self {
            Identity::IdCard => "id_card",
            Identity::Email => "email",
            Identity::Phone => "phone",
        }
    }

    /// Message reported when `value` already belongs to someone else
    pub fn taken_message(self, value: &str) -> String {
        match self {
            Identity::IdCard => format!("ID Card exists: {}", value),
            Identity::Email => format!("Email exists: {}", value),
            Identity::Phone => format!("Phone exists: {}", value),
        }
    }
}

/// Who receives an announcement or notification
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientTarget {
    All,
    Building(Uuid),
    Floor { building_id: Uuid, floor: i32 },
    Apartment(Uuid),
    Residents(Vec<Uuid>),
}

impl Database {
    pub async fn search_residents(
        &self,
        keyword: Option<&str>,
        include_inactive: bool,
    ) -> sqlx::Result<Vec<ResidentSummary>> {
        sqlx::query_as::<_, ResidentSummary>(&format!(
            r#"{}
            WHERE ($1::text IS NULL
                   OR r.full_name ILIKE $1 OR r.email ILIKE $1 OR r.phone ILIKE $1
                   OR r.id_card ILIKE $1 OR b.name ILIKE $1 OR a.room_number::text ILIKE $1)
              AND ($2 OR r.status <> 'INACTIVE')
            ORDER BY r.full_name ASC
            "#,
            SUMMARY_SELECT
        ))
        .bind(like_pattern(keyword))
        .bind(include_inactive)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn resident_dropdown(&self, keyword: &str) -> sqlx::Result<Vec<Dropdown>> {
        sqlx::query_as::<_, Dropdown>(
            r#"
            SELECT r.id,
                   r.full_name || COALESCE(' (' || a.room_number::text || ' - ' || b.name || ')', '') AS label
            FROM residents r
            LEFT JOIN apartments a ON a.id = r.apartment_id
            LEFT JOIN buildings b ON b.id = a.building_id
            WHERE r.status <> 'INACTIVE'
              AND (r.full_name ILIKE $1 OR r.phone ILIKE $1 OR r.id_card ILIKE $1)
            ORDER BY r.full_name ASC
            LIMIT 20
            "#,
        )
        .bind(like_pattern(Some(keyword)))
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn get_resident(&self, id: Uuid) -> sqlx::Result<Resident> {
        sqlx::query_as::<_, Resident>(&format!("{} WHERE r.id = $1", RESIDENT_SELECT))
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    pub async fn find_resident(&self, id: Uuid) -> sqlx::Result<Option<Resident>> {
        sqlx::query_as::<_, Resident>(&format!("{} WHERE r.id = $1", RESIDENT_SELECT))
            .bind(id)
            .fetch_optional(self.get_pool())
            .await
    }

    pub async fn residents_of_apartment(&self, apartment_id: Uuid) -> sqlx::Result<Vec<ResidentSummary>> {
        sqlx::query_as::<_, ResidentSummary>(&format!(
            "{} WHERE r.apartment_id = $1 AND r.status <> 'INACTIVE' ORDER BY r.full_name ASC",
            SUMMARY_SELECT
        ))
        .bind(apartment_id)
        .fetch_all(self.get_pool())
        .await
    }

    /// Whether `value` is used by a resident other than `exclude`
    pub async fn identity_taken(
        &self,
        identity: Identity,
        value: &str,
        exclude: Option<Uuid>,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS (SELECT 1 FROM residents WHERE {} = $1 AND ($2::uuid IS NULL OR id <> $2))",
            identity.column()
        ))
        .bind(value)
        .bind(exclude)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn create_resident(&self, input: &ResidentInput) -> sqlx::Result<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO residents
                (id, full_name, id_card, email, phone, dob, home_town, relationship, status, apartment_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.full_name.trim())
        .bind(&input.id_card)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(input.dob)
        .bind(&input.home_town)
        .bind(input.relationship)
        .bind(input.status.unwrap_or(ResidentStatus::Active))
        .bind(input.apartment_id)
        .fetch_one(self.get_pool())
        .await
    }

    /// Edit a resident; moving them out of an apartment they own clears that ownership
    pub async fn update_resident(
        &self,
        id: Uuid,
        input: &ResidentInput,
        status: ResidentStatus,
    ) -> sqlx::Result<()> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        let previous = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT apartment_id FROM residents WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(apartment_id) = vacated_apartment(previous, input.apartment_id) {
            sqlx::query("UPDATE apartments SET owner_id = NULL WHERE id = $1 AND owner_id = $2")
                .bind(apartment_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE residents
            SET full_name = $1, id_card = $2, email = $3, phone = $4, dob = $5,
                home_town = $6, relationship = $7, status = $8, apartment_id = $9
            WHERE id = $10
            "#,
        )
        .bind(input.full_name.trim())
        .bind(&input.id_card)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(input.dob)
        .bind(&input.home_town)
        .bind(input.relationship)
        .bind(status)
        .bind(input.apartment_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Commit the transaction
        tx.commit().await?;

        Ok(())
    }

    /// Mark a resident as moved out: detached from the apartment and no longer owner
    pub async fn deactivate_resident(&self, id: Uuid) -> sqlx::Result<()> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        sqlx::query("UPDATE apartments SET owner_id = NULL WHERE owner_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE residents SET status = 'INACTIVE', apartment_id = NULL WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Commit the transaction
        tx.commit().await?;

        Ok(())
    }

    pub async fn delete_resident(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM residents WHERE id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Distinct non-inactive residents selected by `target`
    pub async fn recipients(&self, target: &RecipientTarget) -> sqlx::Result<Vec<Uuid>> {
        let base = r#"
            SELECT DISTINCT r.id FROM residents r
            LEFT JOIN apartments a ON a.id = r.apartment_id
            WHERE r.status <> 'INACTIVE'
        "#;

        let query = match target {
            RecipientTarget::All => sqlx::query_scalar::<_, Uuid>(base),
            RecipientTarget::Building(building_id) => {
                let sql: &'static str = concat!(
                    "SELECT DISTINCT r.id FROM residents r ",
                    "JOIN apartments a ON a.id = r.apartment_id ",
                    "WHERE r.status <> 'INACTIVE' AND a.building_id = $1"
                );
                sqlx::query_scalar::<_, Uuid>(sql).bind(*building_id)
            }
            RecipientTarget::Floor { building_id, floor } => {
                let sql: &'static str = concat!(
                    "SELECT DISTINCT r.id FROM residents r ",
                    "JOIN apartments a ON a.id = r.apartment_id ",
                    "WHERE r.status <> 'INACTIVE' AND a.building_id = $1 AND a.floor = $2"
                );
                sqlx::query_scalar::<_, Uuid>(sql).bind(*building_id).bind(*floor)
            }
            RecipientTarget::Apartment(apartment_id) => {
                let sql: &'static str = concat!(
                    "SELECT DISTINCT r.id FROM residents r ",
                    "WHERE r.status <> 'INACTIVE' AND r.apartment_id = $1"
                );
                sqlx::query_scalar::<_, Uuid>(sql).bind(*apartment_id)
            }
            RecipientTarget::Residents(ids) => {
                let sql: &'static str = concat!(
                    "SELECT DISTINCT r.id FROM residents r ",
                    "WHERE r.status <> 'INACTIVE' AND r.id = ANY($1)"
                );
                sqlx::query_scalar::<_, Uuid>(sql).bind(ids.clone())
            }
        };

        query.fetch_all(self.get_pool()).await
    }
}

/// Apartment the resident leaves when `previous` becomes `next`
fn vacated_apartment(previous: Option<Uuid>, next: Option<Uuid>) -> Option<Uuid> {
    previous.filter(|old| next != Some(*old))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_out_vacates_the_old_apartment() {
        let old = Uuid::from_u128(1);
        let new = Uuid::from_u128(2);

        assert_eq!(vacated_apartment(Some(old), Some(new)), Some(old));
        assert_eq!(vacated_apartment(Some(old), None), Some(old));
        assert_eq!(vacated_apartment(Some(old), Some(old)), None);
        assert_eq!(vacated_apartment(None, Some(new)), None);
    }

    #[test]
    fn identity_messages_name_the_value() {
        assert_eq!(Identity::IdCard.taken_message("0123"), "ID Card exists: 0123");
        assert_eq!(Identity::Email.taken_message("a@b.vn"), "Email exists: a@b.vn");
        assert_eq!(Identity::Phone.taken_message("0901"), "Phone exists: 0901");
    }

    #[test]
    fn resident_input_reads_camel_case() {
        let input: ResidentInput = serde_json::from_value(serde_json::json!({
            "fullName": "Nguyễn Văn A",
            "idCard": "001099000001",
            "status": "TEMPORARY",
            "relationship": "OWNER"
        }))
        .unwrap();

        assert_eq!(input.full_name, "Nguyễn Văn A");
        assert_eq!(input.id_card.as_deref(), Some("001099000001"));
        assert_eq!(input.status, Some(ResidentStatus::Temporary));
        assert_eq!(input.relationship, Some(ResidentRelationship::Owner));
        assert!(input.apartment_id.is_none());
    }
}
