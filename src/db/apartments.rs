use uuid::Uuid;

use super::{Database, like_pattern};
use crate::models::{Apartment, ApartmentSummary, ApartmentWithBuilding, Dropdown};

const APARTMENT_WITH_BUILDING: &str = r#"
    SELECT a.id, a.room_number, a.floor, a.area, a.building_id, b.name AS building_name, a.owner_id
    FROM apartments a
    JOIN buildings b ON b.id = a.building_id
"#;

impl Database {
    pub async fn search_apartments(
        &self,
        keyword: Option<&str>,
        building_id: Option<Uuid>,
        floor: Option<i32>,
    ) -> sqlx::Result<Vec<ApartmentSummary>> {
        sqlx::query_as::<_, ApartmentSummary>(
            r#"
            SELECT
                a.id,
                a.room_number::text || ' - ' || b.name AS label,
                a.floor,
                a.area,
                b.name AS building_name,
                o.full_name AS owner_name,
                (SELECT COUNT(*) FROM residents r
                 WHERE r.apartment_id = a.id AND r.status <> 'INACTIVE') AS resident_number
            FROM apartments a
            JOIN buildings b ON b.id = a.building_id
            LEFT JOIN residents o ON o.id = a.owner_id
            WHERE ($1::text IS NULL OR a.room_number::text ILIKE $1 OR b.name ILIKE $1)
              AND ($2::uuid IS NULL OR a.building_id = $2)
              AND ($3::int IS NULL OR a.floor = $3)
            ORDER BY b.name ASC, a.room_number ASC
            "#,
        )
        .bind(like_pattern(keyword))
        .bind(building_id)
        .bind(floor)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn apartment_dropdown(&self, keyword: Option<&str>) -> sqlx::Result<Vec<Dropdown>> {
        sqlx::query_as::<_, Dropdown>(
            r#"
            SELECT a.id, a.room_number::text || ' - ' || b.name AS label
            FROM apartments a
            JOIN buildings b ON b.id = a.building_id
            WHERE ($1::text IS NULL OR a.room_number::text ILIKE $1 OR b.name ILIKE $1)
            ORDER BY b.name ASC, a.room_number ASC
            LIMIT 50
            "#,
        )
        .bind(like_pattern(keyword))
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn find_apartment(&self, id: Uuid) -> sqlx::Result<Option<ApartmentWithBuilding>> {
        sqlx::query_as::<_, ApartmentWithBuilding>(&format!(
            "{} WHERE a.id = $1",
            APARTMENT_WITH_BUILDING
        ))
        .bind(id)
        .fetch_optional(self.get_pool())
        .await
    }

    pub async fn all_apartments(&self) -> sqlx::Result<Vec<ApartmentWithBuilding>> {
        sqlx::query_as::<_, ApartmentWithBuilding>(&format!(
            "{} ORDER BY b.name ASC, a.room_number ASC",
            APARTMENT_WITH_BUILDING
        ))
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn room_taken(&self, building_id: Uuid, room_number: i32) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM apartments WHERE building_id = $1 AND room_number = $2)",
        )
        .bind(building_id)
        .bind(room_number)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn create_apartment(
        &self,
        room_number: i32,
        floor: i32,
        area: f64,
        building_id: Uuid,
        owner_id: Option<Uuid>,
    ) -> sqlx::Result<Apartment> {
        sqlx::query_as::<_, Apartment>(
            r#"
            INSERT INTO apartments (id, room_number, floor, area, building_id, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_number)
        .bind(floor)
        .bind(area)
        .bind(building_id)
        .bind(owner_id)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn set_apartment_owner(&self, id: Uuid, owner_id: Option<Uuid>) -> sqlx::Result<()> {
        sqlx::query("UPDATE apartments SET owner_id = $1 WHERE id = $2")
            .bind(owner_id)
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    pub async fn count_invoices_for_apartment(&self, id: Uuid) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM invoices WHERE apartment_id = $1")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    /// `(outstanding invoices, open issues)` of one apartment
    pub async fn apartment_counters(&self, id: Uuid) -> sqlx::Result<(i64, i64)> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM invoices
                 WHERE apartment_id = $1 AND status IN ('UNPAID', 'PARTIAL', 'OVERDUE')),
                (SELECT COUNT(*) FROM issues
                 WHERE apartment_id = $1 AND status <> 'PROCESSED')
            "#,
        )
        .bind(id)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn delete_apartment(&self, id: Uuid) -> sqlx::Result<bool> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        sqlx::query("UPDATE residents SET apartment_id = NULL WHERE apartment_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM apartments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Commit the transaction
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}
