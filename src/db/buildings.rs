use uuid::Uuid;

use super::{Database, like_pattern};
use crate::models::{Building, Dropdown};

impl Database {
    pub async fn list_buildings(&self) -> sqlx::Result<Vec<Building>> {
        sqlx::query_as::<_, Building>("SELECT * FROM buildings ORDER BY name ASC")
            .fetch_all(self.get_pool())
            .await
    }

    pub async fn building_dropdown(&self, keyword: Option<&str>) -> sqlx::Result<Vec<Dropdown>> {
        sqlx::query_as::<_, Dropdown>(
            r#"
            SELECT id, name AS label FROM buildings
            WHERE ($1::text IS NULL OR name ILIKE $1)
            ORDER BY name ASC
            "#,
        )
        .bind(like_pattern(keyword))
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn building_name_exists(&self, name: &str) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM buildings WHERE LOWER(name) = LOWER($1))",
        )
        .bind(name)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn create_building(&self, name: &str) -> sqlx::Result<Building> {
        sqlx::query_as::<_, Building>(
            "INSERT INTO buildings (id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn building_exists(&self, id: Uuid) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM buildings WHERE id = $1)")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    pub async fn count_apartments_in_building(&self, id: Uuid) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM apartments WHERE building_id = $1")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    /// Returns false when nothing was deleted
    pub async fn delete_building(&self, id: Uuid) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM buildings WHERE id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
