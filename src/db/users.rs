use uuid::Uuid;

use super::Database;
use crate::models::{User, UserRole};

impl Database {
    /// Look a user up by username or e-mail
    pub async fn find_user_by_login(&self, login: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 OR LOWER(email) = LOWER($1)",
        )
        .bind(login.trim())
        .fetch_optional(self.get_pool())
        .await
    }

    pub async fn get_user(&self, id: Uuid) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        phone: &str,
        password_hash: &str,
        role: UserRole,
    ) -> sqlx::Result<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (id, username, email, phone, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(phone)
        .bind(password_hash)
        .bind(role)
        .fetch_one(self.get_pool())
        .await
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    /// Whether a login with this username, e-mail or phone already exists
    pub async fn user_exists(&self, username: &str, email: &str, phone: &str) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE username = $1 OR LOWER(email) = LOWER($2) OR phone = $3
            )
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(phone)
        .fetch_one(self.get_pool())
        .await
    }

    /// Resident profile linked to a login, if any
    pub async fn resident_id_for_user(&self, user_id: Uuid) -> sqlx::Result<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM residents WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.get_pool())
            .await
    }

    /// Create a login and link it to a resident in one go
    pub async fn create_resident_account(
        &self,
        resident_id: Uuid,
        username: &str,
        email: &str,
        phone: &str,
        password_hash: &str,
    ) -> sqlx::Result<Uuid> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (id, username, email, phone, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, 'RESIDENT')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(phone)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE residents SET user_id = $1 WHERE id = $2")
            .bind(user_id)
            .bind(resident_id)
            .execute(&mut *tx)
            .await?;

        // Commit the transaction
        tx.commit().await?;

        Ok(user_id)
    }
}
