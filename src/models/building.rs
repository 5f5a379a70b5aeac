use serde::Serialize;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Building {
    pub id: Uuid,
    pub name: String,
}
