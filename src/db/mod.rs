mod accounting;
mod announcements;
mod apartments;
mod buildings;
mod extra_fees;
mod issues;
mod notifications;
mod residents;
mod usage;
mod users;

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

pub use accounting::{DashboardTotals, DueInvoice, PaymentInput};
pub use extra_fees::NewExtraFee;
pub use notifications::{NewNotification, NotificationFilter};
pub use residents::{Identity, RecipientTarget, ResidentInput};

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Head counts shown on the board's landing page
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub resident_count: i64,
    pub apartment_count: i64,
    pub building_count: i64,
    pub open_issue_count: i64,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(config.database_url())
            .await?;

        Ok(Self { pool })
    }

    /// Pool that connects on first use, for wiring routes without a server
    #[cfg(test)]
    pub fn lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(database_url)?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `migrations/`
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(self.get_pool()).await?;
        Ok(())
    }

    pub async fn overview(&self) -> sqlx::Result<Overview> {
        sqlx::query_as::<_, Overview>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM residents WHERE status <> 'INACTIVE') AS resident_count,
                (SELECT COUNT(*) FROM apartments) AS apartment_count,
                (SELECT COUNT(*) FROM buildings) AS building_count,
                (SELECT COUNT(*) FROM issues WHERE status <> 'PROCESSED') AS open_issue_count
            "#,
        )
        .fetch_one(self.get_pool())
        .await
    }
}

/// Initialize the database connection pool
pub async fn init(config: &Config) -> Result<Database> {
    let db = Database::new(config).await?;

    // Keep the schema current on every start
    db.migrate().await?;

    Ok(db)
}

/// `%keyword%` for ILIKE, or `None` for a blank keyword
pub(crate) fn like_pattern(keyword: Option<&str>) -> Option<String> {
    keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| format!("%{}%", k.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(Some(" tower ")), Some("%tower%".to_string()));
        assert_eq!(like_pattern(Some("50%_a")), Some("%50\\%\\_a%".to_string()));
    }
}
