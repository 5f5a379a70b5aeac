use std::collections::HashMap;

use uuid::Uuid;

use super::Database;
use crate::billing::usage_import::UsageUpsert;
use crate::models::{UsageHistory, UsageRecord};

impl Database {
    /// Metered readings of one period, keyed for spreadsheet matching
    pub async fn usage_history(&self, month: u32, year: i32) -> sqlx::Result<Vec<UsageHistory>> {
        sqlx::query_as::<_, UsageHistory>(
            r#"
            SELECT a.room_number, b.name AS building_name, s.code, u.new_index, u.quantity
            FROM usage_records u
            JOIN apartments a ON a.id = u.apartment_id
            JOIN buildings b ON b.id = a.building_id
            JOIN service_types s ON s.id = u.service_type_id
            WHERE u.month = $1 AND u.year = $2 AND s.code IN ('ELECTRICITY', 'WATER')
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn usages_for_period(&self, month: u32, year: i32) -> sqlx::Result<Vec<UsageRecord>> {
        sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT u.id, u.apartment_id, u.service_type_id, s.code, u.month, u.year,
                   u.old_index, u.new_index, u.quantity, u.reading_date
            FROM usage_records u
            JOIN service_types s ON s.id = u.service_type_id
            WHERE u.month = $1 AND u.year = $2
            "#,
        )
        .bind(month as i32)
        .bind(year)
        .fetch_all(self.get_pool())
        .await
    }

    /// Apartment ids keyed by `ROOM_BUILDING`
    pub async fn apartment_keys(&self) -> sqlx::Result<HashMap<String, Uuid>> {
        let apartments = self.all_apartments().await?;

        let mut keys = HashMap::with_capacity(apartments.len());
        for apartment in apartments {
            keys.entry(apartment.import_key()).or_insert(apartment.id);
        }
        Ok(keys)
    }

    /// Insert or replace readings of the period; returns how many were written
    pub async fn save_usages(&self, rows: &[UsageUpsert], month: u32, year: i32) -> sqlx::Result<usize> {
        // Start a transaction
        let mut tx = self.get_pool().begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO usage_records
                    (id, apartment_id, service_type_id, month, year, old_index, new_index, quantity)
                VALUES ($1, $2, (SELECT id FROM service_types WHERE code = $3), $4, $5, $6, $7, $8)
                ON CONFLICT (apartment_id, service_type_id, month, year) DO UPDATE
                SET old_index = EXCLUDED.old_index,
                    new_index = EXCLUDED.new_index,
                    quantity = EXCLUDED.quantity,
                    reading_date = NOW()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(row.apartment_id)
            .bind(row.code)
            .bind(month as i32)
            .bind(year)
            .bind(row.old_index)
            .bind(row.new_index)
            .bind(row.quantity)
            .execute(&mut *tx)
            .await?;
        }

        // Commit the transaction
        tx.commit().await?;

        Ok(rows.len())
    }
}
