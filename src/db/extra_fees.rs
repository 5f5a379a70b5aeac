use chrono::NaiveDate;
use uuid::Uuid;

use super::{Database, like_pattern};
use crate::models::{ExtraFee, ExtraFeeSummary};

const FEE_SELECT: &str = r#"
    SELECT f.id, f.apartment_id, f.title, f.description, f.quantity, f.unit_price,
           f.amount, f.fee_date, f.is_billed, f.invoice_id,
           a.room_number::text || ' - ' || b.name AS apartment_label
    FROM extra_fees f
    JOIN apartments a ON a.id = f.apartment_id
    JOIN buildings b ON b.id = a.building_id
"#;

/// Validated values of a new extra fee
#[derive(Debug, Clone, PartialEq)]
pub struct NewExtraFee {
    pub apartment_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
    pub fee_date: NaiveDate,
    pub is_billed: bool,
}

impl Database {
    pub async fn get_extra_fee(&self, id: Uuid) -> sqlx::Result<ExtraFee> {
        sqlx::query_as::<_, ExtraFee>(&format!("{} WHERE f.id = $1", FEE_SELECT))
            .bind(id)
            .fetch_one(self.get_pool())
            .await
    }

    pub async fn search_extra_fees(&self, keyword: Option<&str>) -> sqlx::Result<Vec<ExtraFeeSummary>> {
        sqlx::query_as::<_, ExtraFeeSummary>(
            r#"
            SELECT f.id, f.title, f.amount, f.fee_date, f.is_billed,
                   a.room_number::text || ' - ' || b.name AS apartment_label
            FROM extra_fees f
            JOIN apartments a ON a.id = f.apartment_id
            JOIN buildings b ON b.id = a.building_id
            WHERE ($1::text IS NULL
                   OR f.title ILIKE $1 OR f.description ILIKE $1
                   OR a.room_number::text ILIKE $1 OR b.name ILIKE $1)
            ORDER BY f.fee_date DESC, f.title ASC
            "#,
        )
        .bind(like_pattern(keyword))
        .fetch_all(self.get_pool())
        .await
    }

    pub async fn create_extra_fee(&self, fee: &NewExtraFee) -> sqlx::Result<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO extra_fees
                (id, apartment_id, title, description, quantity, unit_price, amount, fee_date, is_billed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(fee.apartment_id)
        .bind(&fee.title)
        .bind(&fee.description)
        .bind(fee.quantity)
        .bind(fee.unit_price)
        .bind(fee.amount)
        .bind(fee.fee_date)
        .bind(fee.is_billed)
        .fetch_one(self.get_pool())
        .await
    }
}
