use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtraFee {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
    pub fee_date: NaiveDate,
    pub is_billed: bool,
    pub invoice_id: Option<Uuid>,
    pub apartment_label: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtraFeeSummary {
    pub id: Uuid,
    pub title: String,
    pub amount: i64,
    pub fee_date: NaiveDate,
    pub is_billed: bool,
    pub apartment_label: String,
}
