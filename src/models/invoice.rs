use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Unpaid,
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub status: InvoiceStatus,
    pub created_date: NaiveDate,
    pub overdue_date: Option<NaiveDate>,
    pub paid_at: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub apartment_label: String,
    pub month: i32,
    pub year: i32,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub status: InvoiceStatus,
    pub payment_date: Option<NaiveDateTime>,
    pub created_time: NaiveDate,
    pub overdue_date: Option<NaiveDate>,
}

/// One priced slice of a detail row, e.g. a consumption tier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub service_type_id: Option<Uuid>,
    pub extra_fee_id: Option<Uuid>,
    pub quantity: f64,
    pub unit_price: i64,
    pub amount: i64,
    pub old_index: Option<f64>,
    pub new_index: Option<f64>,
    pub description: String,
    pub line_items: Json<Vec<LineItem>>,
}

/// Flattened row for the monthly spreadsheet export.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct InvoiceExportRow {
    pub building_name: String,
    pub room_number: i32,
    pub owner_name: Option<String>,
    pub month: i32,
    pub year: i32,
    pub total_amount: i64,
    pub status: InvoiceStatus,
    pub paid_at: Option<NaiveDateTime>,
}
