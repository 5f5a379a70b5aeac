use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "service_code", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCode {
    Electricity,
    Water,
    Management,
    Parking,
}

impl ServiceCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCode::Electricity => "ELECTRICITY",
            ServiceCode::Water => "WATER",
            ServiceCode::Management => "MANAGEMENT",
            ServiceCode::Parking => "PARKING",
        }
    }

    /// Human readable name printed on invoices
    pub fn label(self) -> &'static str {
        match self {
            ServiceCode::Electricity => "Điện",
            ServiceCode::Water => "Nước",
            ServiceCode::Management => "Phí quản lý",
            ServiceCode::Parking => "Phí gửi xe",
        }
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "price_model", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceModel {
    Flat,
    Tiered,
    PerArea,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrice {
    pub id: Uuid,
    pub service_type_id: Uuid,
    pub code: ServiceCode,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub model: PriceModel,
    #[sqlx(skip)]
    pub tiers: Vec<PriceTier>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    pub id: Uuid,
    pub service_price_id: Uuid,
    pub code: Option<String>,
    pub min_usage: i32,
    pub max_usage: Option<i32>,
    pub unit_price: i64,
}
