use axum::{
    Router,
    extract::State,
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppQuery, AppState, JsonResult, KeywordQuery, required_text};
use crate::auth::CurrentUser;
use crate::db::NewExtraFee;
use crate::error::{ApiError, ApiResult};
use crate::models::{ExtraFee, ExtraFeeSummary};
use crate::vnd;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/extrafee", get(search_extra_fees).post(create_extra_fee))
        .route("/api/v1/extrafee/:id", get(extra_fee_detail))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtraFeeRequest {
    apartment_id: Option<Uuid>,
    title: Option<String>,
    description: Option<String>,
    quantity: Option<f64>,
    unit_price: Option<i64>,
    is_billed: Option<bool>,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

fn required<T>(value: Option<T>, field: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::validation(format!("{} can not be null!", field)))
}

impl ExtraFeeRequest {
    fn into_new_fee(self) -> ApiResult<NewExtraFee> {
        let apartment_id = required(self.apartment_id, "Apartment")?;
        let title = required_text(self.title.as_deref(), "Title")?;
        let quantity = required(self.quantity, "Quantity")?;
        let unit_price = required(self.unit_price, "Unit price")?;
        let year = required(self.year, "Year")?;
        let month = required(self.month, "Month")?;
        let day = required(self.day, "Day")?;

        let fee_date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            ApiError::validation(format!("Invalid date: {}/{}/{}", day, month, year))
        })?;
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(ApiError::validation("Quantity can not be negative"));
        }
        if unit_price < 0 {
            return Err(ApiError::validation("Unit price can not be negative"));
        }

        Ok(NewExtraFee {
            apartment_id,
            title,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            quantity,
            unit_price,
            amount: vnd::multiply(quantity, unit_price),
            fee_date,
            is_billed: self.is_billed.unwrap_or(false),
        })
    }
}

/// Fee as shown in the detail dialog, money pre-formatted
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtraFeeView {
    id: Uuid,
    apartment_id: Uuid,
    apartment_label: String,
    title: String,
    description: Option<String>,
    quantity: String,
    unit_price: String,
    amount: String,
    fee_date: NaiveDate,
    is_billed: bool,
    invoice_id: Option<Uuid>,
}

impl From<ExtraFee> for ExtraFeeView {
    fn from(fee: ExtraFee) -> Self {
        ExtraFeeView {
            id: fee.id,
            apartment_id: fee.apartment_id,
            apartment_label: fee.apartment_label,
            title: fee.title,
            description: fee.description,
            quantity: vnd::format_quantity(fee.quantity),
            unit_price: vnd::format(fee.unit_price),
            amount: vnd::format(fee.amount),
            fee_date: fee.fee_date,
            is_billed: fee.is_billed,
            invoice_id: fee.invoice_id,
        }
    }
}

async fn search_extra_fees(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<KeywordQuery>,
) -> JsonResult<Vec<ExtraFeeSummary>> {
    user.require_accounting()?;

    let fees = state.db.search_extra_fees(query.keyword.as_deref()).await?;
    Ok(ApiResponse::ok("Extra fees loaded", fees))
}

async fn extra_fee_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<ExtraFeeView> {
    user.require_accounting()?;

    let fee = state.db.get_extra_fee(id).await?;
    Ok(ApiResponse::ok("Extra fee loaded", ExtraFeeView::from(fee)))
}

async fn create_extra_fee(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<ExtraFeeRequest>,
) -> JsonResult<ExtraFeeView> {
    user.require_accounting()?;
    let fee = body.into_new_fee()?;

    if state.db.find_apartment(fee.apartment_id).await?.is_none() {
        return Err(ApiError::not_found("Apartment not found"));
    }

    let id = state.db.create_extra_fee(&fee).await?;
    tracing::info!(fee = %id, amount = fee.amount, "extra fee created");

    let created = state.db.get_extra_fee(id).await?;
    Ok(ApiResponse::ok("Extra fee created", ExtraFeeView::from(created)))
}
