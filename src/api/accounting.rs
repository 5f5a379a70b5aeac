use axum::{
    Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppQuery, AppState, JsonResult, PeriodQuery, own_apartment};
use crate::auth::CurrentUser;
use crate::billing::{self, BillingError, MonthlyRevenue, PaymentOutcome};
use crate::db::{DashboardTotals, PaymentInput};
use crate::error::{ApiError, ApiResult};
use crate::invoice_gen;
use crate::models::{Invoice, InvoiceDetail, InvoiceSummary, PaymentTransaction, UserRole};

/// Width of `payment_transactions.transaction_code`
const MAX_TRANSACTION_CODE_LEN: usize = 20;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/accounting", get(list_invoices))
        .route("/api/v1/accounting/invoices", get(list_invoices))
        .route("/api/v1/accounting/invoices/export", get(export_invoices))
        .route("/api/v1/accounting/invoices/generation", post(generate_invoices))
        .route("/api/v1/accounting/invoices/:id", get(invoice_detail))
        .route("/api/v1/accounting/invoices/:id/payments", post(record_payment))
        .route("/api/v1/accounting/dashboard", get(dashboard))
        .route("/api/v1/accounting/revenue-chart", get(revenue_chart))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceView {
    #[serde(flatten)]
    invoice: Invoice,
    details: Vec<InvoiceDetail>,
    payments: Vec<PaymentTransaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResult {
    created: usize,
    skipped: usize,
}

#[derive(Debug, Default, Deserialize)]
struct YearQuery {
    year: Option<i32>,
}

fn attachment(content_type: &str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

async fn list_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(period): AppQuery<PeriodQuery>,
) -> JsonResult<Vec<InvoiceSummary>> {
    user.require_accounting()?;

    let invoices = state.db.list_invoices(period.month, period.year).await?;
    Ok(ApiResponse::ok("Invoices loaded", invoices))
}

async fn invoice_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<InvoiceView> {
    let invoice = state.db.get_invoice(id).await?;

    if user.role() == UserRole::Resident {
        if own_apartment(&state, &user).await? != Some(invoice.apartment_id) {
            return Err(ApiError::Forbidden("This invoice belongs to another apartment".to_string()));
        }
    } else {
        user.require_accounting()?;
    }

    let details = state.db.get_invoice_details(id).await?;
    let payments = state.db.payments_for_invoice(id).await?;

    Ok(ApiResponse::ok(
        "Invoice loaded",
        InvoiceView {
            invoice,
            details,
            payments,
        },
    ))
}

async fn generate_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(period): AppQuery<PeriodQuery>,
) -> JsonResult<GenerationResult> {
    user.require_accounting()?;
    let (month, year) = period.required()?;
    let period_end = billing::period_end(month, year)?;

    let prices = state.db.service_prices().await?;
    let usages = state.db.usages_for_period(month, year).await?;
    let fees = state.db.pending_extra_fees(period_end).await?;
    let apartments = state.db.apartments_without_invoice(month, year).await?;

    let today = Local::now().date_naive();
    let overdue_date = billing::due_date(today, state.config.invoice_due_days);

    let mut result = GenerationResult {
        created: 0,
        skipped: 0,
    };
    for apartment in &apartments {
        match billing::draft_invoice(apartment, &usages, &prices, &fees, month, year) {
            Ok(Some(draft)) => {
                if state.db.insert_invoice(&draft, today, overdue_date).await?.is_some() {
                    result.created += 1;
                }
            }
            Ok(None) => result.skipped += 1,
            Err(err) => {
                tracing::warn!(apartment = %apartment.label(), error = %err, "apartment not billed");
                result.skipped += 1;
            }
        }
    }

    tracing::info!(month, year, created = result.created, skipped = result.skipped, "invoices generated");

    Ok(ApiResponse::ok(
        format!("Generated {} invoices for {}/{}", result.created, month, year),
        result,
    ))
}

async fn record_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<PaymentInput>,
) -> JsonResult<PaymentOutcome> {
    user.require_accounting()?;
    if body.amount <= 0 {
        return Err(BillingError::NonPositivePayment.into());
    }
    if let Some(code) = &body.transaction_code {
        if code.chars().count() > MAX_TRANSACTION_CODE_LEN {
            return Err(ApiError::validation(format!(
                "Transaction code can not exceed {} characters",
                MAX_TRANSACTION_CODE_LEN
            )));
        }
    }

    let now = Local::now().naive_local();
    let outcome = state
        .db
        .record_payment(id, &body, &user.session.username, now)
        .await??;

    tracing::info!(
        invoice = %id,
        amount = body.amount,
        status = %outcome.status,
        by = %user.session.username,
        "payment recorded"
    );

    Ok(ApiResponse::ok("Payment recorded", outcome))
}

async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> JsonResult<DashboardTotals> {
    user.require_accounting()?;

    let totals = state.db.dashboard_totals().await?;
    Ok(ApiResponse::ok("Dashboard loaded", totals))
}

async fn revenue_chart(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<YearQuery>,
) -> JsonResult<Vec<MonthlyRevenue>> {
    user.require_accounting()?;

    let year = query.year.unwrap_or_else(|| Local::now().year());
    let rows = state.db.revenue_by_month(year).await?;

    Ok(ApiResponse::ok(
        format!("Revenue of {}", year),
        billing::fill_revenue_year(&rows),
    ))
}

async fn export_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(period): AppQuery<PeriodQuery>,
) -> ApiResult<Response> {
    user.require_accounting()?;

    let rows = state.db.invoice_export_rows(period.month, period.year).await?;
    let sheet = invoice_gen::sheet_name(period.month, period.year);
    let bytes = invoice_gen::invoice_workbook(&rows, &sheet)?;

    tracing::info!(rows = rows.len(), %sheet, "invoices exported");

    let filename = match (period.month, period.year) {
        (Some(month), Some(year)) => format!("invoices_{}_{}.xlsx", month, year),
        (None, Some(year)) => format!("invoices_{}.xlsx", year),
        _ => "invoices.xlsx".to_string(),
    };
    Ok(attachment(XLSX_CONTENT_TYPE, &filename, bytes))
}

pub(super) async fn my_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
) -> JsonResult<Vec<InvoiceSummary>> {
    let invoices = match own_apartment(&state, &user).await? {
        Some(apartment_id) => state.db.invoices_for_apartment(apartment_id).await?,
        None => Vec::new(),
    };
    Ok(ApiResponse::ok("Invoices loaded", invoices))
}

pub(super) async fn export_my_invoices(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Response> {
    let invoices = match own_apartment(&state, &user).await? {
        Some(apartment_id) => state.db.invoices_for_apartment(apartment_id).await?,
        None => Vec::new(),
    };

    let csv = invoice_gen::statement_csv(&invoices);
    Ok(attachment(
        mime::TEXT_CSV_UTF_8.as_ref(),
        "invoices.csv",
        csv.into_bytes(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{body_json, send, test_state, token_for};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn attachments_carry_type_and_filename() {
        let response = attachment(XLSX_CONTENT_TYPE, "invoices_11_2024.xlsx", vec![1, 2, 3]);

        assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"invoices_11_2024.xlsx\""
        );
    }

    #[tokio::test]
    async fn generation_rejects_bad_periods() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/v1/accounting/invoices/generation?month=13&year=2024",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Month must be between 1 and 12");

        let response = send(
            &state,
            Method::POST,
            "/api/v1/accounting/invoices/generation?month=5&year=2019",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn payments_must_be_positive() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(
            &state,
            Method::POST,
            &format!("/api/v1/accounting/invoices/{}/payments", Uuid::new_v4()),
            Some(&token),
            Some(json!({ "amount": 0, "method": "CASH" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Payment amount must be positive");
    }

    #[tokio::test]
    async fn long_transaction_codes_are_rejected() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(
            &state,
            Method::POST,
            &format!("/api/v1/accounting/invoices/{}/payments", Uuid::new_v4()),
            Some(&token),
            Some(json!({
                "amount": 500_000,
                "method": "BANK_TRANSFER",
                "transactionCode": "FT24335123456789012345",
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Transaction code can not exceed 20 characters"
        );
    }

    #[tokio::test]
    async fn residents_can_not_list_all_invoices() {
        let state = test_state();
        let token = token_for(&state, UserRole::Resident, Some(Uuid::new_v4())).await;

        let response = send(&state, Method::GET, "/api/v1/accounting/invoices", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&state, Method::GET, "/api/v1/accounting", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
