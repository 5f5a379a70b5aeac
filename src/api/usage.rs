use axum::{
    Router,
    extract::{Multipart, State, multipart::MultipartRejection},
    routing::post,
};
use serde::Serialize;

use super::{ApiResponse, AppJson, AppQuery, AppState, JsonResult, PeriodQuery};
use crate::auth::CurrentUser;
use crate::billing::{self, usage_import::{self, UsageImportRow}};
use crate::error::{ApiError, ApiResult};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/accounting/usage-import/preview", post(preview_import))
        .route("/api/v1/accounting/usage-import/save", post(save_import))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveResult {
    saved: usize,
    rejected: usize,
}

/// Bytes of the `file` part of a multipart upload
async fn read_upload(multipart: &mut Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Spreadsheet(e.to_string()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Spreadsheet(e.to_string()))?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::validation("File can not be null!"))
}

/// Parse and check an uploaded reading sheet without storing anything
async fn preview_import(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(period): AppQuery<PeriodQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> JsonResult<Vec<UsageImportRow>> {
    user.require_accounting()?;
    let (month, year) = period.required()?;

    let mut multipart = multipart?;
    let bytes = read_upload(&mut multipart).await?;
    let rows = usage_import::read_sheet(&bytes)?;

    let apartments = state.db.apartment_keys().await?;
    let (last_month, last_year) = billing::previous_period(month, year);
    let history = state.db.usage_history(last_month, last_year).await?;
    let previous = usage_import::previous_readings(&history);

    let checked = usage_import::validate(rows, &apartments, &previous);
    let invalid = checked.iter().filter(|row| !row.is_valid).count();
    tracing::info!(month, year, rows = checked.len(), invalid, "usage sheet previewed");

    Ok(ApiResponse::ok(
        format!("{} rows read, {} invalid", checked.len(), invalid),
        checked,
    ))
}

/// Store the valid rows of a previewed sheet
async fn save_import(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(period): AppQuery<PeriodQuery>,
    AppJson(rows): AppJson<Vec<UsageImportRow>>,
) -> JsonResult<SaveResult> {
    user.require_accounting()?;
    let (month, year) = period.required()?;

    let apartments = state.db.apartment_keys().await?;
    let (last_month, last_year) = billing::previous_period(month, year);
    let history = state.db.usage_history(last_month, last_year).await?;
    let previous = usage_import::previous_readings(&history);

    let checked = usage_import::recheck(&rows, &apartments, &previous);
    let upserts = usage_import::prepare_save(&checked, &apartments);
    let saved = state.db.save_usages(&upserts, month, year).await?;

    let result = SaveResult {
        saved,
        rejected: rows.len() - upserts.len(),
    };
    tracing::info!(month, year, saved = result.saved, rejected = result.rejected, "usage readings saved");

    Ok(ApiResponse::ok(format!("Saved {} readings", saved), result))
}

#[cfg(test)]
mod tests {
    use crate::api::tests::{send, test_state, token_for};
    use crate::models::UserRole;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn save_needs_a_period() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/v1/accounting/usage-import/save?year=2024",
            Some(&token),
            Some(json!([])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn residents_can_not_import_readings() {
        let state = test_state();
        let token = token_for(&state, UserRole::Resident, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/v1/accounting/usage-import/save?month=1&year=2024",
            Some(&token),
            Some(json!([])),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
