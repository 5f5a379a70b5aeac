use axum::{
    Router,
    extract::State,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppQuery, AppState, JsonResult, KeywordQuery, accounting, non_blank};
use crate::auth::{self, CurrentUser};
use crate::db::{Identity, ResidentInput};
use crate::error::{ApiError, ApiResult};
use crate::models::{Dropdown, Resident, ResidentStatus, ResidentSummary, UserRole};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/residents", get(search_residents))
        .route("/api/v1/residents/dropdown", get(resident_dropdown))
        .route("/api/v1/residents/create", post(create_resident))
        .route("/api/v1/residents/me/invoices", get(accounting::my_invoices))
        .route(
            "/api/v1/residents/me/invoices/export.csv",
            get(accounting::export_my_invoices),
        )
        .route(
            "/api/v1/residents/:id",
            get(resident_detail).put(update_resident).delete(delete_resident),
        )
        .route("/api/v1/residents/:id/deactivate", patch(deactivate_resident))
        .route("/api/v1/residents/:id/account", post(create_account))
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    keyword: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Debug, Deserialize)]
struct AccountRequest {
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountCreated {
    user_id: Uuid,
    username: String,
    /// Shown once; only the hash is stored
    password: String,
    mailed: bool,
}

/// 10 or 11 digits
fn valid_phone(phone: &str) -> bool {
    (10..=11).contains(&phone.len()) && phone.chars().all(|c| c.is_ascii_digit())
}

fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}

fn check_contact(email: Option<&str>, phone: Option<&str>) -> ApiResult<()> {
    if let Some(email) = email {
        if !valid_email(email) {
            return Err(ApiError::validation(format!("Invalid email: {}", email)));
        }
    }
    if let Some(phone) = phone {
        if !valid_phone(phone) {
            return Err(ApiError::validation("Phone number must be 10-11 digits"));
        }
    }
    Ok(())
}

/// Trim text fields and turn blanks into `None`
fn normalize(mut input: ResidentInput) -> ApiResult<ResidentInput> {
    let trim = |value: Option<String>| non_blank(value.as_deref()).map(str::to_string);

    input.full_name = non_blank(Some(input.full_name.as_str()))
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation("Full name can not be null!"))?;
    input.id_card = trim(input.id_card);
    input.email = trim(input.email);
    input.phone = trim(input.phone);
    input.home_town = trim(input.home_town);

    if input.status == Some(ResidentStatus::Inactive) {
        return Err(ApiError::validation("Can not change status to INACTIVE"));
    }
    check_contact(input.email.as_deref(), input.phone.as_deref())?;

    Ok(input)
}

/// Reject identifiers already used by another resident, then check the apartment
async fn check_references(state: &AppState, input: &ResidentInput, exclude: Option<Uuid>) -> ApiResult<()> {
    let identities = [
        (Identity::IdCard, input.id_card.as_deref()),
        (Identity::Email, input.email.as_deref()),
        (Identity::Phone, input.phone.as_deref()),
    ];
    for (identity, value) in identities {
        if let Some(value) = value {
            if state.db.identity_taken(identity, value, exclude).await? {
                return Err(ApiError::conflict(identity.taken_message(value)));
            }
        }
    }

    if let Some(apartment_id) = input.apartment_id {
        if state.db.find_apartment(apartment_id).await?.is_none() {
            return Err(ApiError::not_found("Apartment not found"));
        }
    }
    Ok(())
}

async fn search_residents(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<SearchQuery>,
) -> JsonResult<Vec<ResidentSummary>> {
    user.require_accounting()?;

    let residents = state
        .db
        .search_residents(query.keyword.as_deref(), query.include_inactive)
        .await?;
    Ok(ApiResponse::ok("Residents loaded", residents))
}

async fn resident_dropdown(
    State(state): State<AppState>,
    _user: CurrentUser,
    AppQuery(query): AppQuery<KeywordQuery>,
) -> JsonResult<Vec<Dropdown>> {
    let items = match non_blank(query.keyword.as_deref()) {
        Some(keyword) => state.db.resident_dropdown(keyword).await?,
        None => Vec::new(),
    };
    Ok(ApiResponse::ok("Residents loaded", items))
}

async fn resident_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<Resident> {
    if user.role() == UserRole::Resident && user.resident_id()? != id {
        return Err(ApiError::Forbidden("You can only view your own profile".to_string()));
    }

    let resident = state
        .db
        .find_resident(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Resident not found"))?;
    Ok(ApiResponse::ok("Resident loaded", resident))
}

async fn create_resident(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<ResidentInput>,
) -> JsonResult<Resident> {
    user.require_staff()?;
    let input = normalize(body)?;
    check_references(&state, &input, None).await?;

    let id = state.db.create_resident(&input).await?;
    tracing::info!(resident = %id, "resident created");

    let resident = state.db.get_resident(id).await?;
    Ok(ApiResponse::ok("Resident created", resident))
}

async fn update_resident(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<ResidentInput>,
) -> JsonResult<Resident> {
    user.require_staff()?;
    let input = normalize(body)?;

    let existing = state
        .db
        .find_resident(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Resident not found"))?;
    check_references(&state, &input, Some(id)).await?;

    let status = input.status.unwrap_or(existing.status);
    state.db.update_resident(id, &input, status).await?;
    tracing::info!(resident = %id, "resident updated");

    let resident = state.db.get_resident(id).await?;
    Ok(ApiResponse::ok("Resident updated", resident))
}

async fn deactivate_resident(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<()> {
    user.require_staff()?;

    if state.db.find_resident(id).await?.is_none() {
        return Err(ApiError::not_found("Resident not found"));
    }

    state.db.deactivate_resident(id).await?;
    tracing::info!(resident = %id, "resident deactivated");

    Ok(ApiResponse::ok("Resident deactivated", ()))
}

async fn delete_resident(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<()> {
    user.require_staff()?;

    if !state.db.delete_resident(id).await? {
        return Err(ApiError::not_found("Resident not found"));
    }
    tracing::info!(resident = %id, "resident deleted");

    Ok(ApiResponse::ok("Resident deleted", ()))
}

async fn create_account(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<AccountRequest>,
) -> JsonResult<AccountCreated> {
    user.require_staff()?;

    let email = non_blank(body.email.as_deref())
        .ok_or_else(|| ApiError::validation("Email can not be null!"))?;
    let phone = non_blank(body.phone.as_deref())
        .ok_or_else(|| ApiError::validation("Phone can not be null!"))?;
    check_contact(Some(email), Some(phone))?;

    let resident = state
        .db
        .find_resident(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Resident not found"))?;
    if resident.user_id.is_some() {
        return Err(ApiError::conflict("Resident already has an account"));
    }

    let username = auth::generate_username();
    if state.db.user_exists(&username, email, phone).await? {
        return Err(ApiError::conflict("Email or phone is already used by another account"));
    }

    let password = auth::generate_password();
    let hash = auth::hash_password(&password)?;
    let user_id = state
        .db
        .create_resident_account(resident.id, &username, email, phone, &hash)
        .await?;
    tracing::info!(resident = %resident.id, %username, "resident account created");

    // The account stands even if the mail does not go out
    let mailed = state.mailer.is_enabled()
        && match state
            .mailer
            .send_credentials(email, &resident.full_name, &username, &password)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = ?err, %email, "could not mail account credentials");
                false
            }
        };

    Ok(ApiResponse::ok(
        "Account created",
        AccountCreated {
            user_id,
            username,
            password,
            mailed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{body_json, send, test_state, token_for};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn input() -> ResidentInput {
        ResidentInput {
            full_name: "  Nguyễn Văn A ".to_string(),
            id_card: Some(" ".to_string()),
            email: Some("a@example.com".to_string()),
            phone: Some("0912345678".to_string()),
            dob: None,
            home_town: None,
            relationship: None,
            status: None,
            apartment_id: None,
        }
    }

    #[test]
    fn phone_numbers_have_ten_or_eleven_digits() {
        assert!(valid_phone("0912345678"));
        assert!(valid_phone("09123456789"));
        assert!(!valid_phone("091234567"));
        assert!(!valid_phone("091234567890"));
        assert!(!valid_phone("09123-4567"));
    }

    #[test]
    fn emails_need_an_at_sign() {
        assert!(valid_email("a@b.vn"));
        assert!(!valid_email("ab.vn"));
        assert!(!valid_email("@b.vn"));
        assert!(!valid_email("a@"));
    }

    #[test]
    fn normalize_trims_and_drops_blanks() {
        let normalized = normalize(input()).unwrap();
        assert_eq!(normalized.full_name, "Nguyễn Văn A");
        assert_eq!(normalized.id_card, None);
        assert_eq!(normalized.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn inactive_status_can_not_be_set_directly() {
        let mut body = input();
        body.status = Some(ResidentStatus::Inactive);
        let err = normalize(body).unwrap_err();
        assert_eq!(err.to_string(), "Can not change status to INACTIVE");
    }

    #[test]
    fn bad_contact_details_are_rejected() {
        let mut body = input();
        body.phone = Some("12345".to_string());
        assert_eq!(
            normalize(body).unwrap_err().to_string(),
            "Phone number must be 10-11 digits"
        );

        let mut body = input();
        body.full_name = " ".to_string();
        assert_eq!(normalize(body).unwrap_err().to_string(), "Full name can not be null!");
    }

    #[tokio::test]
    async fn blank_dropdown_keyword_returns_nothing() {
        let state = test_state();
        let token = token_for(&state, UserRole::Admin, None).await;

        let response = send(
            &state,
            Method::GET,
            "/api/v1/residents/dropdown?keyword=%20",
            Some(&token),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"], json!([]));
    }

    #[tokio::test]
    async fn account_request_validates_phone_first() {
        let state = test_state();
        let token = token_for(&state, UserRole::Admin, None).await;

        let response = send(
            &state,
            Method::POST,
            &format!("/api/v1/residents/{}/account", Uuid::new_v4()),
            Some(&token),
            Some(json!({ "email": "b@example.com", "phone": "123" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Phone number must be 10-11 digits"
        );
    }
}
