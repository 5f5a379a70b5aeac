use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppQuery, AppState, IdQuery, JsonResult, KeywordQuery};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{Apartment, ApartmentSummary, Dropdown, Resident, ResidentSummary, UserRole};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/apartments",
            get(search_apartments).post(create_apartment).delete(delete_apartment),
        )
        .route("/api/v1/apartments/dropdown", get(apartment_dropdown))
        .route("/api/v1/apartments/:id", put(change_owner).get(apartment_detail))
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    keyword: Option<String>,
    building: Option<Uuid>,
    floor: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApartmentRequest {
    room_number: Option<i32>,
    floor: Option<i32>,
    area: Option<f64>,
    building_id: Option<Uuid>,
    owner_id: Option<Uuid>,
}

impl ApartmentRequest {
    /// Validated `(room_number, floor, area, building_id)`
    fn validate(&self) -> ApiResult<(i32, i32, f64, Uuid)> {
        let room_number = self
            .room_number
            .ok_or_else(|| ApiError::validation("Room number can not be null!"))?;
        let floor = self
            .floor
            .ok_or_else(|| ApiError::validation("Floor can not be null!"))?;
        let area = self
            .area
            .ok_or_else(|| ApiError::validation("Area can not be null!"))?;
        let building_id = self
            .building_id
            .ok_or_else(|| ApiError::validation("Building can not be null!"))?;

        if room_number <= 0 {
            return Err(ApiError::validation("Room number must be positive"));
        }
        if floor <= 0 {
            return Err(ApiError::validation("Floor must be positive"));
        }
        if !area.is_finite() || area <= 0.0 {
            return Err(ApiError::validation("Area must be positive"));
        }

        Ok((room_number, floor, area, building_id))
    }
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    new_owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApartmentInfo {
    room_number: i32,
    floor: i32,
    area: f64,
    building_name: String,
    number_of_residents: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApartmentCounters {
    unpaid_invoices_count: i64,
    pending_issues_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApartmentDetail {
    id: Uuid,
    info: ApartmentInfo,
    owner: Option<Resident>,
    residents: Vec<ResidentSummary>,
    summary: ApartmentCounters,
}

async fn search_apartments(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<SearchQuery>,
) -> JsonResult<Vec<ApartmentSummary>> {
    user.require_accounting()?;

    let apartments = state
        .db
        .search_apartments(query.keyword.as_deref(), query.building, query.floor)
        .await?;
    Ok(ApiResponse::ok("Apartments loaded", apartments))
}

async fn apartment_dropdown(
    State(state): State<AppState>,
    _user: CurrentUser,
    AppQuery(query): AppQuery<KeywordQuery>,
) -> JsonResult<Vec<Dropdown>> {
    let items = state.db.apartment_dropdown(query.keyword.as_deref()).await?;
    Ok(ApiResponse::ok("Apartments loaded", items))
}

async fn apartment_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<ApartmentDetail> {
    // Residents may only look at their own home
    if user.role() == UserRole::Resident {
        let resident = state.db.get_resident(user.resident_id()?).await?;
        if resident.apartment_id != Some(id) {
            return Err(ApiError::Forbidden("You do not live in this apartment".to_string()));
        }
    }

    let apartment = state
        .db
        .find_apartment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Apartment not found"))?;

    let residents = state.db.residents_of_apartment(id).await?;
    let owner = match apartment.owner_id {
        Some(owner_id) => state.db.find_resident(owner_id).await?,
        None => None,
    };
    let (unpaid_invoices_count, pending_issues_count) = state.db.apartment_counters(id).await?;

    let detail = ApartmentDetail {
        id: apartment.id,
        info: ApartmentInfo {
            room_number: apartment.room_number,
            floor: apartment.floor,
            area: apartment.area,
            building_name: apartment.building_name,
            number_of_residents: residents.len(),
        },
        owner,
        residents,
        summary: ApartmentCounters {
            unpaid_invoices_count,
            pending_issues_count,
        },
    };

    Ok(ApiResponse::ok("Apartment loaded", detail))
}

async fn create_apartment(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<ApartmentRequest>,
) -> JsonResult<Apartment> {
    user.require_staff()?;
    let (room_number, floor, area, building_id) = body.validate()?;

    if !state.db.building_exists(building_id).await? {
        return Err(ApiError::not_found("Building not found"));
    }
    if state.db.room_taken(building_id, room_number).await? {
        return Err(ApiError::conflict(format!(
            "Apartment {} already exists in this building",
            room_number
        )));
    }
    if let Some(owner_id) = body.owner_id {
        if state.db.find_resident(owner_id).await?.is_none() {
            return Err(ApiError::not_found("Resident not found"));
        }
    }

    let apartment = state
        .db
        .create_apartment(room_number, floor, area, building_id, body.owner_id)
        .await?;
    tracing::info!(apartment = %apartment.id, room = room_number, "apartment created");

    Ok(ApiResponse::ok("Apartment created", apartment))
}

async fn change_owner(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppQuery(query): AppQuery<OwnerQuery>,
) -> JsonResult<()> {
    user.require_staff()?;

    let apartment = state
        .db
        .find_apartment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Apartment not found"))?;

    if let Some(owner_id) = query.new_owner_id {
        let resident = state
            .db
            .find_resident(owner_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Resident not found"))?;
        if resident.apartment_id != Some(apartment.id) {
            return Err(ApiError::validation("Resident does not live in this apartment"));
        }
    }

    state.db.set_apartment_owner(apartment.id, query.new_owner_id).await?;
    tracing::info!(apartment = %apartment.id, owner = ?query.new_owner_id, "apartment owner changed");

    Ok(ApiResponse::ok("Owner updated", ()))
}

async fn delete_apartment(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<IdQuery>,
) -> JsonResult<()> {
    user.require_staff()?;

    if state.db.find_apartment(query.id).await?.is_none() {
        return Err(ApiError::not_found("Apartment not found"));
    }
    if state.db.count_invoices_for_apartment(query.id).await? > 0 {
        return Err(ApiError::conflict("Apartment has invoices and can not be deleted"));
    }

    state.db.delete_apartment(query.id).await?;
    tracing::info!(apartment = %query.id, "apartment deleted");

    Ok(ApiResponse::ok("Apartment deleted", ()))
}
