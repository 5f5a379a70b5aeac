use axum::{
    Router,
    extract::State,
    routing::get,
};
use serde::Deserialize;

use super::{ApiResponse, AppJson, AppQuery, AppState, IdQuery, JsonResult, KeywordQuery, required_text};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{Building, Dropdown};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/buildings",
            get(list_buildings).post(create_building).delete(delete_building),
        )
        .route("/api/v1/buildings/dropdown", get(building_dropdown))
}

#[derive(Debug, Deserialize)]
struct BuildingRequest {
    name: Option<String>,
}

async fn list_buildings(State(state): State<AppState>, _user: CurrentUser) -> JsonResult<Vec<Building>> {
    let buildings = state.db.list_buildings().await?;
    Ok(ApiResponse::ok("Buildings loaded", buildings))
}

async fn building_dropdown(
    State(state): State<AppState>,
    _user: CurrentUser,
    AppQuery(query): AppQuery<KeywordQuery>,
) -> JsonResult<Vec<Dropdown>> {
    let items = state.db.building_dropdown(query.keyword.as_deref()).await?;
    Ok(ApiResponse::ok("Buildings loaded", items))
}

async fn create_building(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<BuildingRequest>,
) -> JsonResult<Building> {
    user.require_staff()?;
    let name = required_text(body.name.as_deref(), "Name")?;

    if state.db.building_name_exists(&name).await? {
        return Err(ApiError::conflict(format!("Building name exists: {}", name)));
    }

    let building = state.db.create_building(&name).await?;
    tracing::info!(building = %building.name, "building created");

    Ok(ApiResponse::ok("Building created", building))
}

async fn delete_building(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<IdQuery>,
) -> JsonResult<()> {
    user.require_staff()?;

    if !state.db.building_exists(query.id).await? {
        return Err(ApiError::not_found("Building not found"));
    }

    let apartments = state.db.count_apartments_in_building(query.id).await?;
    if apartments > 0 {
        return Err(ApiError::conflict(format!(
            "Building still has {} apartments",
            apartments
        )));
    }

    state.db.delete_building(query.id).await?;
    tracing::info!(building = %query.id, "building deleted");

    Ok(ApiResponse::ok("Building deleted", ()))
}
