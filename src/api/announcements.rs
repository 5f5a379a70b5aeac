use axum::{
    Router,
    extract::State,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppState, JsonResult, required_text};
use crate::auth::CurrentUser;
use crate::db::RecipientTarget;
use crate::error::{ApiError, ApiResult};
use crate::models::{Announcement, AnnouncementRecipient, ResidentAnnouncement};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/announcements",
            get(list_announcements).post(create_announcement),
        )
        .route("/api/announcements/me", get(my_announcements))
        .route("/api/announcements/:id/recipients", get(announcement_recipients))
        .route("/api/announcements/:id/read", put(mark_read))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TargetType {
    All,
    ByBuilding,
    ByFloor,
    SpecificResidents,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnouncementRequest {
    title: Option<String>,
    message: Option<String>,
    target_type: TargetType,
    building_id: Option<Uuid>,
    floor: Option<i32>,
    #[serde(default)]
    resident_ids: Vec<Uuid>,
}

impl AnnouncementRequest {
    fn target(&self) -> ApiResult<RecipientTarget> {
        let building = || {
            self.building_id
                .ok_or_else(|| ApiError::validation("Building can not be null!"))
        };

        match self.target_type {
            TargetType::All => Ok(RecipientTarget::All),
            TargetType::ByBuilding => Ok(RecipientTarget::Building(building()?)),
            TargetType::ByFloor => {
                let building_id = building()?;
                let floor = self
                    .floor
                    .ok_or_else(|| ApiError::validation("Floor can not be null!"))?;
                Ok(RecipientTarget::Floor { building_id, floor })
            }
            TargetType::SpecificResidents if self.resident_ids.is_empty() => {
                Err(ApiError::validation("Residents can not be empty!"))
            }
            TargetType::SpecificResidents => Ok(RecipientTarget::Residents(self.resident_ids.clone())),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnouncementCreated {
    id: Uuid,
    receiver_count: usize,
}

async fn create_announcement(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<AnnouncementRequest>,
) -> JsonResult<AnnouncementCreated> {
    user.require_staff()?;

    let title = required_text(body.title.as_deref(), "Title")?;
    let message = required_text(body.message.as_deref(), "Message")?;
    let target = body.target()?;

    let recipients = state.db.recipients(&target).await?;
    if recipients.is_empty() {
        return Err(ApiError::validation("No residents match this announcement"));
    }

    let (id, notification_ids) = state
        .db
        .create_announcement(user.user_id(), &title, &message, &recipients)
        .await?;

    let notifications = state.db.notifications_by_ids(&notification_ids).await?;
    state.push.publish(&notifications);

    tracing::info!(announcement = %id, target = ?target, recipients = recipients.len(), "announcement sent");

    Ok(ApiResponse::ok(
        "Announcement sent",
        AnnouncementCreated {
            id,
            receiver_count: recipients.len(),
        },
    ))
}

async fn list_announcements(State(state): State<AppState>, user: CurrentUser) -> JsonResult<Vec<Announcement>> {
    user.require_staff()?;

    let announcements = state.db.list_announcements().await?;
    Ok(ApiResponse::ok("Announcements loaded", announcements))
}

async fn announcement_recipients(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<Vec<AnnouncementRecipient>> {
    user.require_staff()?;

    if !state.db.announcement_exists(id).await? {
        return Err(ApiError::not_found("Announcement not found"));
    }

    let recipients = state.db.announcement_recipients(id).await?;
    Ok(ApiResponse::ok("Recipients loaded", recipients))
}

async fn my_announcements(
    State(state): State<AppState>,
    user: CurrentUser,
) -> JsonResult<Vec<ResidentAnnouncement>> {
    let announcements = state.db.announcements_for_resident(user.resident_id()?).await?;
    Ok(ApiResponse::ok("Announcements loaded", announcements))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<()> {
    if !state.db.mark_announcement_read(id, user.resident_id()?).await? {
        return Err(ApiError::not_found("Announcement not found"));
    }
    Ok(ApiResponse::ok("Announcement marked as read", ()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{body_json, send, test_state, token_for};
    use crate::models::UserRole;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn request(target_type: TargetType) -> AnnouncementRequest {
        AnnouncementRequest {
            title: Some("Cắt nước".to_string()),
            message: Some("Tòa A cắt nước 8h-10h".to_string()),
            target_type,
            building_id: None,
            floor: None,
            resident_ids: Vec::new(),
        }
    }

    #[test]
    fn targets_need_their_selectors() {
        assert_eq!(request(TargetType::All).target().unwrap(), RecipientTarget::All);

        let err = request(TargetType::ByBuilding).target().unwrap_err();
        assert_eq!(err.to_string(), "Building can not be null!");

        let mut by_floor = request(TargetType::ByFloor);
        by_floor.building_id = Some(Uuid::nil());
        assert_eq!(by_floor.target().unwrap_err().to_string(), "Floor can not be null!");
        by_floor.floor = Some(3);
        assert_eq!(
            by_floor.target().unwrap(),
            RecipientTarget::Floor {
                building_id: Uuid::nil(),
                floor: 3
            }
        );

        let err = request(TargetType::SpecificResidents).target().unwrap_err();
        assert_eq!(err.to_string(), "Residents can not be empty!");
    }

    #[tokio::test]
    async fn title_is_required() {
        let state = test_state();
        let token = token_for(&state, UserRole::Manager, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/announcements",
            Some(&token),
            Some(json!({ "title": "", "message": "x", "targetType": "ALL" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Title can not be null!");
    }

    #[tokio::test]
    async fn staff_have_no_personal_feed() {
        let state = test_state();
        let token = token_for(&state, UserRole::Admin, None).await;

        let response = send(&state, Method::GET, "/api/announcements/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
