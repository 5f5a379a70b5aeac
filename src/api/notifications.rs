use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppQuery, AppState, JsonResult, required_text};
use crate::auth::CurrentUser;
use crate::db::{NewNotification, NotificationFilter, RecipientTarget};
use crate::error::{ApiError, ApiResult};
use crate::models::{Notification, NotificationType};
use crate::pagination::{Page, PageRequest};
use crate::push::PushSubscription;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(send_notifications))
        .route("/api/notifications/latest", get(latest))
        .route("/api/notifications/unread", get(unread))
        .route("/api/notifications/unread/count", get(unread_count))
        .route("/api/notifications/filter", post(filter))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/ws", get(subscribe))
        .route("/api/notifications/:id/read", put(mark_read))
        .route("/api/notifications/:id", delete(delete_notification))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnreadCount {
    unread_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest {
    title: Option<String>,
    message: Option<String>,
    #[serde(rename = "type")]
    notification_type: Option<NotificationType>,
    recipient_id: Option<Uuid>,
    #[serde(default)]
    recipient_ids: Vec<Uuid>,
    building_id: Option<Uuid>,
    apartment_id: Option<Uuid>,
    reference_id: Option<Uuid>,
    reference_type: Option<String>,
}

impl NotificationRequest {
    /// Every selector present in the request; several may be combined
    fn targets(&self) -> Vec<RecipientTarget> {
        let mut direct: Vec<Uuid> = self.recipient_id.into_iter().collect();
        direct.extend(self.recipient_ids.iter().copied());

        let mut targets = Vec::new();
        if !direct.is_empty() {
            targets.push(RecipientTarget::Residents(direct));
        }
        if let Some(building_id) = self.building_id {
            targets.push(RecipientTarget::Building(building_id));
        }
        if let Some(apartment_id) = self.apartment_id {
            targets.push(RecipientTarget::Apartment(apartment_id));
        }
        targets
    }
}

#[derive(Debug, Deserialize)]
struct SocketQuery {
    token: Option<String>,
}

async fn latest(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(page): AppQuery<PageRequest>,
) -> JsonResult<Page<Notification>> {
    let page = state
        .db
        .latest_notifications(user.resident_id()?, false, page)
        .await?;
    Ok(ApiResponse::ok("Notifications loaded", page))
}

async fn unread(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(page): AppQuery<PageRequest>,
) -> JsonResult<Page<Notification>> {
    let page = state
        .db
        .latest_notifications(user.resident_id()?, true, page)
        .await?;
    Ok(ApiResponse::ok("Unread notifications loaded", page))
}

async fn unread_count(State(state): State<AppState>, user: CurrentUser) -> JsonResult<UnreadCount> {
    let unread_count = state.db.count_unread(user.resident_id()?).await?;
    Ok(ApiResponse::ok("Unread count loaded", UnreadCount { unread_count }))
}

async fn filter(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(filter): AppJson<NotificationFilter>,
) -> JsonResult<Page<Notification>> {
    let page = state
        .db
        .filter_notifications(user.resident_id()?, &filter)
        .await?;
    Ok(ApiResponse::ok("Notifications loaded", page))
}

/// Staff-authored notification to any mix of residents, a building or an apartment
async fn send_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<NotificationRequest>,
) -> JsonResult<Vec<Notification>> {
    user.require_staff()?;

    let title = required_text(body.title.as_deref(), "Title")?;
    let message = required_text(body.message.as_deref(), "Message")?;

    let mut recipients = Vec::new();
    for target in body.targets() {
        recipients.extend(state.db.recipients(&target).await?);
    }
    recipients.sort_unstable();
    recipients.dedup();

    if recipients.is_empty() {
        return Ok(ApiResponse::ok("No recipients matched", Vec::new()));
    }

    let items: Vec<NewNotification> = recipients
        .iter()
        .map(|&recipient_id| NewNotification {
            recipient_id,
            title: title.clone(),
            message: message.clone(),
            notification_type: body
                .notification_type
                .unwrap_or(NotificationType::SystemNotification),
            reference_id: body.reference_id,
            reference_type: body.reference_type.clone(),
        })
        .collect();

    let created = state.db.create_notifications(&items).await?;
    state.push.publish(&created);

    tracing::info!(count = created.len(), by = %user.session.username, "notifications sent");
    Ok(ApiResponse::ok(format!("Sent {} notifications", created.len()), created))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<()> {
    if !state.db.mark_notification_read(id, user.resident_id()?).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(ApiResponse::ok("Notification marked as read", ()))
}

async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> JsonResult<u64> {
    let updated = state
        .db
        .mark_all_notifications_read(user.resident_id()?)
        .await?;
    Ok(ApiResponse::ok("All notifications marked as read", updated))
}

async fn delete_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> JsonResult<()> {
    if !state.db.delete_notification(id, user.resident_id()?).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(ApiResponse::ok("Notification deleted", ()))
}

/// Push socket; the bearer token comes in the query string
async fn subscribe(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SocketQuery>,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;
    let session = state
        .sessions
        .get(&token)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))?;
    let resident_id = session
        .resident_id
        .ok_or_else(|| ApiError::Forbidden("No resident profile is linked to this account".to_string()))?;

    let subscription = state.push.subscribe(resident_id);
    tracing::debug!(resident = %resident_id, "push socket opened");

    Ok(upgrade.on_upgrade(move |socket| forward(socket, subscription, resident_id)))
}

async fn forward(mut socket: WebSocket, mut subscription: PushSubscription, resident_id: Uuid) {
    loop {
        tokio::select! {
            pushed = subscription.next() => {
                let Some(notification) = pushed else { break };
                let text = match serde_json::to_string(&notification) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(error = %err, "could not encode notification");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    if socket.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(resident = %resident_id, error = %err, "push socket error");
                    break;
                }
            },
        }
    }

    tracing::debug!(resident = %resident_id, "push socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{body_json, send, test_state, token_for};
    use crate::models::UserRole;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn selectors_are_combined() {
        let resident = Uuid::new_v4();
        let building = Uuid::new_v4();
        let request: NotificationRequest = serde_json::from_value(json!({
            "title": "Bảo trì thang máy",
            "message": "Thang máy tòa A dừng hoạt động 9h-11h",
            "type": "MAINTENANCE_SCHEDULE",
            "recipientId": resident,
            "recipientIds": [resident],
            "buildingId": building
        }))
        .unwrap();

        assert_eq!(request.notification_type, Some(NotificationType::MaintenanceSchedule));
        assert_eq!(
            request.targets(),
            vec![
                RecipientTarget::Residents(vec![resident, resident]),
                RecipientTarget::Building(building),
            ]
        );
    }

    #[test]
    fn no_selectors_means_no_targets() {
        let request: NotificationRequest =
            serde_json::from_value(json!({ "title": "x", "message": "y" })).unwrap();
        assert!(request.targets().is_empty());
    }

    #[tokio::test]
    async fn residents_can_not_broadcast() {
        let state = test_state();
        let token = token_for(&state, UserRole::Resident, Some(Uuid::new_v4())).await;

        let response = send(
            &state,
            Method::POST,
            "/api/notifications",
            Some(&token),
            Some(json!({ "title": "x", "message": "y" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn staff_without_profile_have_no_inbox() {
        let state = test_state();
        let token = token_for(&state, UserRole::Accountant, None).await;

        let response = send(&state, Method::GET, "/api/notifications/unread/count", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["message"],
            "No resident profile is linked to this account"
        );
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_lookup() {
        let state = test_state();
        let token = token_for(&state, UserRole::Admin, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/notifications",
            Some(&token),
            Some(json!({ "title": "x", "message": "  ", "recipientId": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Message can not be null!");
    }
}
