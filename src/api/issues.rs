use axum::{
    Router,
    extract::State,
    routing::{get, patch},
};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppPath, AppQuery, AppState, JsonResult, non_blank, own_apartment, required_text};
use crate::auth::CurrentUser;
use crate::db::NewNotification;
use crate::error::{ApiError, ApiResult};
use crate::models::{Issue, IssueStatus, IssueSummary, IssueType, NotificationType, UserRole};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/issues", get(list_issues).post(report_issue))
        .route("/api/issues/:id/status", patch(update_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    apartment_id: Option<Uuid>,
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    issue_type: Option<IssueType>,
    reporter_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    status: Option<IssueStatus>,
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: IssueStatus,
}

/// Residents may only report on the apartment they live in
fn check_reporting_apartment(own: Option<Uuid>, requested: Uuid) -> ApiResult<()> {
    if own == Some(requested) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Residents can only report issues for their own apartment".to_string(),
        ))
    }
}

/// Message sent to the reporter when their ticket moves
fn status_message(issue: &Issue, status: IssueStatus) -> String {
    match status {
        IssueStatus::Processing => format!("Your report \"{}\" is being handled", issue.title),
        IssueStatus::Processed => format!("Your report \"{}\" has been resolved", issue.title),
        IssueStatus::Unprocessed => format!("Your report \"{}\" was reopened", issue.title),
    }
}

async fn report_issue(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<IssueRequest>,
) -> JsonResult<Issue> {
    let apartment_id = body
        .apartment_id
        .ok_or_else(|| ApiError::validation("Apartment can not be null!"))?;
    let title = required_text(body.title.as_deref(), "Title")?;
    let issue_type = body.issue_type.unwrap_or(IssueType::Other);

    let reporter_id = if user.role() == UserRole::Resident {
        check_reporting_apartment(own_apartment(&state, &user).await?, apartment_id)?;
        user.resident_id()?
    } else {
        user.require_staff()?;
        body.reporter_id
            .ok_or_else(|| ApiError::validation("Reporter can not be null!"))?
    };

    if state.db.find_apartment(apartment_id).await?.is_none() {
        return Err(ApiError::not_found("Apartment not found"));
    }
    if state.db.find_resident(reporter_id).await?.is_none() {
        return Err(ApiError::not_found("Resident not found"));
    }

    let issue = state
        .db
        .create_issue(
            apartment_id,
            reporter_id,
            &title,
            non_blank(body.description.as_deref()),
            issue_type,
        )
        .await?;

    tracing::info!(issue = %issue.id, kind = ?issue.issue_type, "issue reported");
    Ok(ApiResponse::ok("Issue reported", issue))
}

async fn list_issues(
    State(state): State<AppState>,
    user: CurrentUser,
    AppQuery(query): AppQuery<StatusQuery>,
) -> JsonResult<Vec<IssueSummary>> {
    user.require_staff()?;

    let issues = state.db.list_issues(query.status).await?;
    Ok(ApiResponse::ok("Issues loaded", issues))
}

async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<StatusChange>,
) -> JsonResult<()> {
    user.require_staff()?;

    let issue = state.db.get_issue(id).await?;
    let invalid = || ApiError::InvalidTransition {
        from: issue.status.to_string(),
        to: body.status.to_string(),
    };

    if !issue.status.can_transition_to(body.status) {
        return Err(invalid());
    }
    if !state.db.update_issue_status(id, issue.status, body.status).await? {
        return Err(invalid());
    }

    tracing::info!(issue = %id, from = %issue.status, to = %body.status, "issue status changed");

    let notice = NewNotification {
        recipient_id: issue.reporter_id,
        title: "Issue update".to_string(),
        message: status_message(&issue, body.status),
        notification_type: NotificationType::IssueUpdate,
        reference_id: Some(issue.id),
        reference_type: Some("ISSUE".to_string()),
    };
    match state.db.create_notifications(&[notice]).await {
        Ok(created) => {
            state.push.publish(&created);
        }
        Err(err) => tracing::warn!(issue = %id, error = %err, "could not notify reporter"),
    }

    Ok(ApiResponse::ok("Issue status updated", ()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{body_json, send, test_state, token_for};
    use axum::http::{Method, StatusCode};
    use chrono::NaiveDateTime;
    use serde_json::json;

    fn issue() -> Issue {
        Issue {
            id: Uuid::nil(),
            apartment_id: Uuid::nil(),
            reporter_id: Uuid::nil(),
            title: "Mất điện hành lang".to_string(),
            description: None,
            issue_type: IssueType::Electrical,
            status: IssueStatus::Unprocessed,
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn reporter_is_told_what_happened() {
        assert_eq!(
            status_message(&issue(), IssueStatus::Processing),
            "Your report \"Mất điện hành lang\" is being handled"
        );
        assert_eq!(
            status_message(&issue(), IssueStatus::Processed),
            "Your report \"Mất điện hành lang\" has been resolved"
        );
    }

    #[test]
    fn status_body_uses_upper_case_names() {
        let change: StatusChange = serde_json::from_value(json!({ "status": "PROCESSING" })).unwrap();
        assert_eq!(change.status, IssueStatus::Processing);

        assert!(serde_json::from_value::<StatusChange>(json!({ "status": "DONE" })).is_err());
    }

    #[test]
    fn residents_report_only_on_their_own_apartment() {
        let home = Uuid::from_u128(1);

        assert!(check_reporting_apartment(Some(home), home).is_ok());

        let err = check_reporting_apartment(Some(home), Uuid::from_u128(2)).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(err.to_string(), "Residents can only report issues for their own apartment");

        // Not housed anywhere
        assert!(matches!(
            check_reporting_apartment(None, home),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn staff_must_name_the_reporter() {
        let state = test_state();
        let token = token_for(&state, UserRole::Manager, None).await;

        let response = send(
            &state,
            Method::POST,
            "/api/issues",
            Some(&token),
            Some(json!({ "apartmentId": Uuid::new_v4(), "title": "Rò nước", "type": "PLUMBING" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Reporter can not be null!");
    }

    #[tokio::test]
    async fn residents_can_not_list_issues() {
        let state = test_state();
        let token = token_for(&state, UserRole::Resident, Some(Uuid::new_v4())).await;

        let response = send(&state, Method::GET, "/api/issues", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
