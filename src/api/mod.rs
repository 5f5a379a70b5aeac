//! HTTP surface: routes, shared state and the JSON envelope.

mod accounting;
mod accounts;
mod announcements;
mod apartments;
mod buildings;
mod extra_fees;
mod extract;
mod issues;
mod notifications;
mod residents;
mod usage;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    routing::get,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::auth::{CurrentUser, SessionStore};
use crate::config::Config;
use crate::db::{Database, Overview};
use crate::error::{ApiError, ApiResult};
use crate::mailer::Mailer;
use crate::push::PushHub;

pub use extract::{AppJson, AppPath, AppQuery};

/// Envelope every JSON endpoint answers with
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(ApiResponse {
            status_code: 200,
            message: message.into(),
            data: Some(data),
        })
    }
}

pub type JsonResult<T> = ApiResult<Json<ApiResponse<T>>>;

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub push: PushHub,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(db: Database, config: Config, mailer: Mailer) -> Self {
        AppState {
            db,
            sessions: SessionStore::new(Duration::hours(config.session_ttl_hours)),
            push: PushHub::new(),
            mailer,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct KeywordQuery {
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdQuery {
    pub id: Uuid,
}

/// `?month&year` of list and export endpoints, both optional
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PeriodQuery {
    pub month: Option<i32>,
    pub year: Option<i32>,
}

impl PeriodQuery {
    /// A complete billing period: month in 1..=12 and year 2020 or later
    pub fn required(&self) -> ApiResult<(u32, i32)> {
        let month = self
            .month
            .ok_or_else(|| ApiError::validation("Month can not be null!"))?;
        let year = self
            .year
            .ok_or_else(|| ApiError::validation("Year can not be null!"))?;

        if !(1..=12).contains(&month) {
            return Err(ApiError::validation("Month must be between 1 and 12"));
        }
        if year < 2020 {
            return Err(ApiError::validation("Year must be 2020 or later"));
        }

        Ok((month as u32, year))
    }
}

/// Trimmed text, `None` when blank
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Required text field, rejected with "<Field> can not be null!"
pub(crate) fn required_text(value: Option<&str>, field: &str) -> ApiResult<String> {
    non_blank(value)
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation(format!("{} can not be null!", field)))
}

/// Apartment of the calling resident, if they live somewhere
pub(crate) async fn own_apartment(state: &AppState, user: &CurrentUser) -> ApiResult<Option<Uuid>> {
    let resident = state.db.get_resident(user.resident_id()?).await?;
    Ok(resident.apartment_id)
}

async fn overview(State(state): State<AppState>, user: CurrentUser) -> JsonResult<Overview> {
    user.require_staff()?;

    let overview = state.db.overview().await?;
    Ok(ApiResponse::ok("Overview loaded", overview))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION])
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins());

    Router::new()
        .merge(accounts::routes())
        .merge(buildings::routes())
        .merge(apartments::routes())
        .merge(residents::routes())
        .merge(accounting::routes())
        .merge(usage::routes())
        .merge(extra_fees::routes())
        .merge(announcements::routes())
        .merge(issues::routes())
        .merge(notifications::routes())
        .route("/api/v1/overview", get(overview))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::UserRole;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    /// State on a pool that never connects; only for paths that fail before the database
    pub(crate) fn test_state() -> AppState {
        let config = envy::from_iter::<_, Config>(vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/bluemoon".to_string(),
        )])
        .unwrap();
        let db = Database::lazy(config.database_url()).unwrap();
        AppState::new(db, config, Mailer::disabled())
    }

    pub(crate) async fn token_for(state: &AppState, role: UserRole, resident_id: Option<Uuid>) -> String {
        let (token, _) = state
            .sessions
            .create(Uuid::new_v4(), "tester", role, resident_id)
            .await;
        token
    }

    pub(crate) async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        router(state.clone()).oneshot(request).await.unwrap()
    }

    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn period_requires_month_and_year_in_range() {
        let period = |month, year| PeriodQuery { month, year }.required();

        assert_eq!(period(Some(11), Some(2024)).unwrap(), (11, 2024));
        assert!(matches!(period(None, Some(2024)), Err(ApiError::Validation(_))));
        assert!(matches!(period(Some(0), Some(2024)), Err(ApiError::Validation(_))));
        assert!(matches!(period(Some(13), Some(2024)), Err(ApiError::Validation(_))));
        assert!(matches!(period(Some(1), Some(2019)), Err(ApiError::Validation(_))));
    }

    #[test]
    fn required_text_names_the_field() {
        assert_eq!(required_text(Some("  Lift repair "), "Title").unwrap(), "Lift repair");

        let err = required_text(Some("   "), "Title").unwrap_err();
        assert_eq!(err.to_string(), "Title can not be null!");
        assert!(required_text(None, "Title").is_err());
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let state = test_state();

        let response = send(&state, Method::GET, "/api/v1/overview", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["statusCode"], 401);
        assert_eq!(body["message"], "Missing bearer token");
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected() {
        let state = test_state();

        let response = send(&state, Method::GET, "/api/v1/overview", Some("nope"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn residents_can_not_open_the_board_overview() {
        let state = test_state();
        let token = token_for(&state, UserRole::Resident, Some(Uuid::new_v4())).await;

        let response = send(&state, Method::GET, "/api/v1/overview", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
