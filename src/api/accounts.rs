use axum::{
    Router,
    extract::State,
    routing::{get, post, put},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppJson, AppState, JsonResult};
use crate::auth::{self, CurrentUser};
use crate::error::ApiError;
use crate::models::UserRole;

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const MIN_PASSWORD_LEN: usize = 8;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/password", put(change_password))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    /// Username or email
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user_id: Uuid,
    username: String,
    role: UserRole,
    resident_id: Option<Uuid>,
    expires_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    user_id: Uuid,
    username: String,
    email: String,
    phone: String,
    role: UserRole,
    resident_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePassword {
    old_password: String,
    new_password: String,
    confirm_password: String,
}

impl ChangePassword {
    fn validate(&self) -> Result<(), ApiError> {
        if self.new_password != self.confirm_password {
            return Err(ApiError::validation("Confirm password does not match"));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> JsonResult<LoginResponse> {
    let invalid = || ApiError::Unauthorized(INVALID_CREDENTIALS.to_string());

    let user = state
        .db
        .find_user_by_login(body.username.trim())
        .await?
        .filter(|user| user.active)
        .ok_or_else(invalid)?;

    if !auth::verify_password(&body.password, &user.password_hash) {
        tracing::info!(login = %body.username, "rejected login");
        return Err(invalid());
    }

    let resident_id = state.db.resident_id_for_user(user.id).await?;
    let (token, session) = state
        .sessions
        .create(user.id, &user.username, user.role, resident_id)
        .await;

    tracing::info!(user = %user.username, role = ?user.role, "user logged in");

    Ok(ApiResponse::ok(
        "Login successful",
        LoginResponse {
            token,
            user_id: user.id,
            username: user.username,
            role: user.role,
            resident_id,
            expires_at: session.expires_at,
        },
    ))
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> JsonResult<()> {
    state.sessions.revoke(&user.token).await;
    Ok(ApiResponse::ok("Logged out", ()))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> JsonResult<Profile> {
    let account = state.db.get_user(user.user_id()).await?;

    Ok(ApiResponse::ok(
        "Profile loaded",
        Profile {
            user_id: account.id,
            username: account.username,
            email: account.email,
            phone: account.phone,
            role: account.role,
            resident_id: user.session.resident_id,
        },
    ))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(body): AppJson<ChangePassword>,
) -> JsonResult<()> {
    body.validate()?;

    let account = state.db.get_user(user.user_id()).await?;
    if !auth::verify_password(&body.old_password, &account.password_hash) {
        return Err(ApiError::validation("Old password is incorrect"));
    }

    let hash = auth::hash_password(&body.new_password)?;
    state.db.update_password(account.id, &hash).await?;

    // Every open session has to log in again
    state.sessions.revoke_user(account.id).await;
    tracing::info!(user = %account.username, "password changed");

    Ok(ApiResponse::ok("Password changed, please log in again", ()))
}
