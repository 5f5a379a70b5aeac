//! Password hashing, bearer sessions and the `CurrentUser` extractor.

mod session;

pub use session::{Session, SessionStore};

use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use rand::{Rng, distributions::Alphanumeric};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::UserRole;

const TEMPORARY_PASSWORD_LEN: usize = 12;

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

/// Check a password against a stored PHC string; malformed hashes never match
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Random alphanumeric password handed out with a new account
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// `resident_` followed by eight hex digits
pub fn generate_username() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("resident_{}", &id[..8])
}

/// Bearer token from an `Authorization` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub token: String,
    pub session: Session,
}

impl CurrentUser {
    pub fn user_id(&self) -> Uuid {
        self.session.user_id
    }

    pub fn role(&self) -> UserRole {
        self.session.role
    }

    pub fn require_roles(&self, roles: &[UserRole]) -> ApiResult<()> {
        if roles.contains(&self.session.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("You do not have permission to do this".to_string()))
        }
    }

    /// Administrators and the management board
    pub fn require_staff(&self) -> ApiResult<()> {
        if self.session.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("You do not have permission to do this".to_string()))
        }
    }

    /// Staff plus accountants
    pub fn require_accounting(&self) -> ApiResult<()> {
        self.require_roles(&[UserRole::Admin, UserRole::Manager, UserRole::Accountant])
    }

    /// Resident profile of the caller
    pub fn resident_id(&self) -> ApiResult<Uuid> {
        self.session
            .resident_id
            .ok_or_else(|| ApiError::Forbidden("No resident profile is linked to this account".to_string()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let session = state
            .sessions
            .get(token)
            .await
            .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))?;

        Ok(CurrentUser {
            token: token.to_string(),
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn generated_credentials_have_expected_shape() {
        let password = generate_password();
        assert_eq!(password.len(), TEMPORARY_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        let username = generate_username();
        assert!(username.starts_with("resident_"));
        assert_eq!(username.len(), "resident_".len() + 8);
        assert!(username["resident_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
