use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::UserRole;

/// What a bearer token stands for
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub resident_id: Option<Uuid>,
    pub expires_at: NaiveDateTime,
}

/// In-process token store. Tokens do not survive a restart.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Open a session and return its token
    pub async fn create(
        &self,
        user_id: Uuid,
        username: &str,
        role: UserRole,
        resident_id: Option<Uuid>,
    ) -> (String, Session) {
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            user_id,
            username: username.to_string(),
            role,
            resident_id,
            expires_at: Utc::now().naive_utc() + self.ttl,
        };

        self.sessions.write().await.insert(token.clone(), session.clone());
        (token, session)
    }

    /// Live session for `token`; expired ones are dropped on sight
    pub async fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now().naive_utc();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(session) if session.expires_at > now => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        self.sessions.write().await.remove(token);
        None
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// End every session of a user, e.g. after a password change
    pub async fn revoke_user(&self, user_id: Uuid) {
        self.sessions
            .write()
            .await
            .retain(|_, session| session.user_id != user_id);
    }

    /// Drop expired sessions; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now().naive_utc();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_sessions_resolve_until_revoked() {
        let store = SessionStore::new(Duration::hours(1));
        let user_id = Uuid::new_v4();

        let (token, session) = store.create(user_id, "admin", UserRole::Admin, None).await;
        assert_eq!(store.get(&token).await, Some(session));

        store.revoke(&token).await;
        assert_eq!(store.get(&token).await, None);
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_purged() {
        let store = SessionStore::new(Duration::seconds(-1));

        let (token, _) = store.create(Uuid::new_v4(), "late", UserRole::Resident, None).await;
        let (_, _) = store.create(Uuid::new_v4(), "later", UserRole::Resident, None).await;

        assert_eq!(store.get(&token).await, None);
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn revoke_user_ends_all_their_sessions() {
        let store = SessionStore::new(Duration::hours(1));
        let user_id = Uuid::new_v4();

        let (first, _) = store.create(user_id, "acc", UserRole::Accountant, None).await;
        let (second, _) = store.create(user_id, "acc", UserRole::Accountant, None).await;
        let (other, _) = store.create(Uuid::new_v4(), "x", UserRole::Manager, None).await;

        store.revoke_user(user_id).await;

        assert!(store.get(&first).await.is_none());
        assert!(store.get(&second).await.is_none());
        assert!(store.get(&other).await.is_some());
    }
}
