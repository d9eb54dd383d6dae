//! Bearer token sessions

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;

use crate::market::AccountRole;

/// Authenticated caller, attached to requests by the auth middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub role: AccountRole,
    pub account_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn open(&self, role: AccountRole, account_id: Uuid) -> Session {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);

        let session = Session {
            token: hex::encode(bytes),
            principal: Principal { role, account_id },
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Resolve a token, dropping it if expired
    pub fn resolve(&self, token: &str) -> Option<Principal> {
        let now = Utc::now();
        let principal = {
            let session = self.sessions.get(token)?;
            if now < session.expires_at {
                Some(session.principal)
            } else {
                None
            }
        };

        if principal.is_none() {
            self.sessions.remove(token);
        }
        principal
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Remove expired sessions (call periodically)
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| now < s.expires_at);
        before - self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_resolve() {
        let store = SessionStore::new(Duration::hours(1));
        let id = Uuid::new_v4();
        let session = store.open(AccountRole::Buyer, id);

        let principal = store.resolve(&session.token).unwrap();
        assert_eq!(principal.account_id, id);
        assert_eq!(principal.role, AccountRole::Buyer);
        assert!(store.resolve("unknown").is_none());
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let store = SessionStore::new(Duration::seconds(-1));
        let session = store.open(AccountRole::Seller, Uuid::new_v4());
        assert!(store.resolve(&session.token).is_none());
        assert_eq!(store.cleanup(), 0);
    }

    #[test]
    fn test_revoke() {
        let store = SessionStore::new(Duration::hours(1));
        let session = store.open(AccountRole::Seller, Uuid::new_v4());
        assert!(store.revoke(&session.token));
        assert!(store.resolve(&session.token).is_none());
    }
}
