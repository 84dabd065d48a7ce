//! Browser session state and AuthnRequest correlation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::saml::messages::Attribute;

/// Cookie carrying the opaque session id.
pub const SESSION_COOKIE: &str = "sp_session";

/// How long an issued AuthnRequest id stays eligible for correlation.
const PENDING_TTL_SECS: i64 = 600;

/// Tracked request ids are bounded; oldest entries are evicted first.
const PENDING_CAPACITY: usize = 4096;

/// State accumulated for one authenticated browser.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub principal: String,
    pub name_id_format: Option<String>,
    pub sp_entity_id: String,
    pub idp_entity_id: String,
    pub session_index: Option<String>,
    pub attributes: Vec<Attribute>,
    pub relay_state: Option<String>,
    pub authenticated_at: DateTime<Utc>,
    /// Id of the LogoutRequest this SP issued, while a logout is in flight.
    pub pending_logout_id: Option<String>,
}

/// Generate an opaque cookie value.
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Session persistence behind the cookie id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<AuthenticatedSession>;
    async fn insert(&self, id: String, session: AuthenticatedSession);
    async fn remove(&self, id: &str) -> Option<AuthenticatedSession>;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, AuthenticatedSession>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Option<AuthenticatedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn insert(&self, id: String, session: AuthenticatedSession) {
        self.sessions.write().await.insert(id, session);
    }

    async fn remove(&self, id: &str) -> Option<AuthenticatedSession> {
        self.sessions.write().await.remove(id)
    }
}

/// An AuthnRequest this SP has issued and not yet seen answered.
#[derive(Debug, Clone)]
pub struct PendingAuthn {
    pub idp_entity_id: String,
    pub relay_state: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// Bounded, time-expiring record of issued AuthnRequest ids for
/// `InResponseTo` correlation.
#[derive(Default)]
pub struct RequestTracker {
    pending: RwLock<HashMap<String, PendingAuthn>>,
}

impl RequestTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn track(
        &self,
        request_id: String,
        idp_entity_id: String,
        relay_state: Option<String>,
        now: DateTime<Utc>,
    ) {
        let mut pending = self.pending.write().await;
        let cutoff = now - Duration::seconds(PENDING_TTL_SECS);
        pending.retain(|_, p| p.issued_at > cutoff);
        if pending.len() >= PENDING_CAPACITY {
            if let Some(oldest) = pending
                .iter()
                .min_by_key(|(_, p)| p.issued_at)
                .map(|(id, _)| id.clone())
            {
                pending.remove(&oldest);
            }
        }
        pending.insert(
            request_id,
            PendingAuthn {
                idp_entity_id,
                relay_state,
                issued_at: now,
            },
        );
    }

    /// Take a pending request out of the tracker. `None` when the id was
    /// never issued, already consumed, or has expired.
    pub async fn consume(&self, request_id: &str, now: DateTime<Utc>) -> Option<PendingAuthn> {
        let mut pending = self.pending.write().await;
        let entry = pending.remove(request_id)?;
        if entry.issued_at + Duration::seconds(PENDING_TTL_SECS) < now {
            return None;
        }
        Some(entry)
    }
}
