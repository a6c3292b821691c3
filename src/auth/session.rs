// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory session store.
//!
//! Sessions are identified by the `session_id` cookie and hold JSON values
//! by key. Handlers only see the [`Session`] handle, which offers
//! `get`/`set`/`destroy`. Idle sessions expire after the configured TTL and
//! are evicted by the session sweeper.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::FromRequestParts,
    http::{header::COOKIE, request::Parts, HeaderMap},
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::AuthError;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";

struct SessionRecord {
    values: HashMap<String, serde_json::Value>,
    last_seen: Instant,
}

/// Shared store of all sessions.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Handle for the session named by the cookie, or a fresh one when the
    /// cookie is missing, unknown or expired. Fresh sessions are only stored
    /// once something is `set`.
    pub async fn load(&self, session_id: Option<&str>) -> Session {
        if let Some(id) = session_id {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(id) {
                Some(record) if record.last_seen.elapsed() < self.ttl => {
                    record.last_seen = Instant::now();
                    return Session::attach(id.to_string(), self.clone(), false);
                }
                Some(_) => {
                    sessions.remove(id);
                }
                None => {}
            }
        }

        Session::attach(new_session_id(), self.clone(), true)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every session idle for longer than the TTL. Returns how many
    /// were removed.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.last_seen.elapsed() < self.ttl);
        before - sessions.len()
    }

    async fn get_value(&self, session_id: &str, key: &str) -> Option<serde_json::Value> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|record| record.values.get(key).cloned())
    }

    async fn set_value(&self, session_id: &str, key: &str, value: serde_json::Value) {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord {
                values: HashMap::new(),
                last_seen: Instant::now(),
            });
        record.values.insert(key.to_string(), value);
        record.last_seen = Instant::now();
    }

    async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Replace `old_id` with an empty record under `new_id`.
    async fn rotate(&self, old_id: &str, new_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(old_id);
        sessions.insert(
            new_id.to_string(),
            SessionRecord {
                values: HashMap::new(),
                last_seen: Instant::now(),
            },
        );
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One request's view of its session.
#[derive(Clone)]
pub struct Session {
    id: String,
    store: SessionStore,
    is_new: bool,
    /// Id the request's session moved to, shared by every handle of the
    /// request so the middleware can issue the new cookie.
    regenerated: Arc<Mutex<Option<String>>>,
}

impl Session {
    fn attach(id: String, store: SessionStore, is_new: bool) -> Self {
        Self {
            id,
            store,
            is_new,
            regenerated: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the request arrived without a live session.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Read a value. Values that fail to deserialize read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get_value(&self.id, key).await?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable session value");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.store.set_value(&self.id, key, value).await;
        Ok(())
    }

    /// Remove the session and everything in it.
    pub async fn destroy(&self) {
        self.store.remove(&self.id).await;
    }

    /// Drop this session and continue under a fresh, empty one.
    ///
    /// Call on privilege changes such as login, so an id known before the
    /// change never carries the new identity.
    pub async fn regenerate(&self) -> Session {
        let new_id = new_session_id();
        self.store.rotate(&self.id, &new_id).await;
        *self.regenerated.lock().await = Some(new_id.clone());
        Session {
            id: new_id,
            store: self.store.clone(),
            is_new: true,
            regenerated: Arc::clone(&self.regenerated),
        }
    }

    /// The id this request's session ends up with: the regenerated id if
    /// [`Session::regenerate`] ran, otherwise this one.
    pub async fn active_id(&self) -> String {
        match self.regenerated.lock().await.as_ref() {
            Some(id) => id.clone(),
            None => self.id.clone(),
        }
    }
}

/// Sessions are attached to requests by the session middleware.
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthError::SessionUnavailable)
    }
}

/// Session id from the request's `Cookie` headers.
pub fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn new_session_is_stored_on_first_set() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.load(None).await;
        assert!(session.is_new());
        assert!(!store.contains(session.id()).await);

        session.set("user", &42u64).await.unwrap();
        assert!(store.contains(session.id()).await);

        let reloaded = store.load(Some(session.id())).await;
        assert!(!reloaded.is_new());
        assert_eq!(reloaded.get::<u64>("user").await, Some(42));
    }

    #[tokio::test]
    async fn unknown_cookie_gets_a_fresh_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.load(Some("forged")).await;
        assert!(session.is_new());
        assert_ne!(session.id(), "forged");
    }

    #[tokio::test]
    async fn destroy_removes_values() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.load(None).await;
        session.set("user", &"x").await.unwrap();

        session.destroy().await;
        assert!(session.get::<String>("user").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::from_millis(20));
        let session = store.load(None).await;
        session.set("user", &1u8).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.sweep().await, 1);
        assert!(store.load(Some(session.id())).await.is_new());
    }

    #[tokio::test]
    async fn regenerate_moves_to_a_fresh_id() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.load(None).await;
        session.set("user", &"mallory").await.unwrap();
        let old_id = session.id().to_string();

        let fresh = session.regenerate().await;
        assert_ne!(fresh.id(), old_id);
        assert!(fresh.is_new());
        assert!(!store.contains(&old_id).await);
        assert!(store.contains(fresh.id()).await);
        assert!(fresh.get::<String>("user").await.is_none());
        assert_eq!(session.active_id().await, fresh.id());

        fresh.set("user", &"victim").await.unwrap();
        assert!(store.load(Some(&old_id)).await.is_new());
    }

    #[tokio::test]
    async fn mistyped_value_reads_as_none() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.load(None).await;
        session.set("user", &"not a number").await.unwrap();
        assert!(session.get::<u64>("user").await.is_none());
    }

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; session_id=abc-123; lang=en"),
        );
        assert_eq!(session_id_from(&headers).as_deref(), Some("abc-123"));

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_id_from(&headers), None);
    }
}
