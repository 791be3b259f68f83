//! Sessions
//!
//! The set of identities logged in on this device and which one is active.
//! Session settings arrive from several devices, so they are kept as LWW
//! records and merged field by field.
//!
//! Removing a session and logging out are different operations: the active
//! session can only be left through [`SessionRegistry::logout`].

use crate::core_identity::is_valid_pubkey;
use crate::core_store::VersionedRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Invalid session pubkey: {0}")]
    InvalidPubkey(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session {0} is active; log out instead of removing it")]
    ActiveSession(String),
}

impl SessionError {
    /// Every session error is a caller precondition
    pub fn is_validation(&self) -> bool {
        true
    }
}

/// How the session signs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMethod {
    /// Secret key held by the app
    Local,
    /// Browser extension signer
    Extension,
    /// Remote signer reached over relays
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub pubkey: String,
    pub method: SessionMethod,
    pub settings: VersionedRecord<Value>,
}

#[derive(Default)]
struct Registry {
    sessions: BTreeMap<String, Session>,
    active: Option<String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Registry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. The first session added becomes active.
    pub async fn add_session(&self, pubkey: &str, method: SessionMethod) -> SessionResult<()> {
        if !is_valid_pubkey(pubkey) {
            return Err(SessionError::InvalidPubkey(pubkey.to_string()));
        }

        let mut inner = self.inner.write().await;
        inner.sessions.entry(pubkey.to_string()).or_insert_with(|| Session {
            pubkey: pubkey.to_string(),
            method,
            settings: VersionedRecord::new(),
        });
        if inner.active.is_none() {
            inner.active = Some(pubkey.to_string());
        }

        info!(pubkey, ?method, "Session added");
        Ok(())
    }

    pub async fn switch_session(&self, pubkey: &str) -> SessionResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(pubkey) {
            return Err(SessionError::UnknownSession(pubkey.to_string()));
        }
        inner.active = Some(pubkey.to_string());
        info!(pubkey, "Switched session");
        Ok(())
    }

    pub async fn active(&self) -> Option<String> {
        self.inner.read().await.active.clone()
    }

    pub async fn session(&self, pubkey: &str) -> Option<Session> {
        self.inner.read().await.sessions.get(pubkey).cloned()
    }

    /// All session pubkeys, sorted
    pub async fn pubkeys(&self) -> Vec<String> {
        self.inner.read().await.sessions.keys().cloned().collect()
    }

    /// Merge settings stamped with `timestamp`. Returns how many fields changed.
    pub async fn update_settings(&self, pubkey: &str, timestamp: u64, fields: Map<String, Value>) -> SessionResult<usize> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(pubkey)
            .ok_or_else(|| SessionError::UnknownSession(pubkey.to_string()))?;
        Ok(session.settings.apply(timestamp, fields))
    }

    /// End the active session and activate the next remaining one, if any.
    /// Returns the pubkey that was logged out.
    pub async fn logout(&self) -> Option<String> {
        let mut inner = self.inner.write().await;
        let pubkey = inner.active.take()?;
        inner.sessions.remove(&pubkey);
        inner.active = inner.sessions.keys().next().cloned();

        info!(pubkey = %pubkey, next = ?inner.active, "Logged out");
        Some(pubkey)
    }

    /// Forget a session that is not the active one
    pub async fn remove_session(&self, pubkey: &str) -> SessionResult<Session> {
        let mut inner = self.inner.write().await;
        if inner.active.as_deref() == Some(pubkey) {
            return Err(SessionError::ActiveSession(pubkey.to_string()));
        }
        inner
            .sessions
            .remove(pubkey)
            .ok_or_else(|| SessionError::UnknownSession(pubkey.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pk(c: char) -> String {
        c.to_string().repeat(64)
    }

    #[tokio::test]
    async fn test_first_session_becomes_active() {
        let registry = SessionRegistry::new();
        registry.add_session(&pk('a'), SessionMethod::Local).await.unwrap();
        registry.add_session(&pk('b'), SessionMethod::Extension).await.unwrap();

        assert_eq!(registry.active().await, Some(pk('a')));
        registry.switch_session(&pk('b')).await.unwrap();
        assert_eq!(registry.active().await, Some(pk('b')));
    }

    #[tokio::test]
    async fn test_rejects_malformed_pubkey() {
        let registry = SessionRegistry::new();
        let err = registry.add_session("npub1", SessionMethod::Local).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_active_session_cannot_be_removed() {
        let registry = SessionRegistry::new();
        registry.add_session(&pk('a'), SessionMethod::Local).await.unwrap();
        registry.add_session(&pk('b'), SessionMethod::Remote).await.unwrap();

        assert_eq!(registry.remove_session(&pk('a')).await, Err(SessionError::ActiveSession(pk('a'))));
        assert!(registry.remove_session(&pk('b')).await.is_ok());
        assert_eq!(registry.pubkeys().await, vec![pk('a')]);
    }

    #[tokio::test]
    async fn test_logout_moves_to_next_session() {
        let registry = SessionRegistry::new();
        registry.add_session(&pk('a'), SessionMethod::Local).await.unwrap();
        registry.add_session(&pk('b'), SessionMethod::Local).await.unwrap();

        assert_eq!(registry.logout().await, Some(pk('a')));
        assert_eq!(registry.active().await, Some(pk('b')));
        assert_eq!(registry.logout().await, Some(pk('b')));
        assert_eq!(registry.logout().await, None);
    }

    #[tokio::test]
    async fn test_settings_merge_last_writer_wins() {
        let registry = SessionRegistry::new();
        registry.add_session(&pk('a'), SessionMethod::Local).await.unwrap();

        let fields = |v: Value| v.as_object().cloned().unwrap();
        registry.update_settings(&pk('a'), 20, fields(json!({"theme": "dark"}))).await.unwrap();
        let changed = registry.update_settings(&pk('a'), 10, fields(json!({"theme": "light", "lang": "en"}))).await.unwrap();

        assert_eq!(changed, 1);
        let session = registry.session(&pk('a')).await.unwrap();
        assert_eq!(session.settings.get("theme"), Some(&json!("dark")));
        assert_eq!(session.settings.get("lang"), Some(&json!("en")));
    }
}
