//! The persisted session record
//!
//! [`SessionData`] is plain data: no locking, no clock. Callers pass the
//! current instant into every timestamped operation; [`Session`] does that
//! with its own clock and lock.
//!
//! [`Session`]: crate::web::session::Session

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Persisted unit of session state
///
/// Serializes to the backend-agnostic record shape
/// `{ id, data, created_at, expires_at, updated_at, authenticated, user_id }`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use sessio::web::data::SessionData;
///
/// let now = Utc::now();
/// let mut data = SessionData::new("abc", now, TimeDelta::hours(1));
/// data.set("role", "admin", now);
///
/// assert_eq!(data.get("role"), Some(&serde_json::json!("admin")));
/// assert!(!data.is_expired_at(now));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    id: String,
    #[serde(default)]
    data: HashMap<String, Value>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user_id: String,
}

impl SessionData {
    /// Create an empty record that expires `ttl` after `now`
    ///
    /// A negative `ttl` is clamped to zero so `expires_at >= created_at`.
    pub fn new(id: impl Into<String>, now: DateTime<Utc>, ttl: TimeDelta) -> Self {
        Self {
            id: id.into(),
            data: HashMap::new(),
            created_at: now,
            expires_at: expiry_after(now, ttl),
            updated_at: now,
            authenticated: false,
            user_id: String::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// All stored values
    #[must_use]
    pub const fn values(&self) -> &HashMap<String, Value> {
        &self.data
    }

    /// Mutable access to the value map, for store backends and tests
    ///
    /// Does not touch `updated_at`.
    pub fn values_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.data
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The authenticated user, if any
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.authenticated.then_some(self.user_id.as_str())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Insert or overwrite a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>, now: DateTime<Utc>) {
        self.data.insert(key.into(), value.into());
        self.updated_at = now;
    }

    /// Remove a value
    ///
    /// `updated_at` moves even when the key was absent.
    pub fn delete(&mut self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let removed = self.data.remove(key);
        self.updated_at = now;
        removed
    }

    pub fn authenticate(&mut self, user_id: impl Into<String>, now: DateTime<Utc>) {
        self.authenticated = true;
        self.user_id = user_id.into();
        self.updated_at = now;
    }

    pub fn unauthenticate(&mut self, now: DateTime<Utc>) {
        self.authenticated = false;
        self.user_id.clear();
        self.updated_at = now;
    }

    /// Push expiry to `now + ttl`
    pub fn renew(&mut self, ttl: TimeDelta, now: DateTime<Utc>) {
        self.expires_at = expiry_after(now, ttl);
        self.updated_at = now;
    }

    /// Whether the record is expired at `now`
    ///
    /// The expiry instant itself already counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(ttl.max(TimeDelta::zero()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
