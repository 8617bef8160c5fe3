//! Session management module for web applications
//!
//! This module provides the live, request-accessible session handle:
//! - Thread-safe operations using `Arc<RwLock<_>>`
//! - Change tracking so unchanged sessions skip the store write
//! - Terminal destruction and id rotation bookkeeping
//! - Customizable session ID generation and clock via builder pattern
//!
//! # Examples
//!
//! ```
//! use sessio::web::session::SessionBuilder;
//! use std::time::Duration;
//!
//! let session = SessionBuilder::new()
//!     .ttl(Duration::from_secs(3600))
//!     .build()
//!     .unwrap();
//!
//! assert!(!session.is_expired());
//! assert!(session.is_new());
//!
//! session.set("last_page", "/dashboard");
//! assert!(session.is_modified());
//! ```

use crate::clock::{SharedClock, system_clock};
use crate::error::Result;
use crate::web::data::SessionData;
use crate::web::id::{SessionIdGenerator, default_session_id_generator};
use crate::web::store::SessionStore;
use crate::web::token;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default session lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

pub(crate) fn ttl_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}

/// Internal session state that requires synchronization
#[derive(Debug, Clone)]
struct SessionState {
    data: SessionData,
    /// Whether the session has changed since it was last persisted
    modified: bool,
    /// Terminal: the record must be deleted and the cookie cleared
    destroyed: bool,
    /// No store round-trip has happened yet
    is_new: bool,
    /// The persisted id replaced by the last rotation, until it is evicted
    old_id: Option<String>,
    /// Bumped by every mutation, so a save only cleans what it wrote
    generation: u64,
}

impl SessionState {
    fn touch(&mut self) {
        self.modified = true;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// A thread-safe session handle
///
/// Clones share the same state, so a handler can hand copies to sub-tasks
/// and every mutation is visible to the commit at the end of the request.
///
/// # Thread Safety
///
/// Readers take a shared lock, writers an exclusive one. No method holds the
/// lock across an `.await`.
///
/// # Examples
///
/// ```
/// use sessio::web::session::SessionBuilder;
///
/// let session = SessionBuilder::new().build().unwrap();
///
/// session.authenticate("user-42");
/// assert!(session.is_authenticated());
/// assert_eq!(session.user_id().as_deref(), Some("user-42"));
///
/// session.mark_clean();
/// assert!(!session.is_modified());
/// ```
#[derive(Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
    clock: SharedClock,
    id_generator: SessionIdGenerator,
}

impl Session {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get the current session ID
    ///
    /// The id changes after [`regenerate`](Self::regenerate).
    #[must_use]
    pub fn id(&self) -> String {
        self.state.read().data.id().to_string()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.state.read().data.created_at()
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.state.read().data.updated_at()
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.state.read().data.expires_at()
    }

    /// Check if the session has expired according to its clock
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = self.now();
        self.state.read().data.is_expired_at(now)
    }

    /// Get a value by key
    ///
    /// # Examples
    ///
    /// ```
    /// use sessio::web::session::SessionBuilder;
    ///
    /// let session = SessionBuilder::new().build().unwrap();
    /// session.set("theme", "dark");
    ///
    /// assert_eq!(session.get("theme"), Some(serde_json::json!("dark")));
    /// assert_eq!(session.get("nonexistent"), None);
    /// ```
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().data.get(key).cloned()
    }

    /// Get a value by key and deserialize it
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Set a value by key and mark as modified
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let now = self.now();
        let mut state = self.state.write();
        state.data.set(key, value, now);
        state.touch();
    }

    /// Serialize `value` and store it under `key`
    ///
    /// # Examples
    ///
    /// ```
    /// use sessio::web::session::SessionBuilder;
    ///
    /// let session = SessionBuilder::new().build().unwrap();
    /// session.insert("cart", &vec![1, 2, 3]).unwrap();
    ///
    /// let cart: Option<Vec<u32>> = session.get_as("cart").unwrap();
    /// assert_eq!(cart, Some(vec![1, 2, 3]));
    /// ```
    pub fn insert<T: Serialize + ?Sized>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Remove a value by key and mark as modified
    pub fn delete(&self, key: &str) -> Option<Value> {
        let now = self.now();
        let mut state = self.state.write();
        state.touch();
        state.data.delete(key, now)
    }

    /// Get all values as a cloned `HashMap`
    #[must_use]
    pub fn values(&self) -> HashMap<String, Value> {
        self.state.read().data.values().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().data.is_authenticated()
    }

    /// The authenticated user, if any
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.state.read().data.user_id().map(str::to_string)
    }

    /// Bind the session to a user
    ///
    /// Pair this with [`regenerate`](Self::regenerate) on login so a
    /// pre-login id cannot be reused.
    pub fn authenticate(&self, user_id: impl Into<String>) {
        let now = self.now();
        let mut state = self.state.write();
        state.data.authenticate(user_id, now);
        state.touch();
    }

    pub fn unauthenticate(&self) {
        let now = self.now();
        let mut state = self.state.write();
        state.data.unauthenticate(now);
        state.touch();
    }

    /// Push the expiry to `now + ttl`
    pub fn renew(&self, ttl: Duration) {
        let now = self.now();
        let mut state = self.state.write();
        state.data.renew(ttl_delta(ttl), now);
        state.touch();
    }

    /// Check if the session has been modified since last save
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.state.read().modified
    }

    /// Clear the modified flag
    ///
    /// Called after the session has been persisted.
    pub fn mark_clean(&self) {
        self.state.write().modified = false;
    }

    /// Replace the session id, keeping the data
    ///
    /// The replaced id is kept as [`old_id`](Self::old_id) until the commit
    /// evicts it from the store. Rotating twice before a commit keeps the
    /// first replaced id, since that is the one the store knows about.
    ///
    /// # Examples
    ///
    /// ```
    /// use sessio::web::session::SessionBuilder;
    ///
    /// let session = SessionBuilder::new().build().unwrap();
    /// let before = session.id();
    ///
    /// session.regenerate().unwrap();
    /// assert_ne!(session.id(), before);
    /// assert_eq!(session.old_id(), Some(before));
    /// ```
    pub fn regenerate(&self) -> Result<()> {
        let new_id = (self.id_generator)()?;
        let mut state = self.state.write();
        let previous = state.data.id().to_string();
        state.data.set_id(new_id);
        state.old_id.get_or_insert(previous);
        state.touch();
        Ok(())
    }

    #[must_use]
    pub fn has_old_id(&self) -> bool {
        self.state.read().old_id.is_some()
    }

    #[must_use]
    pub fn old_id(&self) -> Option<String> {
        self.state.read().old_id.clone()
    }

    pub(crate) fn take_old_id(&self) -> Option<String> {
        self.state.write().old_id.take()
    }

    /// Signed cookie value for the current id
    pub fn signed_id(&self, secret: &[u8]) -> Result<String> {
        token::encode(self.state.read().data.id(), secret)
    }

    /// Mark the session for deletion (e.g., after user logout)
    ///
    /// This is terminal: the commit deletes the record and clears the
    /// cookie, and the session is never persisted again.
    pub fn destroy(&self) {
        let mut state = self.state.write();
        state.destroyed = true;
        state.touch();
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.read().destroyed
    }

    /// Whether the session has never been persisted
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state.read().is_new
    }

    /// Copy of the record to save, with the generation it reflects
    pub(crate) fn pending_save(&self) -> (SessionData, u64) {
        let state = self.state.read();
        (state.data.clone(), state.generation)
    }

    /// Record a successful save of the copy taken at `generation`
    ///
    /// Mutations made while the save was in flight keep the session
    /// modified.
    pub(crate) fn mark_saved(&self, generation: u64) {
        let mut state = self.state.write();
        if state.generation == generation {
            state.modified = false;
        }
        state.is_new = false;
    }

    /// Copy of the current record
    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        self.state.read().data.clone()
    }

    /// Persist now if modified, outside the end-of-request commit
    ///
    /// Destroyed sessions are left to the commit.
    pub async fn flush<St>(&self, store: &St) -> Result<()>
    where
        St: SessionStore + ?Sized,
    {
        let (snapshot, generation) = {
            let state = self.state.read();
            if !state.modified || state.destroyed {
                return Ok(());
            }
            (state.data.clone(), state.generation)
        };

        store.set(&snapshot).await?;
        self.mark_saved(generation);
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

// Two handles are equal when they point at the same live session
impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Serialize for Session {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.state.read().data.serialize(serializer)
    }
}

/// Builder for creating `Session` instances
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use sessio::web::data::SessionData;
/// use sessio::web::session::SessionBuilder;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// // Fresh session with a custom ID generator
/// let session = SessionBuilder::new()
///     .id_generator(Arc::new(|| Ok::<_, sessio::error::Error>("my-session-id".to_string())))
///     .ttl(Duration::from_secs(7200))
///     .build()
///     .unwrap();
/// assert_eq!(session.id(), "my-session-id");
/// assert!(session.is_modified());
///
/// // Session rehydrated from a store read
/// let data = SessionData::new("stored", Utc::now(), TimeDelta::hours(1));
/// let session = SessionBuilder::new().rehydrate(data);
/// assert!(!session.is_modified());
/// assert!(!session.is_new());
/// ```
pub struct SessionBuilder {
    id_generator: SessionIdGenerator,
    clock: SharedClock,
    ttl: Duration,
}

impl SessionBuilder {
    /// Create a new session builder with the default generator and clock
    #[must_use]
    pub fn new() -> Self {
        Self {
            id_generator: default_session_id_generator(),
            clock: system_clock(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Set a custom ID generator
    #[must_use]
    pub fn id_generator(mut self, generator: SessionIdGenerator) -> Self {
        self.id_generator = generator;
        self
    }

    /// Set the time source
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set the lifetime of freshly built sessions
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build a fresh session
    ///
    /// The session starts modified and new, so the first commit persists it.
    pub fn build(self) -> Result<Session> {
        let id = (self.id_generator)()?;
        let data = SessionData::new(id, self.clock.now(), ttl_delta(self.ttl));
        Ok(self.wrap(data, true))
    }

    /// Wrap a record read from a store
    #[must_use]
    pub fn rehydrate(self, data: SessionData) -> Session {
        self.wrap(data, false)
    }

    fn wrap(self, data: SessionData, fresh: bool) -> Session {
        Session {
            state: Arc::new(RwLock::new(SessionState {
                data,
                modified: fresh,
                destroyed: false,
                is_new: fresh,
                old_id: None,
                generation: 0,
            })),
            clock: self.clock,
            id_generator: self.id_generator,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Ensure Session is Send + Sync for thread safety
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Session>;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::web::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::thread;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 14, 15, 0, 0).unwrap()
    }

    fn session_at(clock: &Arc<ManualClock>) -> Session {
        SessionBuilder::new()
            .clock(clock.clone())
            .ttl(Duration::from_secs(3600))
            .build()
            .unwrap()
    }

    #[test]
    fn test_fresh_session_flags() {
        let session = SessionBuilder::new().build().unwrap();

        assert_eq!(session.id().len(), 48);
        assert!(session.is_modified());
        assert!(session.is_new());
        assert!(!session.is_destroyed());
        assert!(!session.has_old_id());
        assert!(!session.is_authenticated());
        assert!(session.values().is_empty());
    }

    #[test]
    fn test_rehydrated_session_flags() {
        let data = SessionData::new("stored", t0(), TimeDelta::hours(1));
        let session = SessionBuilder::new().rehydrate(data);

        assert_eq!(session.id(), "stored");
        assert!(!session.is_modified());
        assert!(!session.is_new());
    }

    #[test]
    fn test_id_generation_failure_propagates() {
        let result = SessionBuilder::new()
            .id_generator(Arc::new(|| -> Result<String> {
                Err(crate::error::Error::from_kind(ErrorKind::IdGeneration))
            }))
            .build();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::IdGeneration);
    }

    #[test]
    fn test_mutations_mark_modified() {
        let clock = Arc::new(ManualClock::new(t0()));
        let session = session_at(&clock);

        let ops: Vec<Box<dyn Fn(&Session)>> = vec![
            Box::new(|s: &Session| s.set("k", "v")),
            Box::new(|s: &Session| {
                s.delete("k");
            }),
            Box::new(|s: &Session| s.authenticate("u")),
            Box::new(|s: &Session| s.unauthenticate()),
            Box::new(|s: &Session| s.renew(Duration::from_secs(60))),
            Box::new(|s: &Session| s.regenerate().unwrap()),
            Box::new(|s: &Session| s.destroy()),
        ];

        for op in ops {
            session.mark_clean();
            assert!(!session.is_modified());
            op(&session);
            assert!(session.is_modified());
        }
    }

    #[test]
    fn test_reads_do_not_mark_modified() {
        let data = SessionData::new("stored", t0(), TimeDelta::hours(1));
        let session = SessionBuilder::new().rehydrate(data);

        let _ = session.get("k");
        let _ = session.values();
        let _ = session.is_expired();
        let _ = session.is_authenticated();
        let _ = session.signed_id(b"secret").unwrap();
        assert!(!session.is_modified());
    }

    #[test]
    fn test_set_bumps_updated_at_from_clock() {
        let clock = Arc::new(ManualClock::new(t0()));
        let session = session_at(&clock);

        clock.advance(TimeDelta::seconds(90));
        session.set("role", "admin");

        assert_eq!(session.updated_at(), t0() + TimeDelta::seconds(90));
        assert_eq!(session.created_at(), t0());
        assert_eq!(session.get("role"), Some(json!("admin")));
    }

    #[test]
    fn test_expiry_follows_clock() {
        let clock = Arc::new(ManualClock::new(t0()));
        let session = session_at(&clock);
        let expires = session.expires_at();
        assert_eq!(expires, t0() + TimeDelta::hours(1));

        clock.set(expires - TimeDelta::nanoseconds(1));
        assert!(!session.is_expired());
        clock.set(expires);
        assert!(session.is_expired());
        clock.set(expires + TimeDelta::nanoseconds(1));
        assert!(session.is_expired());
    }

    #[test]
    fn test_renew_extends_from_now() {
        let clock = Arc::new(ManualClock::new(t0()));
        let session = session_at(&clock);

        clock.advance(TimeDelta::minutes(50));
        session.renew(Duration::from_secs(3600));
        assert_eq!(
            session.expires_at(),
            t0() + TimeDelta::minutes(50) + TimeDelta::hours(1)
        );
    }

    #[test]
    fn test_regenerate_keeps_data_and_first_old_id() {
        let data = SessionData::new("persisted", t0(), TimeDelta::hours(1));
        let session = SessionBuilder::new().rehydrate(data);
        session.set("k", 1);

        session.regenerate().unwrap();
        let intermediate = session.id();
        session.regenerate().unwrap();

        assert_ne!(session.id(), "persisted");
        assert_ne!(session.id(), intermediate);
        assert_eq!(session.old_id().as_deref(), Some("persisted"));
        assert_eq!(session.get("k"), Some(json!(1)));

        assert_eq!(session.take_old_id().as_deref(), Some("persisted"));
        assert!(!session.has_old_id());
    }

    #[test]
    fn test_signed_id_tracks_current_id() {
        let session = SessionBuilder::new().build().unwrap();
        let before = token::decode(&session.signed_id(b"k").unwrap(), b"k").unwrap();
        assert_eq!(before, session.id());

        session.regenerate().unwrap();
        let after = token::decode(&session.signed_id(b"k").unwrap(), b"k").unwrap();
        assert_eq!(after, session.id());
        assert_ne!(before, after);
    }

    #[test]
    fn test_destroy_is_sticky() {
        let session = SessionBuilder::new().build().unwrap();
        session.destroy();
        session.set("k", "v");
        assert!(session.is_destroyed());
    }

    #[test]
    fn test_typed_helpers() {
        let session = SessionBuilder::new().build().unwrap();
        session.insert("prefs", &json!({"lang": "en"})).unwrap();
        session.set("count", "not a number");

        let count: Result<Option<u32>> = session.get_as("count");
        assert_eq!(count.unwrap_err().kind(), ErrorKind::Serialization);
        let missing: Option<u32> = session.get_as("missing").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_clones_share_state() {
        let session = SessionBuilder::new().build().unwrap();
        let clone = session.clone();
        clone.set("shared", true);

        assert_eq!(session.get("shared"), Some(json!(true)));
        assert_eq!(session, clone);
        assert_ne!(session, SessionBuilder::new().build().unwrap());
    }

    #[test]
    fn test_concurrent_set_no_lost_updates() {
        const TASKS: usize = 8;
        const KEYS: usize = 100;

        let data = SessionData::new("stored", t0(), TimeDelta::hours(1));
        let session = SessionBuilder::new().rehydrate(data);
        assert!(!session.is_modified());

        let handles: Vec<_> = (0..TASKS)
            .map(|task| {
                let session = session.clone();
                thread::spawn(move || {
                    for key in 0..KEYS {
                        session.set(format!("task{task}-key{key}"), key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(session.values().len(), TASKS * KEYS);
        assert!(session.is_modified());
    }

    #[test]
    fn test_serialize_as_record() {
        let session = SessionBuilder::new().build().unwrap();
        session.set("k", "v");
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["id"], json!(session.id()));
        assert_eq!(value["data"], json!({"k": "v"}));
    }

    #[test]
    fn test_debug_output() {
        let session = SessionBuilder::new().build().unwrap();
        session.set("theme", "dark");
        let debug = format!("{session:?}");
        assert!(debug.contains("Session"));
        assert!(debug.contains("modified"));
        assert!(debug.contains("dark"));
    }

    #[tokio::test]
    async fn test_flush_persists_and_cleans() {
        let store = MemoryStore::new();
        let session = SessionBuilder::new().build().unwrap();
        session.set("k", "v");

        session.flush(&store).await.unwrap();
        assert!(!session.is_modified());
        assert!(!session.is_new());
        assert_eq!(
            store.get(&session.id()).await.unwrap().get("k"),
            Some(&json!("v"))
        );

        // unchanged: nothing to do
        store.delete(&session.id()).await.unwrap();
        session.flush(&store).await.unwrap();
        assert!(store.is_empty());
    }

    /// Store whose `set` parks after writing until the test releases it
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl SessionStore for GatedStore {
        async fn get(&self, id: &str) -> Result<SessionData> {
            self.inner.get(id).await
        }

        async fn set(&self, data: &SessionData) -> Result<()> {
            self.inner.set(data).await?;
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_flush_keeps_writes_made_during_save() {
        let store = Arc::new(GatedStore::default());
        let session = SessionBuilder::new().build().unwrap();
        session.set("a", 1);

        let flushing = tokio::spawn({
            let store = store.clone();
            let session = session.clone();
            async move { session.flush(&*store).await }
        });

        store.entered.notified().await;
        session.set("b", 2);
        store.release.notify_one();
        flushing.await.unwrap().unwrap();

        assert!(session.is_modified());
        assert!(!session.is_new());
        let stored = store.inner.get(&session.id()).await.unwrap();
        assert_eq!(stored.get("a"), Some(&json!(1)));
        assert!(stored.get("b").is_none());

        store.release.notify_one();
        session.flush(&*store).await.unwrap();
        assert!(!session.is_modified());
        let stored = store.inner.get(&session.id()).await.unwrap();
        assert_eq!(stored.get("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_flush_skips_destroyed() {
        let store = MemoryStore::new();
        let session = SessionBuilder::new().build().unwrap();
        session.destroy();
        session.flush(&store).await.unwrap();
        assert!(store.is_empty());
        assert!(session.is_modified());
    }
}
