//! Session persistence
//!
//! [`SessionStore`] is the three-method contract every backend satisfies.
//! [`MemoryStore`] is the reference implementation.

use crate::clock::{SharedClock, system_clock};
use crate::error::{Error, Result};
use crate::web::data::SessionData;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;

/// Trait for session storage backends
///
/// Implement this trait to provide custom session storage solutions
/// (e.g., Redis, a relational database, ...). Methods are cancelled by
/// dropping their future, so callers bound them with `tokio::time::timeout`.
///
/// Contract:
/// - `get` fails with [`ErrorKind::SessionNotFound`] when the id is absent.
///   Backends may also report logically expired records as absent; the
///   lifecycle re-checks expiry after every load regardless.
/// - `set` upserts by id. The stored record must not alias the caller's
///   buffers: mutating the caller's value after `set` returns must not
///   change what a later `get` returns.
/// - `delete` is idempotent. Deleting an absent id succeeds.
/// - Backend I/O failures are reported as [`ErrorKind::StoreUnavailable`].
///
/// # Examples
///
/// ```
/// use sessio::error::{Error, Result};
/// use sessio::web::data::SessionData;
/// use sessio::web::store::SessionStore;
/// use std::collections::HashMap;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct VecStore {
///     records: Mutex<HashMap<String, String>>,
/// }
///
/// impl SessionStore for VecStore {
///     async fn get(&self, id: &str) -> Result<SessionData> {
///         let records = self.records.lock().map_err(|e| Error::store(e.to_string()))?;
///         let json = records.get(id).ok_or_else(Error::not_found)?;
///         Ok(serde_json::from_str(json)?)
///     }
///
///     async fn set(&self, data: &SessionData) -> Result<()> {
///         let json = serde_json::to_string(data)?;
///         let mut records = self.records.lock().map_err(|e| Error::store(e.to_string()))?;
///         records.insert(data.id().to_string(), json);
///         Ok(())
///     }
///
///     async fn delete(&self, id: &str) -> Result<()> {
///         let mut records = self.records.lock().map_err(|e| Error::store(e.to_string()))?;
///         records.remove(id);
///         Ok(())
///     }
/// }
/// ```
///
/// [`ErrorKind::SessionNotFound`]: crate::error::ErrorKind::SessionNotFound
/// [`ErrorKind::StoreUnavailable`]: crate::error::ErrorKind::StoreUnavailable
pub trait SessionStore: Send + Sync + 'static {
    /// Load a session by ID
    fn get(&self, id: &str) -> impl Future<Output = Result<SessionData>> + Send;

    /// Insert or replace a session
    fn set(&self, data: &SessionData) -> impl Future<Output = Result<()>> + Send;

    /// Delete a session by ID
    fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// In-memory store
///
/// Records are deep-copied on the way in and on the way out, so no caller
/// ever shares a buffer with the stored state. Expired records stay until
/// [`cleanup_expired`](Self::cleanup_expired) runs or the lifecycle evicts
/// them on load.
///
/// # Examples
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use chrono::{TimeDelta, Utc};
/// use sessio::web::data::SessionData;
/// use sessio::web::store::{MemoryStore, SessionStore};
///
/// let store = MemoryStore::new();
/// let data = SessionData::new("abc", Utc::now(), TimeDelta::hours(1));
/// store.set(&data).await.unwrap();
///
/// assert_eq!(store.get("abc").await.unwrap(), data);
/// store.delete("abc").await.unwrap();
/// assert!(store.get("abc").await.unwrap_err().is_not_found());
/// # });
/// ```
pub struct MemoryStore {
    records: RwLock<HashMap<String, SessionData>>,
    clock: SharedClock,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Use `clock` to decide expiry in [`cleanup_expired`](Self::cleanup_expired)
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored records, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Evict every expired record
    ///
    /// Returns the number of records removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, data| !data.is_expired_at(now));
        before - records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<SessionData> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(Error::not_found)
    }

    async fn set(&self, data: &SessionData) -> Result<()> {
        let copy = data.clone();
        self.records.write().insert(copy.id().to_string(), copy);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 14, 15, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new();
        let mut data = SessionData::new("a", t0(), TimeDelta::hours(1));
        data.set("role", "admin", t0());
        store.set(&data).await.unwrap();

        let loaded = store.get("a").await.unwrap();
        assert_eq!(loaded.get("role"), Some(&json!("admin")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_copies_caller_data() {
        let store = MemoryStore::new();
        let mut data = SessionData::new("a", t0(), TimeDelta::hours(1));
        data.set("k", "original", t0());
        store.set(&data).await.unwrap();

        data.values_mut().insert("k".into(), json!("mutated"));
        data.values_mut().insert("extra".into(), json!(1));

        let loaded = store.get("a").await.unwrap();
        assert_eq!(loaded.get("k"), Some(&json!("original")));
        assert!(loaded.get("extra").is_none());
    }

    #[tokio::test]
    async fn test_get_returns_independent_copy() {
        let store = MemoryStore::new();
        let data = SessionData::new("a", t0(), TimeDelta::hours(1));
        store.set(&data).await.unwrap();

        let mut first = store.get("a").await.unwrap();
        first.values_mut().insert("k".into(), json!(true));

        let second = store.get("a").await.unwrap();
        assert!(second.get("k").is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();
        let mut data = SessionData::new("a", t0(), TimeDelta::hours(1));
        store.set(&data).await.unwrap();
        data.set("n", 2, t0());
        store.set(&data).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").await.unwrap().get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete("never-existed").await.unwrap();

        let data = SessionData::new("a", t0(), TimeDelta::hours(1));
        store.set(&data).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MemoryStore::with_clock(clock.clone());

        store
            .set(&SessionData::new("short", t0(), TimeDelta::minutes(1)))
            .await
            .unwrap();
        store
            .set(&SessionData::new("long", t0(), TimeDelta::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.cleanup_expired(), 0);
        clock.advance(TimeDelta::minutes(1));
        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.get("short").await.is_err());
        assert!(store.get("long").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_distinct_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("id-{i}");
                let mut data = SessionData::new(id.clone(), t0(), TimeDelta::hours(1));
                data.set("owner", i, t0());
                store.set(&data).await.unwrap();
                store.get(&id).await.unwrap()
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let data = handle.await.unwrap();
            assert_eq!(data.get("owner"), Some(&json!(i)));
        }
        assert_eq!(store.len(), 16);
    }
}
