//! Per-request session lifecycle
//!
//! A request moves through three phases:
//!
//! 1. [`SessionManager::begin`] resolves the incoming cookie, loads the
//!    session from the store and, when configured, creates one eagerly.
//! 2. The handler works with the returned [`RequestSession`], creating a
//!    session lazily through [`RequestSession::session_or_create`] if needed.
//! 3. When the response headers are produced, [`RequestSession::commit`]
//!    reconciles the final session state with the store exactly once and
//!    tells the caller which cookie to emit.
//!
//! Framework integrations own the cookie header plumbing; everything else
//! lives here.

use crate::clock::{SharedClock, system_clock};
use crate::config::SessionConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::web::id::{SessionIdGenerator, default_session_id_generator};
use crate::web::session::{Session, SessionBuilder};
use crate::web::store::SessionStore;
use crate::web::token;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Upper bound for background evictions of expired and rotated-out ids
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shorten a session id for log output
#[must_use]
pub fn redact_id(id: &str) -> String {
    let prefix: String = id.chars().take(8).collect();
    format!("{prefix}...")
}

/// What the response should do with the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    /// Emit the signed cookie for the current session
    Set { value: String, max_age: Duration },
    /// Overwrite the client cookie with an empty, already-expired one
    Clear,
    /// Emit nothing
    Leave,
}

/// Result of resolving and loading the request's session
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// The usable session, if any
    pub session: Option<Session>,
    /// The client presented a cookie that must be cleared
    pub clear_cookie: bool,
    /// Why no session was produced, for logging only
    pub error: Option<Error>,
}

impl LoadOutcome {
    fn stale(error: Error) -> Self {
        Self {
            session: None,
            clear_cookie: true,
            error: Some(error),
        }
    }
}

/// Owns everything needed to run the lifecycle: config, store, clock and id
/// generator
///
/// Cheap to clone; clones share the store.
pub struct SessionManager<St> {
    config: Arc<SessionConfig>,
    store: Arc<St>,
    clock: SharedClock,
    id_generator: SessionIdGenerator,
}

impl<St> Clone for SessionManager<St> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            id_generator: Arc::clone(&self.id_generator),
        }
    }
}

impl<St> fmt::Debug for SessionManager<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<St: SessionStore> SessionManager<St> {
    /// Create a manager; fails when the configuration does not validate
    pub fn new(store: St, config: SessionConfig) -> Result<Self> {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Create a manager over a store shared with other components
    pub fn with_shared_store(store: Arc<St>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            store,
            clock: system_clock(),
            id_generator: default_session_id_generator(),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, id_generator: SessionIdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<St> {
        &self.store
    }

    #[must_use]
    pub const fn clock(&self) -> &SharedClock {
        &self.clock
    }

    fn builder(&self) -> SessionBuilder {
        SessionBuilder::new()
            .clock(Arc::clone(&self.clock))
            .id_generator(Arc::clone(&self.id_generator))
            .ttl(self.config.ttl)
    }

    /// Build a fresh, unsaved session with the configured TTL
    pub fn new_session(&self) -> Result<Session> {
        self.builder().build()
    }

    /// Resolve the cookie value and load the session it names
    ///
    /// Never fails: every problem degrades to "no session" and is reported
    /// in [`LoadOutcome::error`].
    pub async fn load(&self, cookie: Option<&str>) -> LoadOutcome {
        let Some(raw) = cookie else {
            return LoadOutcome {
                error: Some(Error::from_kind(ErrorKind::NoCookie)),
                ..LoadOutcome::default()
            };
        };
        if raw.is_empty() {
            return LoadOutcome::stale(Error::invalid_cookie());
        }

        let id = match token::decode(raw, self.config.secret.as_bytes()) {
            Ok(id) => id,
            Err(err) => return LoadOutcome::stale(err),
        };

        let data = match self.store.get(&id).await {
            Ok(data) => data,
            Err(err) => {
                return LoadOutcome {
                    session: None,
                    clear_cookie: false,
                    error: Some(err.with_context_value("session", redact_id(&id))),
                };
            }
        };

        let session = self.builder().rehydrate(data);
        if session.is_expired() {
            self.spawn_delete(id.clone(), "expired");
            return LoadOutcome::stale(Error::expired().with_context_value("session", redact_id(&id)));
        }

        if self.config.auto_renew {
            session.renew(self.config.ttl);
        }

        LoadOutcome {
            session: Some(session),
            ..LoadOutcome::default()
        }
    }

    /// Start the lifecycle for one request
    ///
    /// Only fails when `save_uninitialized` is set and a fresh session
    /// cannot be created.
    pub async fn begin(&self, cookie: Option<&str>) -> Result<RequestSession<St>> {
        let outcome = self.load(cookie).await;
        if let Some(err) = &outcome.error {
            match err.kind() {
                ErrorKind::StoreUnavailable => error!(error = %err, "session load failed"),
                ErrorKind::NoCookie | ErrorKind::SessionNotFound => {
                    debug!(error = %err, "session id resolve failed");
                }
                _ => warn!(error = %err, "session id resolve failed"),
            }
        }

        let mut session = outcome.session;
        if session.is_none() && self.config.save_uninitialized {
            let fresh = self.new_session().inspect_err(|err| {
                error!(error = %err, "failed to create session");
            })?;
            debug!(session = %redact_id(&fresh.id()), "anonymous session created");
            session = Some(fresh);
        }

        Ok(RequestSession::new(self.clone(), session, outcome.clear_cookie))
    }

    /// Delete `id` on a detached task, bounded by [`CLEANUP_TIMEOUT`]
    ///
    /// Failures are logged only. Returns `None` outside a tokio runtime.
    fn spawn_delete(&self, id: String, reason: &'static str) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            warn!(session = %redact_id(&id), reason, "no runtime for background session delete");
            return None;
        };

        let store = Arc::clone(&self.store);
        Some(handle.spawn(async move {
            match tokio::time::timeout(CLEANUP_TIMEOUT, store.delete(&id)).await {
                Ok(Ok(())) => debug!(session = %redact_id(&id), reason, "session evicted"),
                Ok(Err(err)) => {
                    warn!(session = %redact_id(&id), reason, error = %err, "session delete failed");
                }
                Err(_) => warn!(session = %redact_id(&id), reason, "session delete timed out"),
            }
        }))
    }
}

/// Commit state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Committed,
}

/// One-shot transition `Pending -> Committed`
#[derive(Debug, Default)]
struct CommitGuard {
    committed: AtomicBool,
}

impl CommitGuard {
    /// Returns `true` for exactly one caller
    fn try_begin(&self) -> bool {
        self.committed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn state(&self) -> CommitState {
        if self.committed.load(Ordering::Acquire) {
            CommitState::Committed
        } else {
            CommitState::Pending
        }
    }
}

struct RequestInner<St> {
    manager: SessionManager<St>,
    holder: RwLock<Option<Session>>,
    clear_cookie: bool,
    guard: CommitGuard,
}

/// Request-scoped session context
///
/// Carries the optional session, the store, and the commit guard. Clones
/// refer to the same request.
pub struct RequestSession<St> {
    inner: Arc<RequestInner<St>>,
}

impl<St> Clone for RequestSession<St> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<St> fmt::Debug for RequestSession<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSession")
            .field("session", &*self.inner.holder.read())
            .field("clear_cookie", &self.inner.clear_cookie)
            .field("commit", &self.inner.guard.state())
            .finish()
    }
}

impl<St: SessionStore> RequestSession<St> {
    fn new(manager: SessionManager<St>, session: Option<Session>, clear_cookie: bool) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                manager,
                holder: RwLock::new(session),
                clear_cookie,
                guard: CommitGuard::default(),
            }),
        }
    }

    /// The session, if one was loaded or created
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.holder.read().clone()
    }

    /// The session, or [`ErrorKind::SessionNotFound`] when there is none
    pub fn current(&self) -> Result<Session> {
        self.session().ok_or_else(Error::not_found)
    }

    /// The session, creating a fresh one on first demand
    pub fn session_or_create(&self) -> Result<Session> {
        if let Some(session) = self.session() {
            return Ok(session);
        }

        let mut holder = self.inner.holder.write();
        if let Some(session) = holder.as_ref() {
            return Ok(session.clone());
        }
        let session = self.inner.manager.new_session()?;
        debug!(session = %redact_id(&session.id()), "session created on demand");
        *holder = Some(session.clone());
        Ok(session)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<St> {
        self.inner.manager.store()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        self.inner.manager.config()
    }

    /// Whether the incoming cookie was rejected and is due to be cleared
    #[must_use]
    pub fn clears_stale_cookie(&self) -> bool {
        self.inner.clear_cookie
    }

    #[must_use]
    pub fn commit_state(&self) -> CommitState {
        self.inner.guard.state()
    }

    /// Reconcile the final session state with the store
    ///
    /// Runs at most once per request; later calls return `Ok(None)`.
    /// - destroyed: delete the record, then clear the cookie. A failed delete
    ///   is returned as an error and no cookie is cleared.
    /// - modified: persist, then set the cookie.
    /// - unchanged: no store write, the cookie is re-issued.
    /// - in both cases a rotated-out id is evicted in the background.
    /// - no session: clear a rejected incoming cookie, otherwise do nothing.
    pub async fn commit(&self) -> Result<Option<CookieDirective>> {
        if !self.inner.guard.try_begin() {
            return Ok(None);
        }

        let manager = &self.inner.manager;
        let Some(session) = self.session() else {
            return Ok(Some(if self.inner.clear_cookie {
                CookieDirective::Clear
            } else {
                CookieDirective::Leave
            }));
        };

        if session.is_destroyed() {
            let id = session.id();
            manager.store.delete(&id).await.inspect_err(|err| {
                error!(session = %redact_id(&id), error = %err, "failed to delete destroyed session");
            })?;
            if let Some(old_id) = session.take_old_id() {
                manager.spawn_delete(old_id, "destroyed");
            }
            debug!(session = %redact_id(&id), "session destroyed");
            return Ok(Some(CookieDirective::Clear));
        }

        if session.is_modified() {
            let (snapshot, generation) = session.pending_save();
            manager.store.set(&snapshot).await.inspect_err(|err| {
                error!(session = %redact_id(snapshot.id()), error = %err, "failed to save session");
            })?;
            session.mark_saved(generation);
        }

        // the new id is persisted by now, either above or by an earlier flush
        if let Some(old_id) = session.take_old_id() {
            debug!(
                old = %redact_id(&old_id),
                new = %redact_id(&session.id()),
                "session id rotated"
            );
            manager.spawn_delete(old_id, "rotated");
        }

        let value = session.signed_id(manager.config.secret.as_bytes())?;
        Ok(Some(CookieDirective::Set {
            value,
            max_age: manager.config.ttl,
        }))
    }
}
