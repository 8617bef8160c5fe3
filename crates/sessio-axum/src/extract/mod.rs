//! Request extractors
//!
//! [`SessionLayer`](crate::SessionLayer) puts a [`SessionContext`] into the
//! request extensions; every extractor here starts from it.

mod auth;
mod session;

pub use auth::{Auth, Authenticator, FromSession, UserIdExtractor};
pub use session::{CurrentSession, SessionRejection};

use sessio::error::Result;
use sessio::web::lifecycle::RequestSession;
use sessio::web::session::Session;
use sessio::web::store::SessionStore;
use std::fmt;
use std::sync::Arc;

trait LazySession: Send + Sync {
    fn session(&self) -> Option<Session>;
    fn session_or_create(&self) -> Result<Session>;
}

impl<St: SessionStore> LazySession for RequestSession<St> {
    fn session(&self) -> Option<Session> {
        RequestSession::session(self)
    }

    fn session_or_create(&self) -> Result<Session> {
        RequestSession::session_or_create(self)
    }
}

/// Store-independent view of the request's session
///
/// The typed [`RequestSession`] is in the extensions as well, for code that
/// knows the store type.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<dyn LazySession>,
}

impl SessionContext {
    pub(crate) fn new<St: SessionStore>(request_session: RequestSession<St>) -> Self {
        Self {
            inner: Arc::new(request_session),
        }
    }

    /// The session, if the request carried one or a handler created one
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.session()
    }

    /// The session, created on first demand
    pub fn session_or_create(&self) -> Result<Session> {
        self.inner.session_or_create()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", &self.session())
            .finish()
    }
}
