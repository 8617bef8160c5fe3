//! Session middleware

use crate::extract::SessionContext;
use crate::set_cookie;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{Cookie, HeaderMapExt};
use futures::future::BoxFuture;
use sessio::clock::SharedClock;
use sessio::config::SessionConfig;
use sessio::error::{Error, Result};
use sessio::web::id::SessionIdGenerator;
use sessio::web::lifecycle::SessionManager;
use sessio::web::store::SessionStore;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::error;

/// Turns a lifecycle failure into the response sent instead of the handler's
pub type ErrorHandler = Arc<dyn Fn(&Error) -> Response + Send + Sync>;

fn internal_error(_err: &Error) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Tower layer installing the session lifecycle on every request
///
/// # Examples
///
/// ```
/// use axum::{Router, routing::get};
/// use sessio::config::SessionConfig;
/// use sessio::web::store::MemoryStore;
/// use sessio_axum::{CurrentSession, SessionLayer};
///
/// async fn visit(session: CurrentSession) -> String {
///     let visits = session.get_as::<u64>("visits").ok().flatten().unwrap_or(0) + 1;
///     session.set("visits", visits);
///     visits.to_string()
/// }
///
/// let layer = SessionLayer::new(MemoryStore::new(), SessionConfig::new("s3cr3t"))?;
/// let app: Router = Router::new().route("/", get(visit)).layer(layer);
/// # Ok::<(), sessio::error::Error>(())
/// ```
pub struct SessionLayer<St> {
    manager: SessionManager<St>,
    error_handler: ErrorHandler,
}

impl<St> Clone for SessionLayer<St> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            error_handler: Arc::clone(&self.error_handler),
        }
    }
}

impl<St> fmt::Debug for SessionLayer<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLayer")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl<St: SessionStore> SessionLayer<St> {
    /// Fails when `config` does not validate
    pub fn new(store: St, config: SessionConfig) -> Result<Self> {
        SessionManager::new(store, config).map(Self::from_manager)
    }

    /// Use a store that the application also holds on to
    pub fn with_shared_store(store: Arc<St>, config: SessionConfig) -> Result<Self> {
        SessionManager::with_shared_store(store, config).map(Self::from_manager)
    }

    #[must_use]
    pub fn from_manager(manager: SessionManager<St>) -> Self {
        Self {
            manager,
            error_handler: Arc::new(internal_error),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.manager = self.manager.with_clock(clock);
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, id_generator: SessionIdGenerator) -> Self {
        self.manager = self.manager.with_id_generator(id_generator);
        self
    }

    /// Replace the default `500 Internal Server Error` response
    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    #[must_use]
    pub const fn manager(&self) -> &SessionManager<St> {
        &self.manager
    }
}

impl<S, St> Layer<S> for SessionLayer<St> {
    type Service = SessionService<S, St>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            manager: self.manager.clone(),
            error_handler: Arc::clone(&self.error_handler),
        }
    }
}

/// Service produced by [`SessionLayer`]
pub struct SessionService<S, St> {
    inner: S,
    manager: SessionManager<St>,
    error_handler: ErrorHandler,
}

impl<S: Clone, St> Clone for SessionService<S, St> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            manager: self.manager.clone(),
            error_handler: Arc::clone(&self.error_handler),
        }
    }
}

impl<S, St> Service<Request> for SessionService<S, St>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    St: SessionStore,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // the clone may not be ready; keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let manager = self.manager.clone();
        let error_handler = Arc::clone(&self.error_handler);

        let cookie = req
            .headers()
            .typed_get::<Cookie>()
            .and_then(|cookies| cookies.get(&manager.config().cookie_name).map(str::to_owned));

        Box::pin(async move {
            let request_session = match manager.begin(cookie.as_deref()).await {
                Ok(request_session) => request_session,
                Err(err) => return Ok(error_handler(&err)),
            };
            req.extensions_mut()
                .insert(SessionContext::new(request_session.clone()));
            req.extensions_mut().insert(request_session.clone());

            let mut response = inner.call(req).await?;

            match request_session.commit().await {
                Ok(Some(directive)) => {
                    let now = manager.clock().now().timestamp();
                    set_cookie::apply(&mut response, manager.config(), &directive, now);
                    Ok(response)
                }
                Ok(None) => Ok(response),
                Err(err) => {
                    error!(error = %err, "session commit failed");
                    Ok(error_handler(&err))
                }
            }
        })
    }
}
