//! # Sessio
//!
//! Server-side HTTP sessions: an opaque id in an HMAC-signed cookie, the
//! session state in a pluggable store, and a deferred commit that reconciles
//! the two exactly once per request.
//!
//! - [`web::session::Session`] is the handle handlers mutate.
//! - [`web::store::SessionStore`] is the persistence contract, with
//!   [`web::store::MemoryStore`] as the in-process implementation.
//! - [`web::lifecycle::SessionManager`] runs the per-request lifecycle;
//!   framework crates such as `sessio-axum` drive it.
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use sessio::config::SessionConfig;
//! use sessio::web::lifecycle::{CookieDirective, SessionManager};
//! use sessio::web::store::MemoryStore;
//!
//! let manager = SessionManager::new(MemoryStore::new(), SessionConfig::new("s3cr3t"))?;
//!
//! // first request: no cookie, the handler stores a value
//! let request = manager.begin(None).await?;
//! request.session_or_create()?.set("visits", 1);
//! let Some(CookieDirective::Set { value, .. }) = request.commit().await? else {
//!     unreachable!()
//! };
//!
//! // second request presents the signed cookie
//! let request = manager.begin(Some(&value)).await?;
//! assert_eq!(request.current()?.get("visits"), Some(1.into()));
//! # Ok::<(), sessio::error::Error>(())
//! # }).unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod clock;
pub mod config;
pub mod error;
pub mod web;

pub use config::SessionConfig;
pub use error::{Error, ErrorKind, Result};
pub use web::lifecycle::{CookieDirective, RequestSession, SessionManager};
pub use web::session::Session;
pub use web::store::{MemoryStore, SessionStore};
