//! # Sessio for axum
//!
//! [`SessionLayer`] runs the `sessio` request lifecycle around every request:
//! it reads the session cookie, exposes the session to extractors, and once
//! the handler has produced its response commits the session and writes
//! `Set-Cookie`.
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use sessio::config::SessionConfig;
//! use sessio::web::store::MemoryStore;
//! use sessio_axum::{CurrentSession, SessionLayer};
//!
//! async fn hello(session: Option<CurrentSession>) -> &'static str {
//!     if session.is_some() { "welcome back" } else { "hello" }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let layer = SessionLayer::new(MemoryStore::new(), SessionConfig::new("s3cr3t"))?;
//! let app = Router::new().route("/", get(hello)).layer(layer);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod extract;
pub mod layer;
pub mod set_cookie;

pub use extract::{Auth, Authenticator, CurrentSession, SessionContext};
pub use layer::{SessionLayer, SessionService};
