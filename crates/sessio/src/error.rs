//! Error handling module for Sessio
//!
//! Every fallible operation in the crate returns [`Error`], which carries:
//! - An [`ErrorKind`] classifying the failure
//! - A human readable message
//! - An optional source error for error chaining
//! - An optional backtrace for debugging
//! - Context key-value pairs for additional information

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

/// Classification of session failures
///
/// Cookie and load failures degrade to "no session" inside the request
/// lifecycle; store and id generation failures abort the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// The request carried no session cookie
    #[error("no session cookie")]
    NoCookie,
    /// The cookie was present but empty or unreadable
    #[error("invalid session cookie")]
    InvalidCookie,
    /// The cookie envelope was malformed or its signature did not verify
    #[error("invalid cookie signature")]
    InvalidSignature,
    /// The store holds no record for the id
    #[error("session not found")]
    SessionNotFound,
    /// The record exists but is past its expiry
    #[error("session expired")]
    SessionExpired,
    /// The storage backend failed
    #[error("session store unavailable")]
    StoreUnavailable,
    /// The random source could not produce an identifier
    #[error("failed to generate session id")]
    IdGeneration,
    /// A session value could not be converted to or from JSON
    #[error("session value serialization failed")]
    Serialization,
    /// The configuration is unusable
    #[error("invalid session configuration")]
    InvalidConfig,
    /// No request session was attached to the request
    #[error("session missing from request context")]
    MissingContext,
}

impl ErrorKind {
    /// HTTP status code used when this kind reaches the client
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::NoCookie | Self::InvalidCookie | Self::InvalidSignature => 400,
            Self::SessionExpired => 401,
            Self::SessionNotFound => 404,
            Self::StoreUnavailable
            | Self::IdGeneration
            | Self::Serialization
            | Self::InvalidConfig
            | Self::MissingContext => 500,
        }
    }
}

/// The error type for the Sessio library
///
/// # Examples
///
/// ```
/// use sessio::error::{Error, ErrorKind};
///
/// let err = Error::store("connection refused")
///     .with_context_value("backend", "redis");
///
/// assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
/// assert_eq!(err.get_context("backend"), Some("redis"));
/// assert!(err.is_store_failure());
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
    backtrace: Option<Box<Backtrace>>,
    context: HashMap<String, String>,
}

impl Error {
    /// Create a new error of the given kind
    ///
    /// By default, backtrace is not captured for performance.
    /// Use [`with_backtrace`](Self::with_backtrace) to enable it.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            backtrace: None,
            context: HashMap::new(),
        }
    }

    /// Create an error whose message is the kind's description
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.to_string())
    }

    /// Cookie present but empty or unreadable
    #[must_use]
    pub fn invalid_cookie() -> Self {
        Self::from_kind(ErrorKind::InvalidCookie)
    }

    /// Malformed or forged token
    ///
    /// The message never reveals which check failed.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::from_kind(ErrorKind::InvalidSignature)
    }

    /// Store miss
    #[must_use]
    pub fn not_found() -> Self {
        Self::from_kind(ErrorKind::SessionNotFound)
    }

    /// Record found but past its expiry
    #[must_use]
    pub fn expired() -> Self {
        Self::from_kind(ErrorKind::SessionExpired)
    }

    /// Backend I/O failure
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreUnavailable, message)
    }

    /// Configuration validation failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    /// Add a source error (builder pattern)
    ///
    /// # Examples
    ///
    /// ```
    /// use sessio::error::Error;
    /// use std::error::Error as _;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
    /// let err = Error::store("failed to write session").with_source(io_err);
    /// assert!(err.source().is_some());
    /// ```
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Add a single context key-value pair (builder pattern)
    #[must_use]
    pub fn with_context_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Enable backtrace capture for debugging
    #[must_use]
    pub fn with_backtrace(mut self) -> Self {
        self.backtrace = Some(Box::new(Backtrace::capture()));
        self
    }

    /// Get the error kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code for this error
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Get the backtrace if available
    #[must_use]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get all context information as a `HashMap`
    #[must_use]
    pub const fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Get a specific context value by key
    pub fn get_context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Whether the error came from a store backend
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        self.kind == ErrorKind::StoreUnavailable
    }

    /// Whether the error is a store miss
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::SessionNotFound
    }

    /// Whether the presented cookie could not be trusted
    #[must_use]
    pub fn is_cookie_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::InvalidCookie | ErrorKind::InvalidSignature
        )
    }

    /// Returns an iterator over the entire error chain, starting from this error
    #[must_use]
    pub fn iter_error_chain(&self) -> ErrorChainIter<'_> {
        ErrorChainIter {
            current: Some(self),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::from_kind(ErrorKind::Serialization).with_source(err)
    }
}

/// Iterator over the complete error chain
///
/// Created by the [`Error::iter_error_chain`] method.
#[derive(Debug, Clone)]
pub struct ErrorChainIter<'a> {
    current: Option<&'a (dyn StdError + 'static)>,
}

impl<'a> Iterator for ErrorChainIter<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.source();
        Some(current)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message == self.kind.to_string() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }

        if !self.context.is_empty() {
            let mut pairs: Vec<_> = self.context.iter().collect();
            pairs.sort();
            write!(f, " (")?;
            let mut first = true;
            for (key, value) in pairs {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: {value}")?;
                first = false;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Error>;
};

/// Convenience type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_message_default() {
        let err = Error::invalid_signature();
        assert_eq!(err.kind(), ErrorKind::InvalidSignature);
        assert_eq!(err.to_string(), "invalid cookie signature");
        assert!(err.backtrace().is_none());
    }

    #[test]
    fn test_display_with_message_and_context() {
        let err = Error::store("timeout")
            .with_context_value("op", "set")
            .with_context_value("backend", "memory");
        assert_eq!(
            err.to_string(),
            "session store unavailable: timeout (backend: memory, op: set)"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::invalid_cookie().status_code(), 400);
        assert_eq!(Error::expired().status_code(), 401);
        assert_eq!(Error::not_found().status_code(), 404);
        assert_eq!(Error::store("down").status_code(), 500);
        assert_eq!(Error::from_kind(ErrorKind::IdGeneration).status_code(), 500);
    }

    #[test]
    fn test_error_chain_iterator() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::store("write failed").with_source(io_err);

        let chain: Vec<_> = err.iter_error_chain().collect();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].to_string().contains("pipe closed"));
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Error::invalid_cookie().is_cookie_failure());
        assert!(Error::invalid_signature().is_cookie_failure());
        assert!(!Error::expired().is_cookie_failure());
        assert!(Error::not_found().is_not_found());
        assert!(Error::store("x").is_store_failure());
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_with_backtrace() {
        let err = Error::from(ErrorKind::IdGeneration).with_backtrace();
        assert!(err.backtrace().is_some());
    }
}
