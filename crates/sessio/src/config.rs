//! Session configuration
//!
//! [`SessionConfig`] can be built in code or deserialized from any serde
//! format. Every field except `secret` has a default:
//!
//! | field                | default |
//! |----------------------|---------|
//! | `cookie_name`        | `sid`   |
//! | `ttl` (seconds)      | `3600`  |
//! | `http_only`          | `true`  |
//! | `secure`             | `false` |
//! | `same_site`          | `lax`   |
//! | `save_uninitialized` | `false` |
//! | `auto_renew`         | `false` |
//! | `path`               | `/`     |

use crate::error::{Error, Result};
use crate::web::session::DEFAULT_TTL;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;

/// Default cookie name
pub const DEFAULT_COOKIE_NAME: &str = "sid";

/// Cookie `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// Signing secret, redacted in debug output
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Cookie and lifecycle options
///
/// # Examples
///
/// ```
/// use sessio::config::{SameSite, SessionConfig};
/// use std::time::Duration;
///
/// let config = SessionConfig::new("change-me")
///     .with_cookie_name("app.sid")
///     .with_ttl(Duration::from_secs(1800))
///     .with_secure(true)
///     .with_same_site(SameSite::Strict);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.cookie_name, "app.sid");
///
/// let from_json: SessionConfig =
///     serde_json::from_str(r#"{ "secret": "s3cr3t", "ttl": 60, "auto_renew": true }"#).unwrap();
/// assert_eq!(from_json.ttl, Duration::from_secs(60));
/// assert_eq!(from_json.cookie_name, "sid");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for cookie signatures
    pub secret: Secret,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Session lifetime, also the cookie Max-Age
    #[serde(default = "default_ttl", deserialize_with = "deserialize_secs")]
    pub ttl: Duration,
    #[serde(default = "default_true")]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
    /// Create and persist a session even for requests that never touch it
    #[serde(default)]
    pub save_uninitialized: bool,
    /// Renew the expiry of every session loaded from the store
    #[serde(default)]
    pub auto_renew: bool,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

const fn default_ttl() -> Duration {
    DEFAULT_TTL
}

const fn default_true() -> bool {
    true
}

fn default_path() -> String {
    "/".to_string()
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl SessionConfig {
    /// Defaults plus the given signing secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Secret::new(secret),
            cookie_name: default_cookie_name(),
            ttl: DEFAULT_TTL,
            http_only: true,
            secure: false,
            same_site: SameSite::default(),
            save_uninitialized: false,
            auto_renew: false,
            path: default_path(),
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub const fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub const fn with_save_uninitialized(mut self, save_uninitialized: bool) -> Self {
        self.save_uninitialized = save_uninitialized;
        self
    }

    #[must_use]
    pub const fn with_auto_renew(mut self, auto_renew: bool) -> Self {
        self.auto_renew = auto_renew;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(Error::config("secret must not be empty"));
        }
        if self.cookie_name.is_empty() {
            return Err(Error::config("cookie name must not be empty"));
        }
        if self.ttl.is_zero() {
            return Err(Error::config("ttl must be greater than zero"));
        }
        Ok(())
    }
}
