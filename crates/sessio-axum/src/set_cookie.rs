//! `Set-Cookie` rendering for [`CookieDirective`]s

use axum::http::HeaderValue;
use axum::http::header::SET_COOKIE;
use axum::response::Response;
use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite as CookieSameSite};
use sessio::config::{SameSite, SessionConfig};
use sessio::web::lifecycle::CookieDirective;
use tracing::warn;

const fn same_site(value: SameSite) -> CookieSameSite {
    match value {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    }
}

/// Build the cookie for `directive`, `now` being seconds since the epoch
///
/// [`CookieDirective::Leave`] yields `None`. A cleared cookie has an empty
/// value, `Max-Age=-1` and an epoch `Expires`.
#[must_use]
pub fn session_cookie(
    config: &SessionConfig,
    directive: &CookieDirective,
    now: i64,
) -> Option<Cookie<'static>> {
    let (value, max_age, expires) = match directive {
        CookieDirective::Leave => return None,
        CookieDirective::Clear => (
            String::new(),
            Duration::seconds(-1),
            Some(OffsetDateTime::UNIX_EPOCH),
        ),
        CookieDirective::Set { value, max_age } => {
            let max_age = Duration::try_from(*max_age).unwrap_or(Duration::MAX);
            let expires = OffsetDateTime::from_unix_timestamp(now)
                .ok()
                .and_then(|now| now.checked_add(max_age));
            (value.clone(), max_age, expires)
        }
    };

    let mut builder = Cookie::build((config.cookie_name.clone(), value))
        .path(config.path.clone())
        .max_age(max_age)
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(same_site(config.same_site));
    if let Some(expires) = expires {
        builder = builder.expires(expires);
    }
    Some(builder.build())
}

/// Append the cookie for `directive` to `response`
pub fn apply(response: &mut Response, config: &SessionConfig, directive: &CookieDirective, now: i64) {
    let Some(cookie) = session_cookie(config, directive, now) else {
        return;
    };
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => warn!(error = %err, "session cookie is not a valid header value"),
    }
}
