use super::SessionContext;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::{StatusCode, request};
use axum::response::{IntoResponse, Response};
use sessio::error::{Error, ErrorKind};
use sessio::web::session::Session;
use std::ops::Deref;

/// The request's session, created when the request has none
///
/// As `Option<CurrentSession>` it never creates one.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl CurrentSession {
    #[must_use]
    pub fn into_inner(self) -> Session {
        self.0
    }
}

impl Deref for CurrentSession {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Why a session could not be extracted
#[derive(Debug)]
pub struct SessionRejection(pub Error);

impl SessionRejection {
    fn missing_layer() -> Self {
        Self(Error::new(
            ErrorKind::MissingContext,
            "session layer is not installed on this route",
        ))
    }
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.0.message().to_string()).into_response()
    }
}

fn context(parts: &request::Parts) -> Result<&SessionContext, SessionRejection> {
    parts
        .extensions
        .get::<SessionContext>()
        .ok_or_else(SessionRejection::missing_layer)
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        context(parts)?
            .session_or_create()
            .map(Self)
            .map_err(SessionRejection)
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut request::Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(context(parts)?.session().map(Self))
    }
}
