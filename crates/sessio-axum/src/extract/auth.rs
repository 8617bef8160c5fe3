use super::SessionContext;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request;

/// The authenticated user behind the request's session
///
/// The user id comes from `E` (by default the session's authenticated user,
/// see [`Session::authenticate`]) and is resolved to a user by `A`.
///
/// ```
/// use axum::http::StatusCode;
/// use sessio_axum::{Auth, Authenticator};
///
/// #[derive(Clone)]
/// struct Directory;
///
/// impl Authenticator for Directory {
///     type User = String;
///     type Error = StatusCode;
///
///     async fn authenticate(&self, user_id: &str) -> Result<String, StatusCode> {
///         match user_id {
///             "u1" => Ok("Ada".to_string()),
///             _ => Err(StatusCode::FORBIDDEN),
///         }
///     }
///
///     fn unauthenticated() -> StatusCode {
///         StatusCode::UNAUTHORIZED
///     }
/// }
///
/// async fn me(user: Auth<Directory>) -> String {
///     format!("hello {}", *user)
/// }
/// ```
///
/// [`Session::authenticate`]: sessio::web::session::Session::authenticate
pub struct Auth<A, E = FromSession>
where
    A: Authenticator,
    E: UserIdExtractor,
{
    inner: A::User,

    _authenticator_marker: PhantomData<A>,
    _user_id_extractor_marker: PhantomData<E>,
}

impl<A, E> Auth<A, E>
where
    A: Authenticator,
    E: UserIdExtractor,
{
    pub fn into_inner(self) -> A::User {
        self.inner
    }
}

impl<A, E> Deref for Auth<A, E>
where
    A: Authenticator,
    E: UserIdExtractor,
{
    type Target = A::User;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S, A, E> FromRequestParts<S> for Auth<A, E>
where
    S: Send + Sync,
    A: Authenticator + FromRef<S> + Send + Sync,
    E: UserIdExtractor,
{
    type Rejection = A::Error;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        match E::extract(parts).await {
            Some(user_id) => {
                let authenticator = A::from_ref(state);
                let inner = authenticator.authenticate(&user_id).await?;

                Ok(Self {
                    inner,
                    _authenticator_marker: PhantomData,
                    _user_id_extractor_marker: PhantomData,
                })
            }
            None => Err(A::unauthenticated()),
        }
    }
}

impl<S, A, E> OptionalFromRequestParts<S> for Auth<A, E>
where
    S: Send + Sync,
    A: Authenticator + FromRef<S> + Send + Sync,
    E: UserIdExtractor,
{
    type Rejection = ();

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        <Self as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map_or_else(|_| Ok(None), |v| Ok(Some(v)))
    }
}

/// Resolves a user id into the application's user type
pub trait Authenticator {
    type User;
    type Error: axum::response::IntoResponse;

    fn authenticate(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Self::User, Self::Error>> + Send;

    /// Rejection for requests without an authenticated session
    fn unauthenticated() -> Self::Error;
}

/// Where [`Auth`] finds the user id
pub trait UserIdExtractor {
    fn extract(parts: &mut request::Parts) -> impl Future<Output = Option<String>> + Send;
}

/// The user id of the request's authenticated session
pub struct FromSession;

impl UserIdExtractor for FromSession {
    async fn extract(parts: &mut request::Parts) -> Option<String> {
        let session = parts.extensions.get::<SessionContext>()?.session()?;
        session.user_id()
    }
}
