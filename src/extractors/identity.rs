//! Request identity: who is calling (e.g. X-User-ID header).

use crate::authorization::UserId;
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Header name for the caller's user id. Default: `X-User-ID`.
pub const USER_ID_HEADER: &str = "X-User-ID";

/// Resolves the caller's identity from request headers. Issuing and verifying
/// credentials is left to the implementation.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` when the request carries no identity at all.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserId>, AppError>;
}

/// Trusts the `X-User-ID` header as set by an upstream gateway.
#[derive(Clone, Debug, Default)]
pub struct HeaderAuthenticator;

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserId>, AppError> {
        let value = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match value {
            None => Ok(None),
            Some(s) => s
                .parse::<i64>()
                .map(|id| Some(UserId(id)))
                .map_err(|_| AppError::Unauthorized("Invalid user identity".into())),
        }
    }
}

/// Identity established by the route guard; `None` on unprotected routes without one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub Option<UserId>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().copied().unwrap_or(CurrentUser(None)))
    }
}
