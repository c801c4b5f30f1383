use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use uuid::Uuid;

use crate::session::SESSION_COOKIE;

/// The anonymous visitor behind a request, identified by an encrypted cookie.
///
/// A first-time visitor gets a fresh id; return `jar` with the response so the
/// cookie is set.
pub struct Visitor {
    pub id: Uuid,
    pub jar: PrivateCookieJar,
}

#[async_trait]
impl<S> FromRequestParts<S> for Visitor
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::<Key>::from_request_parts(parts, state).await?;
        let existing = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok());

        if let Some(id) = existing {
            return Ok(Self { id, jar });
        }

        let id = Uuid::new_v4();
        let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        Ok(Self {
            id,
            jar: jar.add(cookie),
        })
    }
}
