//! Session cookie transport.
//!
//! The signed token rides in an `HttpOnly`, `SameSite=Lax` cookie scoped to
//! `/`. [`require_session`] guards page routes: a missing or invalid cookie
//! redirects to `/signin`, a valid one is refreshed on the way out so the
//! session slides forward on every request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use tracing::debug;

use lucentsave_core::models::UserId;
use lucentsave_core::token::{now_ms, IssuedToken};

use crate::server::AppState;

pub const SIGNIN_PATH: &str = "/signin";
pub const HOME_PATH: &str = "/saved";

/// Authenticated caller, inserted into request extensions by
/// [`require_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

/// Cookie attributes shared by every `Set-Cookie` the server emits.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub name: String,
    pub secure: bool,
}

impl SessionCookies {
    /// `Set-Cookie` value carrying `token`.
    pub fn session(&self, token: &IssuedToken) -> String {
        let max_age = ((token.claims.exp - token.claims.iat) / 1000).max(0);
        self.build(&token.value, &http_date(token.claims.exp), max_age)
    }

    /// `Set-Cookie` value that tells the browser to drop the session.
    pub fn cleared(&self) -> String {
        self.build("", &http_date(0), 0)
    }

    fn build(&self, value: &str, expires: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Expires={}; Max-Age={}",
            self.name, value, expires, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Value of the session cookie in `headers`, if present and non-empty.
    pub fn read<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
    }
}

fn http_date(unix_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(unix_ms)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Attach `cookie` as a `Set-Cookie` header.
pub fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Middleware for routes that need a signed-in user.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = match state
        .cookies
        .read(request.headers())
        .map(|token| state.app.tokens().validate(token))
    {
        Some(Ok(claims)) => claims,
        Some(Err(e)) => {
            debug!(error = %e, path = %request.uri().path(), "rejected session");
            return Redirect::to(SIGNIN_PATH).into_response();
        }
        None => return Redirect::to(SIGNIN_PATH).into_response(),
    };

    request.extensions_mut().insert(CurrentUser(claims.sub));
    let response = next.run(request).await;

    let refreshed = state.app.tokens().refresh(&claims, now_ms());
    with_cookie(response, &state.cookies.session(&refreshed))
}

/// Handler for the entry pages: signed-in visitors go home.
pub async fn redirect_if_signed_in(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let signed_in = state
        .cookies
        .read(&headers)
        .is_some_and(|token| state.app.tokens().validate(token).is_ok());
    if signed_in {
        Redirect::to(HOME_PATH).into_response()
    } else {
        axum::http::StatusCode::NO_CONTENT.into_response()
    }
}
