use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::session::Session;

/// Create the encrypted session cookie.
pub(super) fn session_cookie(
    name: &str,
    value: String,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

/// Create removal cookie for session.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Read the session from cookies. Missing, undecryptable and expired sessions are `None`.
pub(super) fn get_session(jar: &PrivateCookieJar, name: &str) -> Option<Session> {
    jar.get(name)
        .and_then(|c| Session::decode(c.value(), OffsetDateTime::now_utc()))
}
