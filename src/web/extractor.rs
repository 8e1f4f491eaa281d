use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;
use time::OffsetDateTime;

use super::cookies;
use super::error::WebError;
use super::state::AppState;
use crate::session::Session;
use crate::traits::{DnsProvider, PortalStore};
use crate::types::{Identity, Role, has_role};

/// The caller's session, loaded from the sealed cookie.
///
/// Handlers that change the session must return [`commit()`](Self::commit)'s jar so the
/// new state reaches the browser. A missing, tampered or expired cookie yields a fresh
/// empty session.
///
/// ```rust,ignore
/// async fn handler(mut ctx: SessionContext) -> (PrivateCookieJar, &'static str) {
///     ctx.session.begin_handshake(nonce);
///     (ctx.commit(), "ok")
/// }
/// ```
pub struct SessionContext {
    pub session: Session,
    jar: PrivateCookieJar,
    cookie_name: String,
    secure: bool,
}

impl SessionContext {
    /// Replace the session with a fresh empty one (start of a new login).
    pub fn renew(&mut self, ttl: time::Duration) {
        self.session = Session::new(ttl);
    }

    /// Write the session back into the cookie jar.
    #[must_use]
    pub fn commit(self) -> PrivateCookieJar {
        let remaining = self.session.remaining(OffsetDateTime::now_utc());
        match self.session.encode() {
            Ok(value) => self.jar.add(cookies::session_cookie(
                &self.cookie_name,
                value,
                remaining,
                self.secure,
            )),
            Err(e) => {
                tracing::error!(error = %e, "Session encoding failed");
                self.jar
            }
        }
    }

    /// Drop the session cookie (logout).
    #[must_use]
    pub fn destroy(self) -> PrivateCookieJar {
        self.jar
            .remove(cookies::clear_session_cookie(&self.cookie_name))
    }
}

impl<S, D> FromRequestParts<AppState<S, D>> for SessionContext
where
    S: PortalStore,
    D: DnsProvider,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, D>,
    ) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, Key::from_ref(state));
        let settings = &state.settings;
        let session = cookies::get_session(&jar, &settings.session_cookie_name)
            .unwrap_or_else(|| Session::new(settings.session_ttl));

        Ok(Self {
            session,
            jar,
            cookie_name: settings.session_cookie_name.clone(),
            secure: settings.secure_cookies,
        })
    }
}

/// Authenticated identity from the session. Rejects with `401` when absent.
///
/// ```rust,ignore
/// async fn protected(AuthenticatedUser(identity): AuthenticatedUser) -> String {
///     format!("Hello, {}", identity.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl<S, D> FromRequestParts<AppState<S, D>> for AuthenticatedUser
where
    S: PortalStore,
    D: DnsProvider,
{
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, D>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = SessionContext::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|never| match never {});
        ctx.session
            .identity()
            .cloned()
            .map(Self)
            .ok_or(WebError::Unauthenticated)
    }
}

/// Identity holding [`Role::Admin`]. Rejects with `403` otherwise, signed in or not.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

impl<S, D> FromRequestParts<AppState<S, D>> for AdminUser
where
    S: PortalStore,
    D: DnsProvider,
{
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, D>,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(identity) = AuthenticatedUser::from_request_parts(parts, state)
            .await
            .map_err(|_| WebError::Forbidden)?;
        if has_role(&identity, Role::Admin) {
            Ok(Self(identity))
        } else {
            tracing::warn!(external_id = %identity.external_id, "Admin access denied");
            Err(WebError::Forbidden)
        }
    }
}
