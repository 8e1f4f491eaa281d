//! Per-browser security context.
//!
//! A [`Session`] is a small typed token carrying at most a pending SSO nonce and an
//! authenticated [`Identity`]. It travels in an encrypted cookie (see `web::cookies`)
//! and is handed to every handler explicitly.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::types::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
    /// Unix seconds.
    expires_at: i64,
}

impl Session {
    /// Empty session expiring `ttl` from now.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending_nonce: None,
            identity: None,
            expires_at: OffsetDateTime::now_utc()
                .unix_timestamp()
                .saturating_add(ttl.whole_seconds()),
        }
    }

    /// Record the nonce of a login that was just started. Replaces any earlier one.
    pub fn begin_handshake(&mut self, nonce: String) {
        self.pending_nonce = Some(nonce);
    }

    #[must_use]
    pub fn has_pending_handshake(&self) -> bool {
        self.pending_nonce.is_some()
    }

    /// Remove and return the pending nonce. A nonce can be taken once.
    pub fn take_pending_nonce(&mut self) -> Option<String> {
        self.pending_nonce.take()
    }

    pub fn authenticate(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.expires_at).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        (self.expires_at() - now).max(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() >= self.expires_at
    }

    /// Serialize for the session cookie.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for well-formed sessions.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a cookie value. Garbage and expired tokens yield `None`.
    #[must_use]
    pub fn decode(raw: &str, now: OffsetDateTime) -> Option<Self> {
        let session: Self = serde_json::from_str(raw).ok()?;
        (!session.is_expired_at(now)).then_some(session)
    }
}
