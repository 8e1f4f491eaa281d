use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use url::Url;
use url::form_urlencoded;

use crate::error::AuthError;
use crate::nonce;
use crate::session::Session;
use crate::types::{ExternalId, Identity};

type HmacSha256 = Hmac<Sha256>;

const SSO_PROVIDER_PATH: &str = "session/sso_provider";

/// How long a consumed nonce is remembered. Matches the longest practical session lifetime.
const CONSUMED_NONCE_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// Expired nonces are only swept once the ledger grows past this size.
const CONSUMED_NONCE_PRUNE_THRESHOLD: usize = 1024;

/// Discourse-compatible SSO configuration.
///
/// All fields are constructor parameters; absence is a startup error handled by the caller.
#[derive(Clone)]
pub struct SsoConfig {
    secret: String,
    provider_url: Url,
    return_url: Url,
}

impl std::fmt::Debug for SsoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoConfig")
            .field("secret", &"[REDACTED]")
            .field("provider_url", &self.provider_url.as_str())
            .field("return_url", &self.return_url.as_str())
            .finish()
    }
}

impl SsoConfig {
    #[must_use]
    pub fn new(secret: impl Into<String>, provider_url: Url, return_url: Url) -> Self {
        Self {
            secret: secret.into(),
            provider_url,
            return_url,
        }
    }

    /// Provider base URL, e.g. `https://forum.example.com`.
    #[must_use]
    pub fn provider_url(&self) -> &Url {
        &self.provider_url
    }

    /// Where the provider sends the browser back to (`return_sso_url`).
    #[must_use]
    pub fn return_url(&self) -> &Url {
        &self.return_url
    }
}

/// Redirect target for a freshly started login.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LoginRedirect {
    pub url: String,
    pub nonce: String,
}

/// Fields extracted from a verified callback payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct SsoPayload {
    pub nonce: String,
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub groups: Vec<String>,
    /// Provider-side admin flag. Informational only; roles come from the role store.
    pub provider_admin: bool,
}

impl SsoPayload {
    fn parse(decoded: &[u8]) -> Result<Self, AuthError> {
        let mut payload = Self::default();
        let mut has_nonce = false;
        for (key, value) in form_urlencoded::parse(decoded) {
            match key.as_ref() {
                "nonce" => {
                    payload.nonce = value.into_owned();
                    has_nonce = true;
                }
                "external_id" => payload.external_id = value.into_owned(),
                "username" => payload.username = value.into_owned(),
                "email" => payload.email = value.into_owned(),
                "name" if !value.is_empty() => payload.name = Some(value.into_owned()),
                "groups" => {
                    payload.groups = value
                        .split(',')
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(String::from)
                        .collect();
                }
                "admin" => payload.provider_admin = value == "true",
                _ => {}
            }
        }

        if !has_nonce {
            return Err(AuthError::MalformedPayload("missing nonce".into()));
        }
        if payload.external_id.is_empty() {
            return Err(AuthError::MalformedPayload("missing external_id".into()));
        }
        Ok(payload)
    }

    /// Identity without roles; roles are attached by the caller from the role store.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(
            ExternalId::from(self.external_id.clone()),
            self.username.clone(),
            self.email.clone(),
        )
    }
}

/// SSO handshake client: issues login redirects and verifies callbacks.
///
/// Nonces that completed a login are remembered process-wide, so a callback stays
/// single-use even when a browser presents an older copy of its session cookie.
pub struct SsoClient {
    config: SsoConfig,
    /// nonce → unix seconds of first use
    consumed: DashMap<String, i64>,
}

impl SsoClient {
    #[must_use]
    pub fn new(config: SsoConfig) -> Self {
        Self {
            config,
            consumed: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    /// Start a login: store a fresh nonce in `session` and build the provider redirect.
    ///
    /// `<provider>/session/sso_provider?sso=<base64 payload>&sig=<hex hmac>`
    #[must_use]
    pub fn begin_login(&self, session: &mut Session) -> LoginRedirect {
        let nonce = nonce::generate_nonce();
        session.begin_handshake(nonce.clone());

        let payload = form_urlencoded::Serializer::new(String::new())
            .append_pair("nonce", &nonce)
            .append_pair("return_sso_url", self.config.return_url.as_str())
            .finish();
        let encoded = STANDARD.encode(payload);
        let sig = self.sign(&encoded);

        let mut url = self.config.provider_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(SSO_PROVIDER_PATH.split('/'));
        }
        url.query_pairs_mut()
            .append_pair("sso", &encoded)
            .append_pair("sig", &sig);

        LoginRedirect {
            url: url.into(),
            nonce,
        }
    }

    /// Hex HMAC-SHA256 of `payload` under the shared secret.
    #[must_use]
    pub fn sign(&self, payload: &str) -> String {
        hex::encode(self.mac_for(payload.as_bytes()).finalize().into_bytes())
    }

    /// Verify a provider callback and consume the session's pending nonce.
    ///
    /// Checks run in order: signature (constant time) → payload decoding → nonce.
    /// Once the signature verifies, the pending nonce is gone whether or not it matches.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidSignature`], [`AuthError::MalformedPayload`] or
    /// [`AuthError::InvalidNonce`].
    pub fn verify_callback(
        &self,
        session: &mut Session,
        sso: &str,
        sig: &str,
    ) -> Result<SsoPayload, AuthError> {
        self.verify_signature(sso, sig)?;
        let pending = session.take_pending_nonce();

        let decoded = decode_payload(sso)?;
        let payload = SsoPayload::parse(&decoded)?;

        let matches = pending
            .as_deref()
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(payload.nonce.as_bytes())));
        if !matches {
            tracing::warn!(
                had_pending = pending.is_some(),
                "SSO callback nonce mismatch"
            );
            return Err(AuthError::InvalidNonce);
        }
        self.consume(&payload.nonce)?;

        Ok(payload)
    }

    /// Mark `nonce` used. Fails if an earlier callback already used it.
    fn consume(&self, nonce: &str) -> Result<(), AuthError> {
        self.consume_at(nonce, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    fn consume_at(&self, nonce: &str, now: i64) -> Result<(), AuthError> {
        if self.consumed.len() > CONSUMED_NONCE_PRUNE_THRESHOLD {
            let horizon = now.saturating_sub(CONSUMED_NONCE_RETENTION_SECS);
            self.consumed.retain(|_, used_at| *used_at > horizon);
        }

        if self.consumed.insert(nonce.to_string(), now).is_some() {
            tracing::warn!("SSO callback replayed with a stale session");
            return Err(AuthError::InvalidNonce);
        }
        Ok(())
    }

    /// [`verify_callback`](Self::verify_callback), then store the identity in `session`.
    ///
    /// # Errors
    ///
    /// Same as [`verify_callback`](Self::verify_callback).
    pub fn handle_callback(
        &self,
        session: &mut Session,
        sso: &str,
        sig: &str,
    ) -> Result<Identity, AuthError> {
        let payload = self.verify_callback(session, sso, sig)?;
        let identity = payload.identity();
        session.authenticate(identity.clone());

        tracing::info!(
            external_id = %identity.external_id,
            username = %identity.username,
            provider_admin = payload.provider_admin,
            groups = payload.groups.len(),
            "SSO callback verified"
        );
        Ok(identity)
    }

    fn verify_signature(&self, sso: &str, sig: &str) -> Result<(), AuthError> {
        let expected = hex::decode(sig.trim()).map_err(|_| {
            tracing::warn!("SSO callback signature is not hex");
            AuthError::InvalidSignature
        })?;
        self.mac_for(sso.as_bytes())
            .verify_slice(&expected)
            .map_err(|_| {
                tracing::warn!("SSO callback signature mismatch");
                AuthError::InvalidSignature
            })
    }

    fn mac_for(&self, data: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data);
        mac
    }
}

fn decode_payload(sso: &str) -> Result<Vec<u8>, AuthError> {
    // Providers may wrap base64 output at 60 columns.
    let compact: String = sso.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| AuthError::MalformedPayload(format!("base64: {e}")))
}
