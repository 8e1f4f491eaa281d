/// SSO callback verification failures.
///
/// Never retried: the browser has to start a fresh login.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// `sig` is not the HMAC of `sso` under the shared secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The signed nonce does not match the session's pending handshake
    /// (no login started, or the callback was already used).
    #[error("Invalid nonce")]
    InvalidNonce,

    /// Correctly signed payload that cannot be decoded or lacks required fields.
    #[error("Malformed SSO payload: {0}")]
    MalformedPayload(String),
}

/// Subdomain provisioning failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// The DNS provider rejected the request or could not be reached.
    /// Carries the provider's error detail when it sent one.
    #[error("DNS provider failure: {0}")]
    DnsProviderFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("{subdomain}.{domain} is already registered or being provisioned")]
    Conflict { subdomain: String, domain: String },
}

/// Storage layer errors (registry, mappings, roles).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Operation timed out")]
    Timeout,
}

/// DNS provider API errors.
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    /// Network failure or client-side timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response, or a 2xx envelope with `success: false`.
    #[error("{operation} failed (status {status}): {detail}")]
    Provider {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl DnsError {
    /// Provider-facing detail, used as the `error` body of a failed registration.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Provider { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// The provider answered and refused, so nothing was created.
    ///
    /// Transport errors, timeouts, 5xx and unreadable bodies leave the outcome unknown.
    #[must_use]
    pub fn is_definite_rejection(&self) -> bool {
        match self {
            Self::Provider { status, .. } => *status < 500,
            Self::InvalidUrl(_) => true,
            Self::Http(_) | Self::UnexpectedResponse(_) => false,
        }
    }
}

/// Startup configuration errors. Fatal, never surfaced per request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
