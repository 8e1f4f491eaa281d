use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::str::FromStr;

use axum_extra::extract::cookie::Key;
use time::Duration;
use url::Url;

use crate::dns::DnsConfig;
use crate::error::ConfigError;
use crate::provision::ProvisionSettings;
use crate::sso::SsoConfig;

const SESSION_TTL_HOURS: RangeInclusive<i64> = 1..=8760;
const TIMEOUT_SECS: RangeInclusive<u64> = 1..=300;

/// Shared web settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct WebSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) home_url: String,
}

impl WebSettings {
    fn defaults(cookie_key: Key) -> Self {
        Self {
            cookie_key,
            session_cookie_name: "session".into(),
            session_ttl: Duration::hours(24),
            secure_cookies: true,
            home_url: "http://localhost:3000".into(),
        }
    }
}

/// Portal configuration.
///
/// Required values (SSO settings, DNS API token, cookie key) are constructor parameters.
/// Use [`from_env()`](PortalConfig::from_env) at startup, or [`new()`](PortalConfig::new)
/// with `with_*` methods in tests.
pub struct PortalConfig {
    pub(crate) sso: SsoConfig,
    pub(crate) dns: DnsConfig,
    pub(crate) provision: ProvisionSettings,
    pub(crate) web: WebSettings,
    pub(crate) database_url: String,
    pub(crate) listen_addr: SocketAddr,
}

impl PortalConfig {
    #[must_use]
    pub fn new(sso: SsoConfig, dns: DnsConfig, cookie_key: Key) -> Self {
        Self {
            sso,
            dns,
            provision: ProvisionSettings::default(),
            web: WebSettings::defaults(cookie_key),
            database_url: "sqlite:./subdomains.db".into(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SSO_SECRET`: shared HMAC secret with the SSO provider
    /// - `SSO_PROVIDER_URL`: provider base URL
    /// - `SSO_RETURN_URL`: callback URL sent as `return_sso_url`
    /// - `DNS_API_TOKEN`: Cloudflare API token
    /// - `COOKIE_SECRET`: session cookie key material (at least 64 bytes)
    ///
    /// # Optional env vars
    /// - `APP_HOME_URL`: where the browser lands after login/logout
    /// - `LISTEN_ADDR`, `DATABASE_URL`
    /// - `DNS_API_BASE_URL`, `DNS_TARGET_ADDRESS`, `DNS_TIMEOUT_SECS`
    /// - `PERSISTENCE_TIMEOUT_SECS`, `SESSION_TTL_HOURS`
    ///
    /// Timeouts must be 1 to 300 seconds and the session TTL 1 to 8760 hours.
    /// - `DEV_INSECURE_COOKIES`: `"1"` or `"true"` drops the `Secure` cookie flag
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required var is missing or any value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let sso = SsoConfig::new(
            required("SSO_SECRET")?,
            parse_url("SSO_PROVIDER_URL", &required("SSO_PROVIDER_URL")?)?,
            parse_url("SSO_RETURN_URL", &required("SSO_RETURN_URL")?)?,
        );

        let mut dns = DnsConfig::new(required("DNS_API_TOKEN")?);
        if let Some(url) = optional("DNS_API_BASE_URL") {
            dns = dns.with_base_url(parse_url("DNS_API_BASE_URL", &url)?);
        }
        if let Some(secs) = optional("DNS_TIMEOUT_SECS") {
            dns = dns.with_timeout(std::time::Duration::from_secs(parse_in(
                "DNS_TIMEOUT_SECS",
                &secs,
                TIMEOUT_SECS,
            )?));
        }

        let cookie_key = Key::try_from(required("COOKIE_SECRET")?.as_bytes()).map_err(|_| {
            ConfigError::Invalid {
                name: "COOKIE_SECRET",
                reason: "must be at least 64 bytes".into(),
            }
        })?;

        let mut config = Self::new(sso, dns, cookie_key);

        if let Some(home) = optional("APP_HOME_URL") {
            config = config.with_home_url(parse_url("APP_HOME_URL", &home)?.as_str());
        }
        if let Some(addr) = optional("LISTEN_ADDR") {
            config = config.with_listen_addr(parse("LISTEN_ADDR", &addr)?);
        }
        if let Some(url) = optional("DATABASE_URL") {
            config = config.with_database_url(url);
        }
        if let Some(hours) = optional("SESSION_TTL_HOURS") {
            config = config.with_session_ttl(Duration::hours(parse_in(
                "SESSION_TTL_HOURS",
                &hours,
                SESSION_TTL_HOURS,
            )?));
        }

        let mut provision = ProvisionSettings::default();
        if let Some(target) = optional("DNS_TARGET_ADDRESS") {
            provision = provision.with_target(parse::<Ipv4Addr>("DNS_TARGET_ADDRESS", &target)?);
        }
        if let Some(secs) = optional("PERSISTENCE_TIMEOUT_SECS") {
            provision = provision.with_persistence_timeout(std::time::Duration::from_secs(parse_in(
                "PERSISTENCE_TIMEOUT_SECS",
                &secs,
                TIMEOUT_SECS,
            )?));
        }

        let insecure = matches!(
            std::env::var("DEV_INSECURE_COOKIES").as_deref(),
            Ok("1") | Ok("true"),
        );

        Ok(config
            .with_provision_settings(provision)
            .with_secure_cookies(!insecure))
    }

    #[must_use]
    pub fn with_provision_settings(mut self, settings: ProvisionSettings) -> Self {
        self.provision = settings;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.web.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.web.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.web.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_home_url(mut self, url: impl Into<String>) -> Self {
        self.web.home_url = url.into();
        self
    }

    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    #[must_use]
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    #[must_use]
    pub fn dns(&self) -> &DnsConfig {
        &self.dns
    }

    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    #[must_use]
    pub fn home_url(&self) -> &str {
        &self.web.home_url
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    value.parse().map_err(|e: url::ParseError| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_in<T>(name: &'static str, value: &str, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let parsed = parse(name, value)?;
    if !range.contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be between {} and {}", range.start(), range.end()),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PortalConfig {
        PortalConfig::new(
            SsoConfig::new(
                "secret",
                "https://forum.example.com".parse().unwrap(),
                "http://localhost:3001/auth/callback".parse().unwrap(),
            ),
            DnsConfig::new("token"),
            Key::generate(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = test_config();
        assert_eq!(config.database_url(), "sqlite:./subdomains.db");
        assert_eq!(config.listen_addr().port(), 3001);
        assert_eq!(config.home_url(), "http://localhost:3000");
        assert_eq!(config.web.session_ttl, Duration::hours(24));
        assert!(config.web.secure_cookies);
    }

    #[test]
    fn test_overrides() {
        let config = test_config()
            .with_home_url("https://portal.example.com")
            .with_session_ttl(Duration::hours(1))
            .with_secure_cookies(false)
            .with_session_cookie_name("portal");
        assert_eq!(config.home_url(), "https://portal.example.com");
        assert_eq!(config.web.session_ttl, Duration::hours(1));
        assert!(!config.web.secure_cookies);
        assert_eq!(config.web.session_cookie_name, "portal");
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse::<u64>("X", " 5 ").unwrap(), 5);
        assert!(matches!(
            parse::<Ipv4Addr>("DNS_TARGET_ADDRESS", "not-an-ip"),
            Err(ConfigError::Invalid { name: "DNS_TARGET_ADDRESS", .. })
        ));
        assert!(parse_url("SSO_PROVIDER_URL", "nope").is_err());
    }

    #[test]
    fn test_bounded_values() {
        assert_eq!(parse_in("SESSION_TTL_HOURS", "24", SESSION_TTL_HOURS).unwrap(), 24);
        assert_eq!(parse_in("DNS_TIMEOUT_SECS", "300", TIMEOUT_SECS).unwrap(), 300);
        for (name, value) in [("DNS_TIMEOUT_SECS", "0"), ("PERSISTENCE_TIMEOUT_SECS", "301")] {
            assert!(matches!(
                parse_in(name, value, TIMEOUT_SECS),
                Err(ConfigError::Invalid { reason, .. }) if reason == "must be between 1 and 300"
            ));
        }
        for hours in ["0", "-1", "9223372036854775807"] {
            assert!(matches!(
                parse_in("SESSION_TTL_HOURS", hours, SESSION_TTL_HOURS),
                Err(ConfigError::Invalid { name: "SESSION_TTL_HOURS", .. })
            ));
        }
        // Out of i64 range fails to parse at all.
        assert!(parse_in("SESSION_TTL_HOURS", "99999999999999999999", SESSION_TTL_HOURS).is_err());
    }
}
