use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DnsError;
use crate::traits::DnsProvider;
use crate::types::{RecordId, ZoneId};

const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloudflare DNS API configuration.
///
/// ```rust,ignore
/// let config = DnsConfig::new(token)
///     .with_base_url("http://127.0.0.1:9999".parse()?)
///     .with_timeout(Duration::from_secs(2));
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct DnsConfig {
    pub(crate) api_token: String,
    pub(crate) base_url: Url,
    pub(crate) timeout: Duration,
}

impl std::fmt::Debug for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsConfig")
            .field("api_token", &"[REDACTED]")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DnsConfig {
    #[must_use]
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_API_BASE.parse().expect("valid default URL"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the API base (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = url;
        self
    }

    /// Per-request timeout; an elapsed timeout is a provider failure.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Cloudflare v4 API client for zone DNS records.
pub struct CloudflareClient {
    config: DnsConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    /// 1 = automatic.
    ttl: u32,
    proxied: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RecordResult {
    id: String,
}

impl CloudflareClient {
    /// # Errors
    ///
    /// Returns [`DnsError::Http`] if the HTTP client cannot be built.
    pub fn new(config: DnsConfig) -> Result<Self, DnsError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn records_url(&self, zone: &ZoneId, record: Option<&RecordId>) -> Result<Url, DnsError> {
        let mut url = self.config.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| DnsError::InvalidUrl(self.config.base_url.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["zones", zone.0.as_str(), "dns_records"]);
            if let Some(record) = record {
                segments.push(&record.0);
            }
        }
        Ok(url)
    }

    /// Checks HTTP status and the envelope's `success` flag; returns the `result` payload.
    async fn read_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<Option<T>, DnsError> {
        let status = response.status();
        let body = response.text().await?;

        let envelope = serde_json::from_str::<Envelope<T>>(&body);
        match envelope {
            Ok(envelope) if status.is_success() && envelope.success => Ok(envelope.result),
            Ok(envelope) => Err(DnsError::Provider {
                operation,
                status: status.as_u16(),
                detail: describe_errors(&envelope.errors, &body),
            }),
            Err(_) if !status.is_success() => Err(DnsError::Provider {
                operation,
                status: status.as_u16(),
                detail: body,
            }),
            Err(e) => Err(DnsError::UnexpectedResponse(format!("{operation}: {e}"))),
        }
    }
}

fn describe_errors(errors: &[ApiMessage], body: &str) -> String {
    if errors.is_empty() {
        return body.to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl DnsProvider for CloudflareClient {
    #[tracing::instrument(skip(self))]
    async fn create_a_record(
        &self,
        zone: &ZoneId,
        name: &str,
        target: Ipv4Addr,
    ) -> Result<RecordId, DnsError> {
        let request = CreateRecordRequest {
            record_type: "A",
            name,
            content: target.to_string(),
            ttl: 1,
            proxied: false,
        };

        let response = self
            .http
            .post(self.records_url(zone, None)?)
            .bearer_auth(&self.config.api_token)
            .json(&request)
            .send()
            .await?;

        let record = Self::read_envelope::<RecordResult>(response, "create DNS record")
            .await?
            .ok_or_else(|| DnsError::UnexpectedResponse("create DNS record: no result".into()))?;

        tracing::debug!(record_id = %record.id, "DNS record created");
        Ok(RecordId(record.id))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_record(&self, zone: &ZoneId, record_id: &RecordId) -> Result<(), DnsError> {
        let response = self
            .http
            .delete(self.records_url(zone, Some(record_id))?)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        Self::read_envelope::<serde_json::Value>(response, "delete DNS record").await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_a_records(&self, zone: &ZoneId, fqdn: &str) -> Result<Vec<RecordId>, DnsError> {
        let mut url = self.records_url(zone, None)?;
        url.query_pairs_mut()
            .append_pair("type", "A")
            .append_pair("name", fqdn);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        let records = Self::read_envelope::<Vec<RecordResult>>(response, "list DNS records")
            .await?
            .unwrap_or_default();
        Ok(records.into_iter().map(|r| RecordId(r.id)).collect())
    }
}
