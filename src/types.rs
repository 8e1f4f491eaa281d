use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::StoreError;

/// SSO provider user identifier (`external_id` in the callback payload).
///
/// Opaque and unique per user. Owner key of every subdomain mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ExternalId(pub String);

/// DNS provider zone identifier owning a domain suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ZoneId(pub String);

/// DNS provider record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct RecordId(pub String);

/// Local identifier of a subdomain reservation/mapping row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct MappingId(pub Ulid);

impl MappingId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

/// Authorization roles, resolved from the role store at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            other => Err(StoreError::Corrupt(format!("unknown role: {other}"))),
        }
    }
}

/// Authenticated user, held only inside the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub external_id: ExternalId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Identity {
    #[must_use]
    pub fn new(
        external_id: impl Into<ExternalId>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            username: username.into(),
            email: email.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }
}

/// Capability check. Roles never derive from the username.
#[must_use]
pub fn has_role(identity: &Identity, role: Role) -> bool {
    identity.roles.contains(&role)
}

/// Provisioning progress of a reservation row.
///
/// `Requested → DnsCreated → Recorded`. Only `Recorded` rows are mappings.
/// `Failed` rows belong to an abandoned registration and are only ever released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    Requested,
    DnsCreated,
    Recorded,
    Failed,
}

impl ProvisionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::DnsCreated => "dns_created",
            Self::Recorded => "recorded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ProvisionState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "dns_created" => Ok(Self::DnsCreated),
            "recorded" => Ok(Self::Recorded),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Corrupt(format!("unknown provision state: {other}"))),
        }
    }
}

/// Registry entry: domain suffix → owning zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub domain: String,
    pub zone_id: ZoneId,
}

/// A row in the subdomain table, in any provisioning state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: MappingId,
    pub user_id: ExternalId,
    pub subdomain: String,
    pub domain: String,
    pub state: ProvisionState,
    pub record_id: Option<RecordId>,
    /// Unix seconds.
    pub created_at: i64,
}

impl Reservation {
    /// New `Requested` row, written before the DNS call.
    #[must_use]
    pub fn requested(user_id: ExternalId, subdomain: String, domain: String) -> Self {
        Self {
            id: MappingId::generate(),
            user_id,
            subdomain,
            domain,
            state: ProvisionState::Requested,
            record_id: None,
            created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    /// Fully qualified name of the record (`label.domain`).
    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }

    /// The mapping view, available once the row is `Recorded`.
    #[must_use]
    pub fn into_mapping(self) -> Option<SubdomainMapping> {
        match (self.state, self.record_id) {
            (ProvisionState::Recorded, Some(record_id)) => Some(SubdomainMapping {
                id: self.id,
                user_id: self.user_id,
                subdomain: self.subdomain,
                domain: self.domain,
                record_id,
            }),
            _ => None,
        }
    }
}

/// Persisted fact: `user_id` owns `subdomain.domain`, backed by DNS record `record_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubdomainMapping {
    pub id: MappingId,
    pub user_id: ExternalId,
    pub subdomain: String,
    pub domain: String,
    pub record_id: RecordId,
}
