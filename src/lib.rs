#![doc = include_str!("../README.md")]

pub mod db;
pub mod dns;
pub mod error;
pub mod locks;
pub mod nonce;
pub mod provision;
pub mod session;
pub mod sso;
pub mod traits;
pub mod types;
pub mod web;

// Re-exports for convenient access
pub use db::SqliteStore;
pub use dns::{CloudflareClient, DnsConfig};
pub use error::{AuthError, ConfigError, DnsError, ProvisionError, StoreError};
pub use provision::{ProvisionSettings, Provisioner, ReconcileReport, normalize_label};
pub use session::Session;
pub use sso::{LoginRedirect, SsoClient, SsoConfig, SsoPayload};
pub use traits::{DnsProvider, DomainRegistry, MappingStore, PortalStore, RoleResolver};
pub use types::{
    DomainRecord, ExternalId, Identity, MappingId, ProvisionState, RecordId, Reservation, Role,
    SubdomainMapping, ZoneId, has_role,
};
