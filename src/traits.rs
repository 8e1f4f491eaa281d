use std::future::Future;
use std::net::Ipv4Addr;

use crate::error::{DnsError, StoreError};
use crate::types::{
    DomainRecord, ExternalId, MappingId, RecordId, Reservation, Role, SubdomainMapping, ZoneId,
};

/// Read-only mapping of allowed domain suffixes to DNS zones.
///
/// Entries are managed by an external administrative process.
pub trait DomainRegistry: Send + Sync + 'static {
    /// Exact-match lookup. `Ok(None)` when the suffix is not registered.
    fn resolve_zone(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Option<ZoneId>, StoreError>> + Send;

    fn list_domains(&self) -> impl Future<Output = Result<Vec<DomainRecord>, StoreError>> + Send;
}

/// Persistence for subdomain reservations and mappings.
///
/// Rows move `Requested → DnsCreated → Recorded`; `(subdomain, domain)` is unique
/// across all states.
pub trait MappingStore: Send + Sync + 'static {
    /// Insert a `Requested` row.
    ///
    /// Fails with [`StoreError::Conflict`] if the `(subdomain, domain)` pair is taken.
    fn reserve(
        &self,
        reservation: &Reservation,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Attach the provider record id and move to `DnsCreated`.
    fn mark_dns_created(
        &self,
        id: &MappingId,
        record_id: &RecordId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Move a `DnsCreated` row to `Recorded` and return the mapping.
    fn mark_recorded(
        &self,
        id: &MappingId,
    ) -> impl Future<Output = Result<SubdomainMapping, StoreError>> + Send;

    /// Move a row in any state to `Failed`. It stops being a mapping and is never
    /// adopted by reconciliation. `record_id`, when given, names a record created for it
    /// that still has to be deleted.
    fn mark_failed(
        &self,
        id: &MappingId,
        record_id: Option<&RecordId>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drop a row that never reached `Recorded`.
    fn release(&self, id: &MappingId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Rows not yet `Recorded` created at or before `created_before` (unix seconds).
    fn find_unfinished(
        &self,
        created_before: i64,
    ) -> impl Future<Output = Result<Vec<Reservation>, StoreError>> + Send;

    /// `Recorded` mappings, optionally filtered by owner.
    fn list_mappings(
        &self,
        owner: Option<&ExternalId>,
    ) -> impl Future<Output = Result<Vec<SubdomainMapping>, StoreError>> + Send;
}

/// Authorization store: roles granted to a user.
pub trait RoleResolver: Send + Sync + 'static {
    fn roles_for(
        &self,
        external_id: &ExternalId,
    ) -> impl Future<Output = Result<Vec<Role>, StoreError>> + Send;
}

/// Everything the web layer needs from storage.
pub trait PortalStore: DomainRegistry + MappingStore + RoleResolver {}

impl<T: DomainRegistry + MappingStore + RoleResolver> PortalStore for T {}

/// External DNS provider API.
pub trait DnsProvider: Send + Sync + 'static {
    /// Create an `A` record `name → target` in `zone`. Returns the provider's record id.
    fn create_a_record(
        &self,
        zone: &ZoneId,
        name: &str,
        target: Ipv4Addr,
    ) -> impl Future<Output = Result<RecordId, DnsError>> + Send;

    fn delete_record(
        &self,
        zone: &ZoneId,
        record_id: &RecordId,
    ) -> impl Future<Output = Result<(), DnsError>> + Send;

    /// Ids of the existing `A` records for a fully qualified name.
    fn find_a_records(
        &self,
        zone: &ZoneId,
        fqdn: &str,
    ) -> impl Future<Output = Result<Vec<RecordId>, DnsError>> + Send;
}
