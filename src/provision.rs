//! Subdomain provisioning workflow.
//!
//! `register` validates input, resolves the zone, reserves the name locally, creates the
//! DNS record, then records the mapping. A mapping exists iff the provider confirmed the
//! record. Failures after the DNS call trigger a compensating deletion; rows that still get
//! stuck are settled by [`Provisioner::reconcile`].

use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::error::{ProvisionError, StoreError};
use crate::locks::KeyedLocks;
use crate::traits::{DnsProvider, DomainRegistry, MappingStore};
use crate::types::{Identity, ProvisionState, RecordId, Reservation, SubdomainMapping, ZoneId};

const MAX_LABEL_LEN: usize = 63;

/// Provisioning knobs.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub(crate) target: Ipv4Addr,
    pub(crate) persistence_timeout: Duration,
    pub(crate) compensate_on_failure: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            target: Ipv4Addr::LOCALHOST,
            persistence_timeout: Duration::from_secs(5),
            compensate_on_failure: true,
        }
    }
}

impl ProvisionSettings {
    /// Address every new `A` record points at. Server-side only.
    #[must_use]
    pub fn with_target(mut self, target: Ipv4Addr) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_persistence_timeout(mut self, timeout: Duration) -> Self {
        self.persistence_timeout = timeout;
        self
    }

    /// Delete the just-created DNS record when recording it locally fails (default on).
    #[must_use]
    pub fn with_compensation(mut self, enabled: bool) -> Self {
        self.compensate_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn target(&self) -> Ipv4Addr {
        self.target
    }
}

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rows completed to `Recorded`.
    pub recorded: usize,
    /// Rows dropped: failed, or no DNS record backs them.
    pub released: usize,
    /// Rows left for a later pass.
    pub skipped: usize,
}

pub struct Provisioner<S, D> {
    store: Arc<S>,
    dns: Arc<D>,
    settings: ProvisionSettings,
    locks: KeyedLocks,
}

impl<S, D> Provisioner<S, D>
where
    S: DomainRegistry + MappingStore,
    D: DnsProvider,
{
    #[must_use]
    pub fn new(store: Arc<S>, dns: Arc<D>, settings: ProvisionSettings) -> Self {
        Self {
            store,
            dns,
            settings,
            locks: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Provision `subdomain.domain` for `identity`.
    ///
    /// # Errors
    ///
    /// - [`ProvisionError::Unauthorized`]: no identity.
    /// - [`ProvisionError::InvalidInput`]: empty domain, empty or invalid label.
    /// - [`ProvisionError::UnknownDomain`]: suffix not in the registry. No external call made.
    /// - [`ProvisionError::Conflict`]: name taken or being provisioned concurrently.
    /// - [`ProvisionError::DnsProviderFailure`]: provider error or timeout. Nothing recorded.
    /// - [`ProvisionError::PersistenceFailure`]: storage error or timeout.
    #[tracing::instrument(skip(self, identity), fields(user_id))]
    pub async fn register(
        &self,
        identity: Option<&Identity>,
        subdomain: &str,
        domain: &str,
    ) -> Result<SubdomainMapping, ProvisionError> {
        let identity = identity.ok_or(ProvisionError::Unauthorized)?;
        tracing::Span::current().record("user_id", tracing::field::display(&identity.external_id));

        let domain = domain.trim();
        if domain.is_empty() {
            return Err(ProvisionError::InvalidInput("domain is required".into()));
        }
        let subdomain = normalize_label(subdomain)?;

        let zone = self
            .persist(self.store.resolve_zone(domain))
            .await
            .map_err(persistence_failure)?
            .ok_or_else(|| {
                tracing::warn!(domain, "registration for unknown domain");
                ProvisionError::UnknownDomain(domain.to_string())
            })?;

        let conflict = || ProvisionError::Conflict {
            subdomain: subdomain.clone(),
            domain: domain.to_string(),
        };
        let _guard = self
            .locks
            .try_acquire(domain, &subdomain)
            .ok_or_else(conflict)?;

        let reservation =
            Reservation::requested(identity.external_id.clone(), subdomain.clone(), domain.into());
        match self.persist(self.store.reserve(&reservation)).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(conflict()),
            Err(e) => return Err(persistence_failure(e)),
        }

        let record_id = match self
            .dns
            .create_a_record(&zone, &subdomain, self.settings.target)
            .await
        {
            Ok(record_id) => record_id,
            Err(e) => {
                tracing::warn!(error = %e, zone = %zone, "DNS record creation failed");
                self.abandon(&reservation, e.is_definite_rejection()).await;
                return Err(ProvisionError::DnsProviderFailure(e.detail()));
            }
        };

        match self.record(&reservation, &record_id).await {
            Ok(mapping) => {
                tracing::info!(
                    fqdn = %reservation.fqdn(),
                    record_id = %record_id,
                    "subdomain registered"
                );
                Ok(mapping)
            }
            Err(e) => {
                tracing::error!(error = %e, id = %reservation.id, "recording DNS record failed");
                self.compensate(&zone, &record_id, &reservation).await;
                Err(persistence_failure(e))
            }
        }
    }

    async fn record(
        &self,
        reservation: &Reservation,
        record_id: &RecordId,
    ) -> Result<SubdomainMapping, StoreError> {
        self.persist(self.store.mark_dns_created(&reservation.id, record_id))
            .await?;
        self.persist(self.store.mark_recorded(&reservation.id)).await
    }

    /// Drop the reservation of a failed DNS create.
    ///
    /// If the row cannot be deleted and the provider definitely refused, it is marked
    /// failed so reconciliation never adopts a record under that name. An unknown outcome
    /// stays `Requested` and is settled by lookup.
    async fn abandon(&self, reservation: &Reservation, rejected: bool) {
        let Err(e) = self.persist(self.store.release(&reservation.id)).await else {
            return;
        };
        tracing::warn!(error = %e, id = %reservation.id, "reservation release failed");
        if !rejected {
            return;
        }
        if let Err(e) = self.persist(self.store.mark_failed(&reservation.id, None)).await {
            tracing::error!(
                error = %e,
                id = %reservation.id,
                fqdn = %reservation.fqdn(),
                "rejected reservation could not be marked failed"
            );
        }
    }

    /// Best-effort undo of a created record that could not be recorded.
    ///
    /// The row is marked failed before the record is deleted, so it can never end up
    /// recorded against a deleted record. If it cannot be marked, the record is kept and
    /// the row stays consistent with it.
    async fn compensate(&self, zone: &ZoneId, record_id: &RecordId, reservation: &Reservation) {
        if !self.settings.compensate_on_failure {
            tracing::error!(
                zone = %zone,
                record_id = %record_id,
                fqdn = %reservation.fqdn(),
                "orphaned DNS record left for reconciliation"
            );
            return;
        }

        if let Err(e) = self.persist(self.store.mark_failed(&reservation.id, Some(record_id))).await {
            tracing::error!(
                error = %e,
                zone = %zone,
                record_id = %record_id,
                fqdn = %reservation.fqdn(),
                "reservation could not be marked failed, DNS record kept for reconciliation"
            );
            return;
        }

        match self.dns.delete_record(zone, record_id).await {
            Ok(()) => {
                tracing::info!(record_id = %record_id, "compensating DNS deletion succeeded");
                if let Err(e) = self.persist(self.store.release(&reservation.id)).await {
                    tracing::warn!(error = %e, id = %reservation.id, "reservation release failed");
                }
            }
            Err(e) => tracing::error!(
                error = %e,
                zone = %zone,
                record_id = %record_id,
                fqdn = %reservation.fqdn(),
                "compensating DNS deletion failed, reconciliation will retry"
            ),
        }
    }

    /// Settle rows older than `min_age` that never reached `Recorded`.
    ///
    /// - `DnsCreated`: completed if the provider still has its record, released otherwise.
    /// - `Requested`: the create outcome is unknown; completed if a record exists for the
    ///   name, released otherwise.
    /// - `Failed`: the record this portal created, if any, is deleted, then the row is
    ///   released. Nothing is adopted.
    ///
    /// # Errors
    ///
    /// [`ProvisionError::PersistenceFailure`] if the stale rows cannot be listed.
    pub async fn reconcile(&self, min_age: Duration) -> Result<ReconcileReport, ProvisionError> {
        let age = i64::try_from(min_age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = OffsetDateTime::now_utc().unix_timestamp().saturating_sub(age);
        let rows = self
            .persist(self.store.find_unfinished(cutoff))
            .await
            .map_err(persistence_failure)?;

        let mut report = ReconcileReport::default();
        for row in rows {
            let Some(_guard) = self.locks.try_acquire(&row.domain, &row.subdomain) else {
                report.skipped += 1;
                continue;
            };
            match self.settle(&row).await {
                Ok(true) => report.recorded += 1,
                Ok(false) => report.released += 1,
                Err(e) => {
                    tracing::warn!(error = %e, id = %row.id, fqdn = %row.fqdn(), "reconciliation deferred");
                    report.skipped += 1;
                }
            }
        }

        if report != ReconcileReport::default() {
            tracing::info!(?report, "reconciliation pass finished");
        }
        Ok(report)
    }

    /// `Ok(true)` when recorded, `Ok(false)` when released.
    async fn settle(&self, row: &Reservation) -> Result<bool, ProvisionError> {
        let zone = self
            .persist(self.store.resolve_zone(&row.domain))
            .await
            .map_err(persistence_failure)?;

        match row.state {
            ProvisionState::Recorded => Ok(true),
            ProvisionState::Failed => {
                if let (Some(zone), Some(record_id)) = (&zone, &row.record_id) {
                    if self.lookup(zone, row).await?.contains(record_id) {
                        self.dns
                            .delete_record(zone, record_id)
                            .await
                            .map_err(|e| ProvisionError::DnsProviderFailure(e.detail()))?;
                        tracing::info!(record_id = %record_id, fqdn = %row.fqdn(), "leftover DNS record deleted");
                    }
                }
                self.release(row).await
            }
            ProvisionState::DnsCreated => {
                // The record was created here but may have been deleted since.
                let zone = zone.ok_or_else(|| {
                    ProvisionError::UnknownDomain(row.domain.clone())
                })?;
                let exists = match &row.record_id {
                    Some(record_id) => self.lookup(&zone, row).await?.contains(record_id),
                    None => false,
                };
                if exists {
                    self.persist(self.store.mark_recorded(&row.id))
                        .await
                        .map_err(persistence_failure)?;
                    Ok(true)
                } else {
                    tracing::warn!(id = %row.id, fqdn = %row.fqdn(), "DNS record gone, releasing reservation");
                    self.release(row).await
                }
            }
            ProvisionState::Requested => {
                let found = match &zone {
                    Some(zone) => self.lookup(zone, row).await?.into_iter().next(),
                    None => None,
                };
                match found {
                    Some(record_id) => {
                        self.record(row, &record_id)
                            .await
                            .map_err(persistence_failure)?;
                        Ok(true)
                    }
                    None => self.release(row).await,
                }
            }
        }
    }

    async fn lookup(&self, zone: &ZoneId, row: &Reservation) -> Result<Vec<RecordId>, ProvisionError> {
        self.dns
            .find_a_records(zone, &row.fqdn())
            .await
            .map_err(|e| ProvisionError::DnsProviderFailure(e.detail()))
    }

    async fn release(&self, row: &Reservation) -> Result<bool, ProvisionError> {
        self.persist(self.store.release(&row.id))
            .await
            .map_err(persistence_failure)?;
        Ok(false)
    }

    async fn persist<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.settings.persistence_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

fn persistence_failure(e: StoreError) -> ProvisionError {
    ProvisionError::PersistenceFailure(e.to_string())
}

/// Lower-case `label` and check it is a single DNS label.
///
/// # Errors
///
/// [`ProvisionError::InvalidInput`] if empty, longer than 63 bytes, or not
/// `[a-z0-9-]` with alphanumeric ends.
pub fn normalize_label(label: &str) -> Result<String, ProvisionError> {
    let label = label.trim().to_ascii_lowercase();
    if label.is_empty() {
        return Err(ProvisionError::InvalidInput("subdomain is required".into()));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(ProvisionError::InvalidInput(format!(
            "subdomain must be at most {MAX_LABEL_LEN} characters"
        )));
    }
    let valid_chars = label
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !valid_chars || label.starts_with('-') || label.ends_with('-') {
        return Err(ProvisionError::InvalidInput(format!(
            "subdomain {label:?} is not a valid DNS label"
        )));
    }
    Ok(label)
}
