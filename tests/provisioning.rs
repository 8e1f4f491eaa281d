//! Provisioning flow against in-memory storage and DNS fakes.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subdomain_portal::error::{DnsError, ProvisionError, StoreError};
use subdomain_portal::provision::{ProvisionSettings, Provisioner};
use subdomain_portal::traits::{DnsProvider, DomainRegistry, MappingStore, RoleResolver};
use subdomain_portal::types::{
    DomainRecord, ExternalId, Identity, MappingId, ProvisionState, RecordId, Reservation, Role,
    SubdomainMapping, ZoneId,
};
use tokio::sync::Notify;

// ── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStore {
    domains: HashMap<String, ZoneId>,
    rows: Mutex<HashMap<MappingId, Reservation>>,
    fail_mark_dns_created: AtomicBool,
    stall_mark_dns_created: AtomicBool,
    fail_mark_recorded: AtomicBool,
    /// Commit the `Recorded` transition, then report an error (lost reply).
    fail_mark_recorded_after_commit: AtomicBool,
    fail_mark_failed: AtomicBool,
    fail_release: AtomicBool,
}

impl MemoryStore {
    fn with_domain(domain: &str, zone: &str) -> Self {
        let mut store = Self::default();
        store.domains.insert(domain.into(), ZoneId(zone.into()));
        store
    }

    fn insert(&self, row: Reservation) {
        self.rows.lock().unwrap().insert(row.id, row);
    }

    fn rows(&self) -> Vec<Reservation> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    fn only_row(&self) -> Reservation {
        let rows = self.rows();
        assert_eq!(rows.len(), 1, "{rows:?}");
        rows.into_iter().next().unwrap()
    }
}

impl DomainRegistry for MemoryStore {
    async fn resolve_zone(&self, domain: &str) -> Result<Option<ZoneId>, StoreError> {
        Ok(self.domains.get(domain).cloned())
    }

    async fn list_domains(&self) -> Result<Vec<DomainRecord>, StoreError> {
        Ok(self
            .domains
            .iter()
            .map(|(domain, zone_id)| DomainRecord {
                domain: domain.clone(),
                zone_id: zone_id.clone(),
            })
            .collect())
    }
}

impl MappingStore for MemoryStore {
    async fn reserve(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let taken = rows
            .values()
            .any(|r| r.subdomain == reservation.subdomain && r.domain == reservation.domain);
        if taken {
            return Err(StoreError::Conflict(reservation.fqdn()));
        }
        rows.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn mark_dns_created(&self, id: &MappingId, record_id: &RecordId) -> Result<(), StoreError> {
        if self.stall_mark_dns_created.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.fail_mark_dns_created.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("disk unavailable".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.state = ProvisionState::DnsCreated;
        row.record_id = Some(record_id.clone());
        Ok(())
    }

    async fn mark_recorded(&self, id: &MappingId) -> Result<SubdomainMapping, StoreError> {
        if self.fail_mark_recorded.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("db locked".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(id)
            .filter(|r| r.state == ProvisionState::DnsCreated)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.state = ProvisionState::Recorded;
        if self.fail_mark_recorded_after_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        row.clone()
            .into_mapping()
            .ok_or_else(|| StoreError::Corrupt(id.to_string()))
    }

    async fn mark_failed(&self, id: &MappingId, record_id: Option<&RecordId>) -> Result<(), StoreError> {
        if self.fail_mark_failed.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("db locked".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.state = ProvisionState::Failed;
        if let Some(record_id) = record_id {
            row.record_id = Some(record_id.clone());
        }
        Ok(())
    }

    async fn release(&self, id: &MappingId) -> Result<(), StoreError> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound("db locked".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.get(id).is_some_and(|r| r.state != ProvisionState::Recorded) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn find_unfinished(&self, created_before: i64) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|r| r.state != ProvisionState::Recorded && r.created_at <= created_before)
            .collect())
    }

    async fn list_mappings(
        &self,
        owner: Option<&ExternalId>,
    ) -> Result<Vec<SubdomainMapping>, StoreError> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|r| owner.is_none_or(|o| &r.user_id == o))
            .filter_map(Reservation::into_mapping)
            .collect())
    }
}

impl RoleResolver for MemoryStore {
    async fn roles_for(&self, _external_id: &ExternalId) -> Result<Vec<Role>, StoreError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeDns {
    /// record id → (zone, name, target)
    records: Mutex<HashMap<RecordId, (ZoneId, String, Ipv4Addr)>>,
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    fail_create: AtomicBool,
    /// Create the record, then answer with an unreadable response.
    lose_create_reply: AtomicBool,
    fail_delete: AtomicBool,
    /// When set, `create_a_record` waits for a notification before answering.
    gate: Option<Arc<Notify>>,
}

impl FakeDns {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn has_record(&self, id: &str) -> bool {
        self.records
            .lock()
            .unwrap()
            .contains_key(&RecordId(id.into()))
    }

    /// A record this portal did not create.
    fn seed(&self, zone: &str, name: &str, id: &str) {
        self.records.lock().unwrap().insert(
            RecordId(id.into()),
            (ZoneId(zone.into()), name.into(), Ipv4Addr::new(198, 51, 100, 1)),
        );
    }
}

impl DnsProvider for FakeDns {
    async fn create_a_record(
        &self,
        zone: &ZoneId,
        name: &str,
        target: Ipv4Addr,
    ) -> Result<RecordId, DnsError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DnsError::Provider {
                operation: "create DNS record",
                status: 400,
                detail: "81057: Record already exists.".into(),
            });
        }
        let id = RecordId(format!("rec_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        self.records
            .lock()
            .unwrap()
            .insert(id.clone(), (zone.clone(), name.to_string(), target));
        if self.lose_create_reply.load(Ordering::SeqCst) {
            return Err(DnsError::UnexpectedResponse("create DNS record: truncated body".into()));
        }
        Ok(id)
    }

    async fn delete_record(&self, _zone: &ZoneId, record_id: &RecordId) -> Result<(), DnsError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(DnsError::UnexpectedResponse("delete refused".into()));
        }
        self.records.lock().unwrap().remove(record_id);
        Ok(())
    }

    async fn find_a_records(&self, zone: &ZoneId, fqdn: &str) -> Result<Vec<RecordId>, DnsError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (z, name, _))| z == zone && fqdn.starts_with(&format!("{name}.")))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

fn alice() -> Identity {
    Identity::new("42".to_string(), "alice", "a@x.com")
}

fn setup(settings: ProvisionSettings) -> (Arc<MemoryStore>, Arc<FakeDns>, Provisioner<MemoryStore, FakeDns>) {
    let store = Arc::new(MemoryStore::with_domain("a", "zoneA"));
    let dns = Arc::new(FakeDns::default());
    let provisioner = Provisioner::new(store.clone(), dns.clone(), settings);
    (store, dns, provisioner)
}

// ── Registration ───────────────────────────────────────────────────

#[tokio::test]
async fn test_register_creates_record_and_mapping() {
    let settings = ProvisionSettings::default().with_target(Ipv4Addr::new(203, 0, 113, 7));
    let (store, dns, provisioner) = setup(settings);

    let mapping = provisioner
        .register(Some(&alice()), "Blog", "a")
        .await
        .unwrap();

    assert_eq!(mapping.user_id, ExternalId("42".into()));
    assert_eq!(mapping.subdomain, "blog");
    assert_eq!(mapping.domain, "a");
    assert_eq!(mapping.record_id, RecordId("rec_1".into()));

    let records = dns.records.lock().unwrap();
    let (zone, name, target) = records.get(&mapping.record_id).unwrap();
    assert_eq!(zone, &ZoneId("zoneA".into()));
    assert_eq!(name, "blog");
    assert_eq!(*target, Ipv4Addr::new(203, 0, 113, 7));
    drop(records);

    assert_eq!(store.list_mappings(None).await.unwrap(), vec![mapping]);
}

#[tokio::test]
async fn test_register_without_identity_is_unauthorized() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());

    let err = provisioner.register(None, "blog", "a").await.unwrap_err();
    assert!(matches!(err, ProvisionError::Unauthorized));
    assert_eq!(dns.create_calls.load(Ordering::SeqCst), 0);
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let (_, dns, provisioner) = setup(ProvisionSettings::default());

    for (subdomain, domain) in [("", "a"), ("blog", ""), ("-blog", "a"), ("a.b", "a"), ("bl og", "a")] {
        let err = provisioner
            .register(Some(&alice()), subdomain, domain)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ProvisionError::InvalidInput(_)),
            "{subdomain:?}/{domain:?}: {err:?}"
        );
    }
    assert_eq!(dns.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_domain_makes_no_dns_call() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());

    let err = provisioner
        .register(Some(&alice()), "blog", "b")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::UnknownDomain(ref d) if d == "b"));
    assert_eq!(dns.create_calls.load(Ordering::SeqCst), 0);
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_dns_failure_records_nothing() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    dns.fail_create.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    match err {
        ProvisionError::DnsProviderFailure(detail) => {
            assert_eq!(detail, "81057: Record already exists.");
        }
        other => panic!("expected DNS failure, got {other:?}"),
    }
    assert!(store.rows().is_empty());
    assert!(store.list_mappings(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_name_taken_is_conflict() {
    let (_, dns, provisioner) = setup(ProvisionSettings::default());
    provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap();

    let bob = Identity::new("7".to_string(), "bob", "b@x.com");
    let err = provisioner
        .register(Some(&bob), "BLOG", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Conflict { .. }));
    assert_eq!(dns.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_registration_of_same_name_conflicts() {
    let gate = Arc::new(Notify::new());
    let store = Arc::new(MemoryStore::with_domain("a", "zoneA"));
    let dns = Arc::new(FakeDns::gated(gate.clone()));
    let provisioner = Arc::new(Provisioner::new(
        store.clone(),
        dns.clone(),
        ProvisionSettings::default(),
    ));

    let first = tokio::spawn({
        let provisioner = provisioner.clone();
        async move { provisioner.register(Some(&alice()), "blog", "a").await }
    });

    // Wait until the first attempt is inside the DNS call.
    while dns.create_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let bob = Identity::new("7".to_string(), "bob", "b@x.com");
    let err = provisioner
        .register(Some(&bob), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Conflict { .. }));

    gate.notify_one();
    let mapping = first.await.unwrap().unwrap();
    assert_eq!(mapping.user_id, ExternalId("42".into()));
    assert_eq!(dns.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(dns.record_count(), 1);
}

// ── Persistence failures ───────────────────────────────────────────

#[tokio::test]
async fn test_persistence_failure_compensates_dns_record() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    store.fail_mark_dns_created.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));

    assert_eq!(dns.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(dns.record_count(), 0, "created record is deleted again");
    assert!(store.rows().is_empty(), "reservation is released");
}

#[tokio::test]
async fn test_persistence_failure_without_compensation_leaves_observable_orphan() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default().with_compensation(false));
    store.fail_mark_dns_created.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));

    assert_eq!(dns.record_count(), 1);
    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, ProvisionState::Requested);
    assert!(store.list_mappings(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_compensation_keeps_reservation() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    store.fail_mark_dns_created.store(true, Ordering::SeqCst);
    dns.fail_delete.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));

    assert_eq!(dns.record_count(), 1);
    let row = store.only_row();
    assert_eq!(row.state, ProvisionState::Failed);
    assert_eq!(row.record_id, Some(RecordId("rec_1".into())));
    assert!(store.list_mappings(None).await.unwrap().is_empty());

    // The next pass retries the deletion instead of adopting the record.
    dns.fail_delete.store(false, Ordering::SeqCst);
    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.recorded, 0);
    assert_eq!(dns.record_count(), 0);
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn test_persistence_timeout_is_failure() {
    let settings = ProvisionSettings::default()
        .with_persistence_timeout(Duration::from_millis(50))
        .with_compensation(false);
    let (store, _, provisioner) = setup(settings);
    store.stall_mark_dns_created.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));
}

#[tokio::test]
async fn test_unrecordable_record_is_deleted_even_if_release_fails() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    store.fail_mark_recorded.store(true, Ordering::SeqCst);
    store.fail_release.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));
    assert_eq!(dns.record_count(), 0);

    // The stuck row is failed, so reconciliation can never record it.
    let row = store.only_row();
    assert_eq!(row.state, ProvisionState::Failed);
    store.fail_mark_recorded.store(false, Ordering::SeqCst);

    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.recorded, 0);
    assert_eq!(report.skipped, 1, "release still failing");
    assert!(store.list_mappings(None).await.unwrap().is_empty());

    store.fail_release.store(false, Ordering::SeqCst);
    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.recorded, 0);
    assert!(store.rows().is_empty());
    assert!(store.list_mappings(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_kept_when_row_cannot_be_marked_failed() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    store.fail_mark_recorded.store(true, Ordering::SeqCst);
    store.fail_mark_failed.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));

    // The row still points at a live record.
    let row = store.only_row();
    assert_eq!(row.state, ProvisionState::DnsCreated);
    assert!(dns.has_record("rec_1"));

    store.fail_mark_recorded.store(false, Ordering::SeqCst);
    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.recorded, 1);
    let mappings = store.list_mappings(None).await.unwrap();
    assert_eq!(mappings.len(), 1);
    assert!(dns.has_record(&mappings[0].record_id.0));
}

#[tokio::test]
async fn test_lost_recording_reply_withdraws_mapping() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    store.fail_mark_recorded_after_commit.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::PersistenceFailure(_)));

    assert_eq!(dns.record_count(), 0);
    assert!(store.rows().is_empty());
    assert!(store.list_mappings(None).await.unwrap().is_empty());
}

// ── DNS failures with a stuck reservation ──────────────────────────

#[tokio::test]
async fn test_rejected_create_never_adopts_existing_record() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    dns.seed("zoneA", "blog", "rec_foreign");
    dns.fail_create.store(true, Ordering::SeqCst);
    store.fail_release.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(
        matches!(err, ProvisionError::DnsProviderFailure(ref d) if d == "81057: Record already exists.")
    );
    let row = store.only_row();
    assert_eq!(row.state, ProvisionState::Failed);
    assert_eq!(row.record_id, None);

    store.fail_release.store(false, Ordering::SeqCst);
    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.recorded, 0);
    assert!(store.list_mappings(None).await.unwrap().is_empty());
    assert!(dns.has_record("rec_foreign"), "record owned elsewhere is untouched");
}

#[tokio::test]
async fn test_unknown_create_outcome_is_settled_by_lookup() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    dns.lose_create_reply.store(true, Ordering::SeqCst);
    store.fail_release.store(true, Ordering::SeqCst);

    let err = provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::DnsProviderFailure(_)));
    assert_eq!(store.only_row().state, ProvisionState::Requested);

    store.fail_release.store(false, Ordering::SeqCst);
    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.recorded, 1);
    let mappings = store.list_mappings(None).await.unwrap();
    assert_eq!(mappings[0].record_id, RecordId("rec_1".into()));
}

// ── Reconciliation ─────────────────────────────────────────────────

#[tokio::test]
async fn test_reconcile_adopts_orphaned_record() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default().with_compensation(false));
    store.fail_mark_dns_created.store(true, Ordering::SeqCst);
    provisioner
        .register(Some(&alice()), "blog", "a")
        .await
        .unwrap_err();
    store.fail_mark_dns_created.store(false, Ordering::SeqCst);

    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.recorded, 1);
    assert_eq!(report.released, 0);

    let mappings = store.list_mappings(None).await.unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].subdomain, "blog");
    assert_eq!(dns.record_count(), 1);
}

#[tokio::test]
async fn test_reconcile_releases_reservation_without_record() {
    let (store, _, provisioner) = setup(ProvisionSettings::default());
    store.insert(Reservation::requested(
        ExternalId("42".into()),
        "ghost".into(),
        "a".into(),
    ));

    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.released, 1);
    assert!(store.rows().is_empty());

    // The name is free again.
    provisioner
        .register(Some(&alice()), "ghost", "a")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reconcile_completes_dns_created_row() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    dns.seed("zoneA", "blog", "rec_77");
    let mut row = Reservation::requested(ExternalId("42".into()), "blog".into(), "a".into());
    row.state = ProvisionState::DnsCreated;
    row.record_id = Some(RecordId("rec_77".into()));
    store.insert(row);

    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.recorded, 1);

    let mappings = store
        .list_mappings(Some(&ExternalId("42".into())))
        .await
        .unwrap();
    assert_eq!(mappings[0].record_id, RecordId("rec_77".into()));
}

#[tokio::test]
async fn test_reconcile_releases_dns_created_row_whose_record_is_gone() {
    let (store, dns, provisioner) = setup(ProvisionSettings::default());
    dns.seed("zoneA", "blog", "rec_other");
    let mut row = Reservation::requested(ExternalId("42".into()), "blog".into(), "a".into());
    row.state = ProvisionState::DnsCreated;
    row.record_id = Some(RecordId("rec_5".into()));
    store.insert(row);

    let report = provisioner.reconcile(Duration::ZERO).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(report.recorded, 0);
    assert!(store.rows().is_empty());
    assert!(dns.has_record("rec_other"));
}

#[tokio::test]
async fn test_reconcile_ignores_young_rows() {
    let (store, _, provisioner) = setup(ProvisionSettings::default());
    store.insert(Reservation::requested(
        ExternalId("42".into()),
        "fresh".into(),
        "a".into(),
    ));

    let report = provisioner
        .reconcile(Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(report.recorded + report.released + report.skipped, 0);
    assert_eq!(store.rows().len(), 1);
}
