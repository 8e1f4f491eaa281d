//! SQLite persistence: domain registry, subdomain reservations, user roles.

use std::str::FromStr;

use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow, SqliteSynchronous,
};
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::traits::{DomainRegistry, MappingStore, RoleResolver};
use crate::types::{
    DomainRecord, ExternalId, MappingId, ProvisionState, RecordId, Reservation, Role,
    SubdomainMapping, ZoneId,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS domains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain TEXT NOT NULL UNIQUE,
        zone_id TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subdomains (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        subdomain TEXT NOT NULL,
        domain TEXT NOT NULL,
        record_id TEXT,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (subdomain, domain)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_subdomains_user ON subdomains (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        external_id TEXT NOT NULL,
        role TEXT NOT NULL,
        UNIQUE (external_id, role)
    )
    "#,
];

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Errors
///
/// Returns `StoreError::Corrupt` if the URL is invalid, or the connection error.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StoreError::Corrupt(format!("invalid database URL: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    tracing::debug!("database pool created");
    Ok(pool)
}

/// Create tables if they do not exist.
///
/// # Errors
///
/// Returns the database error.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// SQLite-backed implementation of every storage trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register or re-point a domain suffix. For the external admin process and tests.
    ///
    /// # Errors
    ///
    /// Returns the database error.
    pub async fn upsert_domain(&self, domain: &str, zone_id: &ZoneId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO domains (domain, zone_id) VALUES (?, ?)
            ON CONFLICT (domain) DO UPDATE SET zone_id = excluded.zone_id
            "#,
        )
        .bind(domain)
        .bind(&zone_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Grant a role. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the database error.
    pub async fn grant_role(&self, external_id: &ExternalId, role: Role) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO user_roles (external_id, role) VALUES (?, ?)")
            .bind(&external_id.0)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Look up a row in any state.
    ///
    /// # Errors
    ///
    /// Returns the database error or a corrupt-row error.
    pub async fn get_reservation(&self, id: &MappingId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, subdomain, domain, record_id, status, created_at
            FROM subdomains WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn set_state(
        &self,
        id: &MappingId,
        from: ProvisionState,
        to: ProvisionState,
        record_id: Option<&RecordId>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subdomains
            SET status = ?, record_id = COALESCE(?, record_id), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(record_id.map(|r| r.0.as_str()))
        .bind(now())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "reservation {id} in state {}",
                from.as_str()
            )));
        }
        Ok(())
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn map_unique(e: sqlx::Error, what: String) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict(what),
        other => StoreError::Database(other),
    }
}

fn reservation_from_row(row: &SqliteRow) -> Result<Reservation, StoreError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let record_id: Option<String> = row.try_get("record_id")?;
    Ok(Reservation {
        id: id
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("invalid reservation id: {id}")))?,
        user_id: ExternalId(row.try_get("user_id")?),
        subdomain: row.try_get("subdomain")?,
        domain: row.try_get("domain")?,
        state: status.parse()?,
        record_id: record_id.map(RecordId),
        created_at: row.try_get("created_at")?,
    })
}

fn mapping_from_row(row: &SqliteRow) -> Result<SubdomainMapping, StoreError> {
    let reservation = reservation_from_row(row)?;
    let id = reservation.id;
    reservation
        .into_mapping()
        .ok_or_else(|| StoreError::Corrupt(format!("recorded row {id} has no record id")))
}

impl DomainRegistry for SqliteStore {
    async fn resolve_zone(&self, domain: &str) -> Result<Option<ZoneId>, StoreError> {
        let zone: Option<String> =
            sqlx::query_scalar("SELECT zone_id FROM domains WHERE domain = ?")
                .bind(domain)
                .fetch_optional(&self.pool)
                .await?;
        Ok(zone.map(ZoneId))
    }

    async fn list_domains(&self) -> Result<Vec<DomainRecord>, StoreError> {
        let rows = sqlx::query("SELECT domain, zone_id FROM domains ORDER BY domain")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(DomainRecord {
                    domain: row.try_get("domain")?,
                    zone_id: ZoneId(row.try_get("zone_id")?),
                })
            })
            .collect()
    }
}

impl MappingStore for SqliteStore {
    async fn reserve(&self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subdomains
                (id, user_id, subdomain, domain, record_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reservation.id.to_string())
        .bind(&reservation.user_id.0)
        .bind(&reservation.subdomain)
        .bind(&reservation.domain)
        .bind(reservation.record_id.as_ref().map(|r| r.0.as_str()))
        .bind(reservation.state.as_str())
        .bind(reservation.created_at)
        .bind(reservation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, reservation.fqdn()))?;
        Ok(())
    }

    async fn mark_dns_created(&self, id: &MappingId, record_id: &RecordId) -> Result<(), StoreError> {
        self.set_state(
            id,
            ProvisionState::Requested,
            ProvisionState::DnsCreated,
            Some(record_id),
        )
        .await
    }

    async fn mark_recorded(&self, id: &MappingId) -> Result<SubdomainMapping, StoreError> {
        // One statement: the row is never `Recorded` without the caller seeing the mapping.
        let row = sqlx::query(
            r#"
            UPDATE subdomains
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ? AND record_id IS NOT NULL
            RETURNING id, user_id, subdomain, domain, record_id, status, created_at
            "#,
        )
        .bind(ProvisionState::Recorded.as_str())
        .bind(now())
        .bind(id.to_string())
        .bind(ProvisionState::DnsCreated.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::NotFound(format!(
                "reservation {id} in state {}",
                ProvisionState::DnsCreated.as_str()
            ))
        })?;
        mapping_from_row(&row)
    }

    async fn mark_failed(
        &self,
        id: &MappingId,
        record_id: Option<&RecordId>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subdomains
            SET status = ?, record_id = COALESCE(?, record_id), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ProvisionState::Failed.as_str())
        .bind(record_id.map(|r| r.0.as_str()))
        .bind(now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("reservation {id}")));
        }
        Ok(())
    }

    async fn release(&self, id: &MappingId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM subdomains WHERE id = ? AND status != ?")
            .bind(id.to_string())
            .bind(ProvisionState::Recorded.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_unfinished(&self, created_before: i64) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, subdomain, domain, record_id, status, created_at
            FROM subdomains
            WHERE status != ? AND created_at <= ?
            ORDER BY created_at
            "#,
        )
        .bind(ProvisionState::Recorded.as_str())
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reservation_from_row).collect()
    }

    async fn list_mappings(
        &self,
        owner: Option<&ExternalId>,
    ) -> Result<Vec<SubdomainMapping>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, subdomain, domain, record_id, status, created_at
            FROM subdomains
            WHERE status = ? AND (? IS NULL OR user_id = ?)
            ORDER BY created_at, id
            "#,
        )
        .bind(ProvisionState::Recorded.as_str())
        .bind(owner.map(|o| o.0.as_str()))
        .bind(owner.map(|o| o.0.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mapping_from_row).collect()
    }
}

impl RoleResolver for SqliteStore {
    async fn roles_for(&self, external_id: &ExternalId) -> Result<Vec<Role>, StoreError> {
        let roles: Vec<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE external_id = ? ORDER BY role")
                .bind(&external_id.0)
                .fetch_all(&self.pool)
                .await?;
        roles.iter().map(|r| r.parse()).collect()
    }
}
