//! SQLite-backed credential persistence.
//!
//! The store owns the schema for credentials and booking references.
//! Structured policy columns (whitelist, rate limits, tags) are JSON;
//! timestamps are unix seconds; per-endpoint usage counters get one
//! column each so the usage increment can run as a single atomic UPDATE
//! instead of a read-modify-write.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::credential::{Credential, RETENTION_DAYS};
use crate::endpoint::Endpoint;
use crate::error::{CredentialError, Result};
use crate::limits::RateLimits;
use crate::usage::{USAGE_RESET_DAYS, UsageCounters};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    credential_id               TEXT PRIMARY KEY,
    name                        TEXT NOT NULL,
    key_hash                    TEXT NOT NULL UNIQUE,
    key_prefix                  TEXT NOT NULL,
    domain_whitelist            TEXT NOT NULL,
    allow_wildcard_subdomains   INTEGER NOT NULL DEFAULT 0,
    rate_limits                 TEXT NOT NULL,
    is_active                   INTEGER NOT NULL DEFAULT 1,
    expires_at                  INTEGER,
    last_used_at                INTEGER,
    rotated_from                TEXT,
    rotated_at                  INTEGER,
    total_requests              INTEGER NOT NULL DEFAULT 0,
    usage_bookings              INTEGER NOT NULL DEFAULT 0,
    usage_availability          INTEGER NOT NULL DEFAULT 0,
    usage_locations             INTEGER NOT NULL DEFAULT 0,
    usage_schedules             INTEGER NOT NULL DEFAULT 0,
    last_reset_at               INTEGER NOT NULL,
    created_by                  TEXT NOT NULL,
    notes                       TEXT,
    tags                        TEXT NOT NULL,
    created_at                  INTEGER NOT NULL,
    updated_at                  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_credentials_prefix ON credentials (key_prefix);

CREATE TABLE IF NOT EXISTS booking_references (
    code        TEXT PRIMARY KEY,
    booking_id  TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL
);
"#;

const CREDENTIAL_COLUMNS: &str = "credential_id, name, key_hash, key_prefix, domain_whitelist, \
     allow_wildcard_subdomains, rate_limits, is_active, expires_at, last_used_at, rotated_from, \
     rotated_at, total_requests, usage_bookings, usage_availability, usage_locations, \
     usage_schedules, last_reset_at, created_by, notes, tags, created_at, updated_at";

/// Persistence collaborator for credentials and booking references.
pub struct CredentialStore {
    conn: Connection,
}

impl CredentialStore {
    /// Open (and migrate) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory store for tests and embedded callers.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    /// Persist a freshly issued credential.
    pub fn insert(&self, credential: &Credential) -> Result<()> {
        self.conn.execute(
            "INSERT INTO credentials (credential_id, name, key_hash, key_prefix, \
             domain_whitelist, allow_wildcard_subdomains, rate_limits, is_active, expires_at, \
             last_used_at, rotated_from, rotated_at, total_requests, usage_bookings, \
             usage_availability, usage_locations, usage_schedules, last_reset_at, created_by, \
             notes, tags, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
             ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                credential.id.to_string(),
                credential.name,
                credential.key_hash,
                credential.key_prefix,
                to_json(&credential.domain_whitelist)?,
                credential.allow_wildcard_subdomains,
                to_json(&credential.rate_limits)?,
                credential.is_active,
                credential.expires_at.map(|t| t.timestamp()),
                credential.last_used_at.map(|t| t.timestamp()),
                credential.rotated_from.map(|id| id.to_string()),
                credential.rotated_at.map(|t| t.timestamp()),
                credential.usage.total_requests,
                credential.usage.count_for(Endpoint::Bookings),
                credential.usage.count_for(Endpoint::Availability),
                credential.usage.count_for(Endpoint::Locations),
                credential.usage.count_for(Endpoint::Schedules),
                credential.usage.last_reset_at.timestamp(),
                credential.created_by,
                credential.notes,
                to_json(&credential.tags)?,
                credential.created_at.timestamp(),
                credential.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Write back a mutated credential (rotation, policy edits).
    pub fn update(&self, credential: &Credential) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE credentials SET name = ?2, domain_whitelist = ?3, \
             allow_wildcard_subdomains = ?4, rate_limits = ?5, is_active = ?6, expires_at = ?7, \
             last_used_at = ?8, rotated_from = ?9, rotated_at = ?10, total_requests = ?11, \
             usage_bookings = ?12, usage_availability = ?13, usage_locations = ?14, \
             usage_schedules = ?15, last_reset_at = ?16, notes = ?17, tags = ?18, \
             updated_at = ?19 \
             WHERE credential_id = ?1",
            params![
                credential.id.to_string(),
                credential.name,
                to_json(&credential.domain_whitelist)?,
                credential.allow_wildcard_subdomains,
                to_json(&credential.rate_limits)?,
                credential.is_active,
                credential.expires_at.map(|t| t.timestamp()),
                credential.last_used_at.map(|t| t.timestamp()),
                credential.rotated_from.map(|id| id.to_string()),
                credential.rotated_at.map(|t| t.timestamp()),
                credential.usage.total_requests,
                credential.usage.count_for(Endpoint::Bookings),
                credential.usage.count_for(Endpoint::Availability),
                credential.usage.count_for(Endpoint::Locations),
                credential.usage.count_for(Endpoint::Schedules),
                credential.usage.last_reset_at.timestamp(),
                credential.notes,
                to_json(&credential.tags)?,
                credential.updated_at.timestamp(),
            ],
        )?;
        if changed == 0 {
            return Err(CredentialError::NotFound);
        }
        Ok(())
    }

    /// Look up a credential by its plaintext prefix.
    ///
    /// Returns the row whatever its state; the gate inspects
    /// active/expiry itself so denials can be logged with the precise
    /// reason.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<Option<Credential>> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE key_prefix = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([prefix])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_credential(row)?)),
            None => Ok(None),
        }
    }

    /// All active, non-expired credentials.
    pub fn find_active(&self, now: DateTime<Utc>) -> Result<Vec<Credential>> {
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials \
             WHERE is_active = 1 AND (expires_at IS NULL OR expires_at > ?1) \
             ORDER BY created_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([now.timestamp()], row_to_credential)?;

        let mut credentials = Vec::new();
        for credential in rows {
            credentials.push(credential?);
        }
        Ok(credentials)
    }

    /// Record one request against a credential as a single atomic UPDATE.
    ///
    /// The rolling 30-day reset runs inside the statement, so concurrent
    /// requests cannot lose counts the way load-then-save would. The
    /// in-memory copy is updated to match.
    pub fn record_usage(&self, credential: &mut Credential, endpoint: Option<Endpoint>) -> Result<()> {
        self.record_usage_at(credential, endpoint, Utc::now())
    }

    /// [`Self::record_usage`] with an explicit clock.
    pub fn record_usage_at(
        &self,
        credential: &mut Credential,
        endpoint: Option<Endpoint>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let add = |e: Endpoint| -> i64 {
            if endpoint == Some(e) { 1 } else { 0 }
        };
        let window_secs = USAGE_RESET_DAYS * 24 * 60 * 60;

        let changed = self.conn.execute(
            "UPDATE credentials SET \
             total_requests = CASE WHEN ?2 - last_reset_at >= ?3 \
                 THEN 1 ELSE total_requests + 1 END, \
             usage_bookings = CASE WHEN ?2 - last_reset_at >= ?3 \
                 THEN ?4 ELSE usage_bookings + ?4 END, \
             usage_availability = CASE WHEN ?2 - last_reset_at >= ?3 \
                 THEN ?5 ELSE usage_availability + ?5 END, \
             usage_locations = CASE WHEN ?2 - last_reset_at >= ?3 \
                 THEN ?6 ELSE usage_locations + ?6 END, \
             usage_schedules = CASE WHEN ?2 - last_reset_at >= ?3 \
                 THEN ?7 ELSE usage_schedules + ?7 END, \
             last_reset_at = CASE WHEN ?2 - last_reset_at >= ?3 \
                 THEN ?2 ELSE last_reset_at END, \
             last_used_at = ?2, \
             updated_at = ?2 \
             WHERE credential_id = ?1",
            params![
                credential.id.to_string(),
                now.timestamp(),
                window_secs,
                add(Endpoint::Bookings),
                add(Endpoint::Availability),
                add(Endpoint::Locations),
                add(Endpoint::Schedules),
            ],
        )?;
        if changed == 0 {
            return Err(CredentialError::NotFound);
        }

        credential.usage.record(endpoint, now);
        credential.last_used_at = Some(now);
        credential.updated_at = now;
        Ok(())
    }

    /// Purge credentials that are inactive and past the retention window.
    ///
    /// Only rows with `is_active = 0` whose expiry is older than
    /// `now - RETENTION_DAYS` are removed. Active credentials stay put
    /// even when technically expired; they remain visible for rotation
    /// and audit until explicitly rotated out.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.cleanup_expired_at(Utc::now())
    }

    /// [`Self::cleanup_expired`] with an explicit clock.
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now.timestamp() - RETENTION_DAYS * 24 * 60 * 60;
        let deleted = self.conn.execute(
            "DELETE FROM credentials \
             WHERE is_active = 0 AND expires_at IS NOT NULL AND expires_at < ?1",
            params![cutoff],
        )?;
        if deleted > 0 {
            log::info!("purged {deleted} retired credentials");
        }
        Ok(deleted)
    }

    // ========================================================================
    // Booking references
    // ========================================================================

    /// Whether a reference code is already taken. Used as the existence
    /// predicate injected into the allocator.
    pub fn reference_exists(&self, code: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM booking_references WHERE code = ?1)",
            [code],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    /// Bind a reference code to a booking. The primary key on `code` is
    /// the real uniqueness guarantee; racing inserts fail here and the
    /// caller re-runs allocation.
    pub fn insert_reference(
        &self,
        code: &str,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO booking_references (code, booking_id, created_at) VALUES (?1, ?2, ?3)",
            params![code, booking_id, now.timestamp()],
        )?;
        Ok(())
    }

    /// Booking bound to a reference code, if any.
    pub fn find_reference(&self, code: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT booking_id FROM booking_references WHERE code = ?1")?;
        let mut rows = stmt.query([code])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    let id: String = row.get(0)?;
    let whitelist_json: String = row.get(4)?;
    let limits_json: String = row.get(6)?;
    let rotated_from: Option<String> = row.get(10)?;
    let tags_json: String = row.get(20)?;

    let mut usage = UsageCounters::new(timestamp(row, 17)?);
    usage.total_requests = row.get(12)?;
    usage.set_count(Endpoint::Bookings, row.get(13)?);
    usage.set_count(Endpoint::Availability, row.get(14)?);
    usage.set_count(Endpoint::Locations, row.get(15)?);
    usage.set_count(Endpoint::Schedules, row.get(16)?);

    Ok(Credential {
        id: parse_uuid(0, &id)?,
        name: row.get(1)?,
        key_hash: row.get(2)?,
        key_prefix: row.get(3)?,
        domain_whitelist: from_json(4, &whitelist_json)?,
        allow_wildcard_subdomains: row.get(5)?,
        rate_limits: from_json::<RateLimits>(6, &limits_json)?,
        is_active: row.get(7)?,
        expires_at: opt_timestamp(row, 8)?,
        last_used_at: opt_timestamp(row, 9)?,
        rotated_from: rotated_from.as_deref().map(|s| parse_uuid(10, s)).transpose()?,
        rotated_at: opt_timestamp(row, 11)?,
        usage,
        created_by: row.get(18)?,
        notes: row.get(19)?,
        tags: from_json(20, &tags_json)?,
        created_at: timestamp(row, 21)?,
        updated_at: timestamp(row, 22)?,
    })
}

fn timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(idx, secs)
    })
}

fn opt_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let secs: Option<i64> = row.get(idx)?;
    secs.map(|s| {
        DateTime::from_timestamp(s, 0)
            .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(idx, s))
    })
    .transpose()
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn from_json<T: serde::de::DeserializeOwned>(idx: usize, json: &str) -> rusqlite::Result<T> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| CredentialError::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, IssueRequest, KeyHasher};
    use chrono::Duration;
    use tempfile::TempDir;

    fn hasher() -> KeyHasher {
        KeyHasher::new(Some("store-test-pepper".to_string()))
    }

    /// Second-truncated now, so values survive the storage roundtrip.
    fn now_secs() -> DateTime<Utc> {
        DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
    }

    fn issue_into(store: &CredentialStore, name: &str, now: DateTime<Utc>) -> Credential {
        let (credential, _raw) =
            Credential::issue_at(IssueRequest::new(name, "ops"), &hasher(), now).unwrap();
        store.insert(&credential).unwrap();
        credential
    }

    #[test]
    fn test_insert_and_find_by_prefix_roundtrip() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();
        let (credential, _raw) = Credential::issue_at(
            IssueRequest::new("partner", "ops@example.com")
                .with_domains(vec!["example.com".into(), "*.example.org".into()])
                .with_wildcard_subdomains()
                .with_notes("pilot integration")
                .with_tags(vec!["partner".into(), "pilot".into()]),
            &hasher(),
            now,
        )
        .unwrap();
        store.insert(&credential).unwrap();

        let loaded = store
            .find_by_prefix(&credential.key_prefix)
            .unwrap()
            .expect("credential by prefix");
        assert_eq!(loaded, credential);
    }

    #[test]
    fn test_find_by_prefix_returns_inactive_rows() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();
        let mut credential = issue_into(&store, "k", now);
        credential.is_active = false;
        store.update(&credential).unwrap();

        let loaded = store.find_by_prefix(&credential.key_prefix).unwrap().unwrap();
        assert!(!loaded.is_active);
    }

    #[test]
    fn test_find_by_prefix_unknown_is_none() {
        let store = CredentialStore::open_in_memory().unwrap();
        assert!(store.find_by_prefix("deadbeef").unwrap().is_none());
    }

    #[test]
    fn test_key_hash_is_unique() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();
        let credential = issue_into(&store, "k", now);

        let mut dup = credential.clone();
        dup.id = uuid::Uuid::now_v7();
        assert!(store.insert(&dup).is_err());
    }

    #[test]
    fn test_find_active_filters_state_and_expiry() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();

        let live = issue_into(&store, "live", now);

        let mut retired = issue_into(&store, "retired", now);
        retired.is_active = false;
        store.update(&retired).unwrap();

        let (stale, _) = Credential::issue_at(
            IssueRequest::new("stale", "ops").with_expiry(now - Duration::days(1)),
            &hasher(),
            now - Duration::days(100),
        )
        .unwrap();
        store.insert(&stale).unwrap();

        let active = store.find_active(now).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live.id);
    }

    #[test]
    fn test_record_usage_increments_atomically() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();
        let mut credential = issue_into(&store, "k", now);

        store
            .record_usage_at(&mut credential, Some(Endpoint::Bookings), now)
            .unwrap();
        store
            .record_usage_at(&mut credential, Some(Endpoint::Bookings), now)
            .unwrap();
        store.record_usage_at(&mut credential, None, now).unwrap();

        // In-memory mirror agrees with what was written.
        assert_eq!(credential.usage.total_requests, 3);
        assert_eq!(credential.usage.count_for(Endpoint::Bookings), 2);
        assert_eq!(credential.last_used_at, Some(now));

        let loaded = store.find_by_prefix(&credential.key_prefix).unwrap().unwrap();
        assert_eq!(loaded.usage.total_requests, 3);
        assert_eq!(loaded.usage.count_for(Endpoint::Bookings), 2);
        assert_eq!(loaded.usage.count_for(Endpoint::Locations), 0);
        assert_eq!(loaded.last_used_at, Some(now));
    }

    #[test]
    fn test_record_usage_applies_rolling_reset() {
        let store = CredentialStore::open_in_memory().unwrap();
        let start = now_secs() - Duration::days(31);
        let mut credential = {
            let (mut c, _) =
                Credential::issue_at(IssueRequest::new("k", "ops"), &hasher(), start).unwrap();
            c.usage.total_requests = 500;
            c.usage.set_count(Endpoint::Bookings, 450);
            store.insert(&c).unwrap();
            c
        };

        let now = now_secs();
        store
            .record_usage_at(&mut credential, Some(Endpoint::Availability), now)
            .unwrap();

        let loaded = store.find_by_prefix(&credential.key_prefix).unwrap().unwrap();
        assert_eq!(loaded.usage.total_requests, 1);
        assert_eq!(loaded.usage.count_for(Endpoint::Bookings), 0);
        assert_eq!(loaded.usage.count_for(Endpoint::Availability), 1);
        assert_eq!(loaded.usage.last_reset_at, now);
        assert_eq!(credential.usage, loaded.usage);
    }

    #[test]
    fn test_record_usage_unknown_credential_is_not_found() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();
        let (mut ghost, _) =
            Credential::issue_at(IssueRequest::new("ghost", "ops"), &hasher(), now).unwrap();
        assert!(matches!(
            store.record_usage_at(&mut ghost, None, now),
            Err(CredentialError::NotFound)
        ));
    }

    #[test]
    fn test_cleanup_removes_only_retired_and_stale() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();

        // Inactive, expired well past retention: purged.
        let mut purgeable = issue_into(&store, "purgeable", now - Duration::days(200));
        purgeable.is_active = false;
        purgeable.expires_at = Some(now - Duration::days(RETENTION_DAYS + 10));
        store.update(&purgeable).unwrap();

        // Active but expired: left in place.
        let mut expired_active = issue_into(&store, "expired-active", now - Duration::days(200));
        expired_active.expires_at = Some(now - Duration::days(RETENTION_DAYS + 10));
        store.update(&expired_active).unwrap();

        // Inactive but inside the retention window: left in place.
        let mut recent_inactive = issue_into(&store, "recent-inactive", now);
        recent_inactive.is_active = false;
        recent_inactive.expires_at = Some(now - Duration::days(1));
        store.update(&recent_inactive).unwrap();

        let deleted = store.cleanup_expired_at(now).unwrap();
        assert_eq!(deleted, 1);

        assert!(store.find_by_prefix(&purgeable.key_prefix).unwrap().is_none());
        assert!(store.find_by_prefix(&expired_active.key_prefix).unwrap().is_some());
        assert!(store.find_by_prefix(&recent_inactive.key_prefix).unwrap().is_some());
    }

    #[test]
    fn test_reference_uniqueness_and_lookup() {
        let store = CredentialStore::open_in_memory().unwrap();
        let now = now_secs();

        assert!(!store.reference_exists("W2345678").unwrap());
        store.insert_reference("W2345678", "booking-1", now).unwrap();
        assert!(store.reference_exists("W2345678").unwrap());
        assert_eq!(
            store.find_reference("W2345678").unwrap(),
            Some("booking-1".to_string())
        );

        // Same code again: the primary key rejects it.
        assert!(store.insert_reference("W2345678", "booking-2", now).is_err());
        assert!(store.find_reference("WAAAAAAA").unwrap().is_none());
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.db");
        let now = now_secs();

        let prefix = {
            let store = CredentialStore::open(&path).unwrap();
            issue_into(&store, "durable", now).key_prefix
        };

        let store = CredentialStore::open(&path).unwrap();
        let loaded = store.find_by_prefix(&prefix).unwrap().unwrap();
        assert_eq!(loaded.name, "durable");
    }
}
