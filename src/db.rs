use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::SnapshotSource;
use crate::models::{Company, JobPosting, Signal, SignalKind, Snapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed row in {table}{}: {reason}", .id.map(|id| format!(" (id {})", id)).unwrap_or_default())]
    MalformedRow {
        table: &'static str,
        id: Option<i64>,
        reason: String,
    },
    #[error("database not initialized. Run 'radar init' first.")]
    NotInitialized,
    #[error("failed to create database directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Fields accepted when inserting or refreshing a posting.
#[derive(Debug, Clone)]
pub struct NewPosting {
    pub source_job_id: String,
    pub title: String,
    pub department: Option<String>,
    pub location: Option<String>,
    pub apply_url: Option<String>,
    pub role_family: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                careers_url TEXT,
                ats_kind TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS job_postings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
                source_job_id TEXT NOT NULL,
                title TEXT NOT NULL,
                department TEXT,
                location TEXT,
                apply_url TEXT,
                role_family TEXT,
                status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT,
                UNIQUE (company_id, source_job_id)
            );

            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                happened_at TEXT NOT NULL,
                payload_json TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_postings_company ON job_postings(company_id);
            CREATE INDEX IF NOT EXISTS idx_postings_status ON job_postings(status);
            CREATE INDEX IF NOT EXISTS idx_signals_company ON signals(company_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='job_postings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    // --- Company operations ---

    /// Returns the id of an existing company with the same name
    /// (case-insensitive) instead of inserting a duplicate.
    pub fn add_company(
        &self,
        name: &str,
        careers_url: Option<&str>,
        ats_kind: Option<&str>,
    ) -> Result<(i64, bool)> {
        let name = name.trim();
        if let Some(existing) = self.get_company_by_name(name)? {
            return Ok((existing.id, false));
        }

        self.conn.execute(
            "INSERT INTO companies (name, careers_url, ats_kind, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                careers_url.map(str::trim),
                ats_kind.map(|k| k.trim().to_lowercase()),
                Utc::now()
            ],
        )?;
        Ok((self.conn.last_insert_rowid(), true))
    }

    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, careers_url, ats_kind, created_at FROM companies ORDER BY name",
        )?;
        let rows = stmt.query_map([], Self::row_to_company)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_company_by_name(&self, name: &str) -> Result<Option<Company>> {
        let company = self
            .conn
            .query_row(
                "SELECT id, name, careers_url, ats_kind, created_at
                 FROM companies WHERE LOWER(name) = LOWER(?1)",
                [name.trim()],
                Self::row_to_company,
            )
            .optional()?;
        Ok(company)
    }

    pub fn get_company(&self, id: i64) -> Result<Option<Company>> {
        let company = self
            .conn
            .query_row(
                "SELECT id, name, careers_url, ats_kind, created_at FROM companies WHERE id = ?1",
                [id],
                Self::row_to_company,
            )
            .optional()?;
        Ok(company)
    }

    fn row_to_company(row: &rusqlite::Row) -> rusqlite::Result<Company> {
        Ok(Company {
            id: row.get(0)?,
            name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            careers_url: row.get(2)?,
            ats_kind: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Posting operations ---

    /// Insert or refresh a posting keyed by `(company_id, source_job_id)`.
    /// Refreshing re-opens the posting. Returns the posting id.
    pub fn upsert_posting(&self, company_id: i64, posting: &NewPosting) -> Result<i64> {
        let updated_at = posting.updated_at.unwrap_or(posting.created_at);
        self.conn.execute(
            "INSERT INTO job_postings
                (company_id, source_job_id, title, department, location, apply_url,
                 role_family, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?9)
             ON CONFLICT (company_id, source_job_id) DO UPDATE SET
                title = excluded.title,
                department = excluded.department,
                location = excluded.location,
                apply_url = excluded.apply_url,
                role_family = COALESCE(excluded.role_family, job_postings.role_family),
                status = 'open',
                updated_at = excluded.updated_at",
            params![
                company_id,
                posting.source_job_id,
                posting.title,
                posting.department,
                posting.location,
                posting.apply_url,
                posting.role_family,
                posting.created_at,
                updated_at,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM job_postings WHERE company_id = ?1 AND source_job_id = ?2",
            params![company_id, posting.source_job_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Returns false if no open posting had that id.
    pub fn close_posting(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE job_postings SET status = 'closed', updated_at = ?1
             WHERE id = ?2 AND status = 'open'",
            params![Utc::now(), id],
        )?;
        Ok(changed > 0)
    }

    /// Open postings of one company, most recently touched first. Role
    /// families compare case-insensitively against `role_families`.
    pub fn list_company_postings(
        &self,
        company_id: i64,
        role_families: Option<&[String]>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<JobPosting>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_id, source_job_id, title, department, location, apply_url,
                    role_family, status, created_at, updated_at
             FROM job_postings
             WHERE company_id = ?1 AND status = 'open'
             ORDER BY COALESCE(updated_at, created_at) DESC, id DESC",
        )?;
        let rows = stmt.query_map([company_id], Self::row_to_posting)?;

        let mut out = Vec::new();
        for row in rows {
            let posting = row?;
            if let Some(families) = role_families {
                let family = posting.role_family.as_deref().unwrap_or("").to_lowercase();
                if !families.iter().any(|f| *f == family) {
                    continue;
                }
            }
            if since.is_some_and(|cutoff| posting.effective_at() < cutoff) {
                continue;
            }
            out.push(posting);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn row_to_posting(row: &rusqlite::Row) -> rusqlite::Result<JobPosting> {
        Ok(JobPosting {
            id: row.get(0)?,
            company_id: row.get(1)?,
            source_job_id: row.get(2)?,
            title: row.get(3)?,
            department: row.get(4)?,
            location: row.get(5)?,
            apply_url: row.get(6)?,
            role_family: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // --- Signal operations ---

    pub fn add_signal(
        &self,
        company_id: i64,
        kind: SignalKind,
        happened_at: DateTime<Utc>,
        payload: Option<&serde_json::Value>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO signals (company_id, kind, happened_at, payload_json) VALUES (?1, ?2, ?3, ?4)",
            params![
                company_id,
                kind.as_str(),
                happened_at,
                payload.map(|p| p.to_string())
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // --- Snapshot ---

    /// Reads the whole population, its open postings and its signals inside
    /// one read transaction.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.ensure_initialized()?;
        let tx = self.conn.unchecked_transaction()?;

        let companies = {
            let mut stmt = tx.prepare(
                "SELECT id, name, careers_url, ats_kind, created_at FROM companies ORDER BY id",
            )?;
            let rows = stmt.query_map([], Self::row_to_company)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| malformed("companies", e))?
        };

        let postings = {
            let mut stmt = tx.prepare(
                "SELECT id, company_id, source_job_id, title, department, location, apply_url,
                        role_family, status, created_at, updated_at
                 FROM job_postings WHERE status = 'open' ORDER BY id",
            )?;
            let rows = stmt.query_map([], Self::row_to_posting)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| malformed("job_postings", e))?
        };

        let signals = {
            let mut stmt = tx.prepare(
                "SELECT id, company_id, kind, happened_at, payload_json FROM signals ORDER BY id",
            )?;
            let mut rows = stmt.query([])?;
            let mut signals = Vec::new();
            while let Some(row) = rows.next()? {
                signals.push(Self::row_to_signal(row)?);
            }
            signals
        };

        tx.finish()?;
        tracing::debug!(
            companies = companies.len(),
            postings = postings.len(),
            signals = signals.len(),
            "loaded snapshot"
        );
        Ok(Snapshot {
            companies,
            postings,
            signals,
        })
    }

    fn row_to_signal(row: &rusqlite::Row) -> Result<Signal> {
        let id: i64 = row.get(0)?;
        let kind: String = row.get(2)?;
        let kind = kind.parse::<SignalKind>().map_err(|reason| StoreError::MalformedRow {
            table: "signals",
            id: Some(id),
            reason,
        })?;
        let payload = match row.get::<_, Option<String>>(4)? {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| StoreError::MalformedRow {
                table: "signals",
                id: Some(id),
                reason: format!("payload is not JSON: {}", e),
            })?),
            None => None,
        };
        let happened_at: DateTime<Utc> = row.get(3).map_err(|e| StoreError::MalformedRow {
            table: "signals",
            id: Some(id),
            reason: e.to_string(),
        })?;
        Ok(Signal {
            id,
            company_id: row.get(1)?,
            kind,
            happened_at,
            payload,
        })
    }
}

impl SnapshotSource for Database {
    fn load_snapshot(&self) -> Result<Snapshot> {
        self.snapshot()
    }
}

/// Conversion failures (unparseable timestamps, wrong column types) are row
/// problems, everything else is the connection's.
fn malformed(table: &'static str, err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::MalformedRow {
            table,
            id: None,
            reason: err.to_string(),
        },
        other => StoreError::Sqlite(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn posting(source_job_id: &str, family: Option<&str>, created_at: DateTime<Utc>) -> NewPosting {
        NewPosting {
            source_job_id: source_job_id.to_string(),
            title: "Backend Engineer".to_string(),
            department: None,
            location: Some("Remote".to_string()),
            apply_url: None,
            role_family: family.map(str::to_string),
            created_at,
            updated_at: None,
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, day, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_ensure_initialized_requires_init() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.ensure_initialized(), Err(StoreError::NotInitialized)));
        db.init().unwrap();
        assert!(db.ensure_initialized().is_ok());
    }

    #[test]
    fn test_add_company_is_idempotent_by_name() {
        let db = db();
        let (id, created) = db.add_company("Acme", Some("https://acme.dev/jobs"), Some("Greenhouse")).unwrap();
        assert!(created);
        let (again, created) = db.add_company("  acme ", None, None).unwrap();
        assert!(!created);
        assert_eq!(id, again);

        let companies = db.list_companies().unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].ats_kind.as_deref(), Some("greenhouse"));
    }

    #[test]
    fn test_upsert_posting_refreshes_and_reopens() {
        let db = db();
        let (company_id, _) = db.add_company("Acme", None, None).unwrap();
        let first = db.upsert_posting(company_id, &posting("gh-1", Some("SDE"), ts(1))).unwrap();
        assert!(db.close_posting(first).unwrap());
        assert!(!db.close_posting(first).unwrap());

        let mut refreshed = posting("gh-1", None, ts(1));
        refreshed.updated_at = Some(ts(20));
        let second = db.upsert_posting(company_id, &refreshed).unwrap();
        assert_eq!(first, second);

        let snapshot = db.snapshot().unwrap();
        assert_eq!(snapshot.postings.len(), 1);
        let p = &snapshot.postings[0];
        assert_eq!(p.status, "open");
        assert_eq!(p.role_family.as_deref(), Some("SDE"));
        assert_eq!(p.created_at, ts(1));
        assert_eq!(p.effective_at(), ts(20));
    }

    #[test]
    fn test_snapshot_excludes_closed_postings() {
        let db = db();
        let (company_id, _) = db.add_company("Acme", None, None).unwrap();
        let keep = db.upsert_posting(company_id, &posting("a", Some("sde"), ts(2))).unwrap();
        let gone = db.upsert_posting(company_id, &posting("b", Some("sde"), ts(3))).unwrap();
        db.close_posting(gone).unwrap();

        let snapshot = db.snapshot().unwrap();
        assert_eq!(snapshot.companies.len(), 1);
        let ids: Vec<i64> = snapshot.postings.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![keep]);
    }

    #[test]
    fn test_signals_round_trip_with_payload() {
        let db = db();
        let (company_id, _) = db.add_company("Acme", None, None).unwrap();
        let payload = serde_json::json!({"thread": "2025-08", "comments": 3});
        db.add_signal(company_id, SignalKind::CommunityHiring, ts(5), Some(&payload)).unwrap();
        db.add_signal(company_id, SignalKind::Layoff, ts(6), None).unwrap();

        let snapshot = db.snapshot().unwrap();
        assert_eq!(snapshot.signals.len(), 2);
        assert_eq!(snapshot.signals[0].kind, SignalKind::CommunityHiring);
        assert_eq!(snapshot.signals[0].payload.as_ref(), Some(&payload));
        assert_eq!(snapshot.signals[1].happened_at, ts(6));
    }

    #[test]
    fn test_reads_sqlite_default_timestamps() {
        let db = db();
        db.conn
            .execute("INSERT INTO companies (name) VALUES ('Defaulted')", [])
            .unwrap();
        let snapshot = db.snapshot().unwrap();
        let age = Utc::now() - snapshot.companies[0].created_at;
        assert!(age < Duration::minutes(5));
    }

    #[test]
    fn test_malformed_signal_kind_is_reported() {
        let db = db();
        let (company_id, _) = db.add_company("Acme", None, None).unwrap();
        db.conn
            .execute(
                "INSERT INTO signals (company_id, kind, happened_at) VALUES (?1, 'rumor', ?2)",
                params![company_id, ts(1)],
            )
            .unwrap();
        let err = db.snapshot().unwrap_err();
        assert!(matches!(err, StoreError::MalformedRow { table: "signals", .. }));
    }

    #[test]
    fn test_malformed_timestamp_is_reported() {
        let db = db();
        db.conn
            .execute(
                "INSERT INTO companies (name, created_at) VALUES ('Broken', 'not a date')",
                [],
            )
            .unwrap();
        let err = db.snapshot().unwrap_err();
        assert!(matches!(err, StoreError::MalformedRow { table: "companies", .. }));
    }

    #[test]
    fn test_list_company_postings_filters_and_orders() {
        let db = db();
        let (company_id, _) = db.add_company("Acme", None, None).unwrap();
        db.upsert_posting(company_id, &posting("old", Some("SDE"), ts(1))).unwrap();
        db.upsert_posting(company_id, &posting("new", Some("swe"), ts(10))).unwrap();
        db.upsert_posting(company_id, &posting("sales", Some("sales"), ts(11))).unwrap();

        let families = vec!["software".to_string(), "swe".to_string(), "sde".to_string()];
        let all = db
            .list_company_postings(company_id, Some(&families), None, 10)
            .unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.source_job_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let recent = db
            .list_company_postings(company_id, Some(&families), Some(ts(5)), 10)
            .unwrap();
        assert_eq!(recent.len(), 1);

        let limited = db.list_company_postings(company_id, None, None, 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].source_job_id, "sales");
    }

    #[test]
    fn test_snapshot_source_for_database() {
        let db = db();
        db.add_company("Acme", None, None).unwrap();
        let snapshot = SnapshotSource::load_snapshot(&db).unwrap();
        assert_eq!(snapshot.companies[0].display_name(), "Acme");
    }
}
