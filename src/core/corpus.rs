// src/core/corpus.rs

//! Read-only access to the vulnerability corpus.
//!
//! Ingestion lives elsewhere; the assessment only needs to query records by
//! keyword and by id. The SQLite layout is the `cves` table produced by the
//! NVD loader: `id, description, published, last_modified, cvss`.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OpenFlags, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::core::error::CorpusError;
use crate::core::models::VulnerabilityRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cves (
    id TEXT PRIMARY KEY,
    description TEXT,
    published TEXT,
    last_modified TEXT,
    cvss REAL
);
CREATE INDEX IF NOT EXISTS idx_cvss ON cves(cvss);
CREATE INDEX IF NOT EXISTS idx_published ON cves(published);
";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A queryable store of known vulnerabilities.
pub trait VulnerabilityCorpus: Send + Sync {
    /// All records whose description contains `keyword`, case-insensitively.
    fn records_matching(&self, keyword: &str) -> Result<Vec<VulnerabilityRecord>, CorpusError>;

    fn record_by_id(&self, id: &str) -> Result<Option<VulnerabilityRecord>, CorpusError>;
}

/// Corpus backed by the SQLite file written by the CVE loader.
pub struct SqliteCorpus {
    conn: Mutex<Connection>,
}

impl SqliteCorpus {
    /// Opens an existing corpus read-only. A missing file or table is
    /// reported as unavailable rather than treated as an empty corpus.
    pub fn open(path: &Path) -> Result<Self, CorpusError> {
        if !path.is_file() {
            return Err(CorpusError::Unavailable(format!("{} does not exist", path.display())));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'cves'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(CorpusError::Unavailable(format!("{} has no cves table", path.display())));
        }
        info!(path = %path.display(), "Opened vulnerability corpus.");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// A writable, empty corpus in memory. Used for seeding and tests.
    pub fn in_memory() -> Result<Self, CorpusError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Inserts a record, keeping the existing one on id collision.
    pub fn insert(&self, record: &VulnerabilityRecord) -> Result<(), CorpusError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO cves (id, description, published, last_modified, cvss)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.description,
                record.published.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                record.last_modified.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                record.cvss,
            ],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64, CorpusError> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cves", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, CorpusError> {
        self.conn
            .lock()
            .map_err(|_| CorpusError::Unavailable("corpus connection poisoned".to_string()))
    }
}

impl VulnerabilityCorpus for SqliteCorpus {
    fn records_matching(&self, keyword: &str) -> Result<Vec<VulnerabilityRecord>, CorpusError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, description, published, last_modified, cvss
             FROM cves
             WHERE description LIKE ?1 ESCAPE '\\'
             ORDER BY rowid",
        )?;
        let pattern = format!("%{}%", escape_like(keyword));
        let rows = stmt.query_map(params![pattern], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        debug!(keyword, count = records.len(), "Keyword query finished.");
        Ok(records)
    }

    fn record_by_id(&self, id: &str) -> Result<Option<VulnerabilityRecord>, CorpusError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, description, published, last_modified, cvss FROM cves WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], record_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<VulnerabilityRecord> {
    let id: String = row.get(0)?;
    let published: Option<String> = row.get(2)?;
    let last_modified: Option<String> = row.get(3)?;
    Ok(VulnerabilityRecord {
        description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        published: published.as_deref().and_then(|raw| parse_timestamp(&id, raw)),
        last_modified: last_modified.as_deref().and_then(|raw| parse_timestamp(&id, raw)),
        cvss: row.get(4)?,
        id,
    })
}

/// Accepts RFC 3339 and the zone-less NVD form (`2019-08-14T17:15:11.227`).
fn parse_timestamp(id: &str, raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            warn!(cve = id, raw, error = %e, "Unparseable timestamp in corpus record.");
            None
        }
    }
}

fn escape_like(keyword: &str) -> String {
    keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Corpus held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    records: Vec<VulnerabilityRecord>,
}

impl InMemoryCorpus {
    pub fn new(records: Vec<VulnerabilityRecord>) -> Self {
        Self { records }
    }
}

impl VulnerabilityCorpus for InMemoryCorpus {
    fn records_matching(&self, keyword: &str) -> Result<Vec<VulnerabilityRecord>, CorpusError> {
        let needle = keyword.to_lowercase();
        Ok(self
            .records
            .iter()
            .filter(|r| r.description.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn record_by_id(&self, id: &str) -> Result<Option<VulnerabilityRecord>, CorpusError> {
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, description: &str, cvss: Option<f64>) -> VulnerabilityRecord {
        VulnerabilityRecord {
            id: id.to_string(),
            description: description.to_string(),
            published: Some(Utc.with_ymd_and_hms(2019, 8, 14, 17, 15, 11).unwrap()),
            last_modified: None,
            cvss,
        }
    }

    fn seeded() -> SqliteCorpus {
        let corpus = SqliteCorpus::in_memory().unwrap();
        corpus.insert(&record("CVE-2019-9506", "The Bluetooth BR/EDR KNOB attack", Some(8.1))).unwrap();
        corpus.insert(&record("CVE-2020-0022", "An out of bounds write in bluetooth stack", None)).unwrap();
        corpus.insert(&record("CVE-2021-44228", "Apache Log4j2 JNDI features", Some(10.0))).unwrap();
        corpus
    }

    #[test]
    fn keyword_query_is_case_insensitive() {
        let corpus = seeded();
        let ids: Vec<_> = corpus
            .records_matching("bluetooth")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["CVE-2019-9506", "CVE-2020-0022"]);
    }

    #[test]
    fn keyword_wildcards_are_literal() {
        let corpus = seeded();
        assert!(corpus.records_matching("%").unwrap().is_empty());
        assert!(corpus.records_matching("_luetooth").unwrap().is_empty());
    }

    #[test]
    fn fetch_by_id_round_trips_fields() {
        let corpus = seeded();
        let found = corpus.record_by_id("CVE-2019-9506").unwrap().unwrap();
        assert_eq!(found.cvss, Some(8.1));
        assert_eq!(found.published, Some(Utc.with_ymd_and_hms(2019, 8, 14, 17, 15, 11).unwrap()));
        assert!(corpus.record_by_id("CVE-0000-0000").unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_keeps_first_record() {
        let corpus = seeded();
        corpus.insert(&record("CVE-2019-9506", "changed", Some(1.0))).unwrap();
        assert_eq!(corpus.count().unwrap(), 3);
        assert_eq!(corpus.record_by_id("CVE-2019-9506").unwrap().unwrap().cvss, Some(8.1));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let result = SqliteCorpus::open(Path::new("/nonexistent/bluetooth_cves.db"));
        assert!(matches!(result, Err(CorpusError::Unavailable(_))));
    }

    #[test]
    fn nvd_timestamps_parse_without_zone() {
        let parsed = parse_timestamp("CVE-1", "2019-08-14T17:15:11.227").unwrap();
        assert_eq!(parsed.timestamp(), Utc.with_ymd_and_hms(2019, 8, 14, 17, 15, 11).unwrap().timestamp());
        assert!(parse_timestamp("CVE-1", "2021-01-01T00:00:00Z").is_some());
        assert!(parse_timestamp("CVE-1", "yesterday").is_none());
    }

    #[test]
    fn in_memory_corpus_matches_keyword() {
        let corpus = InMemoryCorpus::new(vec![
            record("CVE-1", "BLUETOOTH pairing flaw", None),
            record("CVE-2", "kernel bug", None),
        ]);
        assert_eq!(corpus.records_matching("bluetooth").unwrap().len(), 1);
        assert_eq!(corpus.record_by_id("CVE-2").unwrap().unwrap().description, "kernel bug");
    }
}
