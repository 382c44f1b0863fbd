//! Baseline store: target URL -> last verified fingerprints.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compare::{Baseline, Fingerprints};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub resolved_download_url: String,
    pub file_hash: String,
    pub html_hash: String,
    pub last_checked_at: DateTime<FixedOffset>,
}

impl BaselineRecord {
    pub fn fingerprints(&self) -> Fingerprints {
        Fingerprints {
            file_hash: self.file_hash.clone(),
            html_hash: self.html_hash.clone(),
        }
    }
}

/// Both hashes empty (or no record at all) means the target was never
/// verified. One empty hash alone is still treated as established.
pub fn baseline_of(record: Option<&BaselineRecord>) -> Baseline {
    match record {
        Some(r) if !(r.file_hash.is_empty() && r.html_hash.is_empty()) => {
            Baseline::Established(r.fingerprints())
        }
        _ => Baseline::NoBaseline,
    }
}

/// Read-all / per-key write access to persisted baselines. Callers keep a
/// single writer; implementations are not required to be `Sync`.
pub trait BaselineRepository {
    fn load_all(&self) -> Result<HashMap<String, BaselineRecord>>;
    fn put(&mut self, url: &str, record: &BaselineRecord) -> Result<()>;
    /// Make every `put` durable.
    fn flush(&mut self) -> Result<()>;
}

/// Pick a backend from the file extension: `.sqlite`/`.db` or JSON.
pub fn open(path: &Path) -> Result<Box<dyn BaselineRepository>> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("sqlite") || ext.eq_ignore_ascii_case("db") {
        Ok(Box::new(SqliteStore::open(path)?))
    } else {
        Ok(Box::new(JsonStore::open(path)?))
    }
}

// ── JSON ──

pub struct JsonStore {
    path: PathBuf,
    records: BTreeMap<String, BaselineRecord>,
}

impl JsonStore {
    pub fn open(path: &Path) -> Result<Self> {
        let records = match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse baseline store {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Baseline store {:?} not found, starting empty", path);
                BTreeMap::new()
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }
}

impl BaselineRepository for JsonStore {
    fn load_all(&self) -> Result<HashMap<String, BaselineRecord>> {
        Ok(self.records.clone().into_iter().collect())
    }

    fn put(&mut self, url: &str, record: &BaselineRecord) -> Result<()> {
        self.records.insert(url.to_string(), record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;
        Ok(())
    }
}

// ── SQLite ──

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS baselines (
                url                   TEXT PRIMARY KEY,
                resolved_download_url TEXT NOT NULL,
                file_hash             TEXT NOT NULL,
                html_hash             TEXT NOT NULL,
                last_checked_at       TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

impl BaselineRepository for SqliteStore {
    fn load_all(&self) -> Result<HashMap<String, BaselineRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, resolved_download_url, file_hash, html_hash, last_checked_at
             FROM baselines",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = HashMap::with_capacity(rows.len());
        for (url, resolved_download_url, file_hash, html_hash, checked) in rows {
            let last_checked_at = DateTime::parse_from_rfc3339(&checked)
                .with_context(|| format!("Bad timestamp {:?} for {}", checked, url))?;
            records.insert(
                url,
                BaselineRecord {
                    resolved_download_url,
                    file_hash,
                    html_hash,
                    last_checked_at,
                },
            );
        }
        Ok(records)
    }

    fn put(&mut self, url: &str, record: &BaselineRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO baselines (url, resolved_download_url, file_hash, html_hash, last_checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET
                resolved_download_url = excluded.resolved_download_url,
                file_hash = excluded.file_hash,
                html_hash = excluded.html_hash,
                last_checked_at = excluded.last_checked_at",
            rusqlite::params![
                url,
                record.resolved_download_url,
                record.file_hash,
                record.html_hash,
                record.last_checked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
