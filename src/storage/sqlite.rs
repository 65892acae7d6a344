//! `SQLite` backend for the path index.

use std::collections::VecDeque;
use std::path::Path;

use chrono::{TimeZone, Utc};
use rusqlite::params;

use super::connection::Database;
use super::keys::entry_key;
use super::models::PathEntry;
use super::schema;
use super::store::{EntryIter, IndexedStore};
use crate::error::StorageError;
use crate::Result;

/// Rows fetched per scan page.
const SCAN_PAGE: u32 = 256;

/// Relational store backed by a single `entries` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, reset: bool) -> Result<Self> {
        Self::init(Database::open(path)?, reset)
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Database::open_in_memory()?, false)
    }

    fn init(db: Database, reset: bool) -> Result<Self> {
        db.health_check()?;
        db.with_conn(|conn| {
            schema::migrate(conn)?;
            schema::verify_schema(conn)?;
            if reset {
                schema::reset(conn)?;
            }
            Ok(())
        })?;

        tracing::info!(path = %db.path(), reset, "SQLite index opened");
        Ok(Self { db })
    }
}

impl IndexedStore for SqliteStore {
    fn add(&self, entry: &PathEntry) -> Result<()> {
        let key = entry_key(&entry.name, entry.is_dir);
        self.db.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO entries (key, name, is_dir, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    key,
                    entry.name,
                    entry.is_dir,
                    entry.updated_at.timestamp_millis()
                ])
            })
            .map_err(StorageError::database)?;
            Ok(())
        })
    }

    fn delete(&self, entry: &PathEntry) -> Result<()> {
        let key = entry_key(&entry.name, entry.is_dir);
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key])
                .map_err(StorageError::database)?;
            Ok(())
        })
    }

    fn delete_range(&self, lower: &[u8], upper: &[u8]) -> Result<usize> {
        self.db.with_transaction(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM entries WHERE key >= ?1 AND key < ?2",
                    params![lower, upper],
                )
                .map_err(StorageError::database)?;
            Ok(removed)
        })
    }

    fn scan(&self, lower: &[u8], upper: &[u8]) -> Result<EntryIter> {
        if self.db.is_closed() {
            return Err(StorageError::Closed.into());
        }

        Ok(Box::new(PagedScan {
            db: self.db.clone(),
            next: lower.to_vec(),
            upper: upper.to_vec(),
            page: VecDeque::new(),
            exhausted: lower >= upper,
        }))
    }

    fn len(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                .map_err(StorageError::database)?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }

    fn flush(&self) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
                .map_err(StorageError::database)?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        if self.db.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.db.close()
    }
}

/// Keyset-paginated range scan.
///
/// The connection lock is only held while a page is read, never while the
/// caller consumes entries.
struct PagedScan {
    db: Database,
    next: Vec<u8>,
    upper: Vec<u8>,
    page: VecDeque<PathEntry>,
    exhausted: bool,
}

impl PagedScan {
    fn fill(&mut self) -> Result<()> {
        let rows: Vec<(Vec<u8>, PathEntry)> = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT key, name, is_dir, updated_at FROM entries
                     WHERE key >= ?1 AND key < ?2 ORDER BY key LIMIT ?3",
                )
                .map_err(StorageError::database)?;

            let rows = stmt
                .query_map(params![self.next, self.upper, SCAN_PAGE], |row| {
                    let millis: i64 = row.get(3)?;
                    Ok((
                        row.get(0)?,
                        PathEntry {
                            name: row.get(1)?,
                            is_dir: row.get(2)?,
                            updated_at: Utc
                                .timestamp_millis_opt(millis)
                                .single()
                                .unwrap_or_default(),
                        },
                    ))
                })
                .map_err(StorageError::database)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::database)?;
            Ok(rows)
        })?;

        if rows.len() < SCAN_PAGE as usize {
            self.exhausted = true;
        }
        if let Some((key, _)) = rows.last() {
            self.next.clone_from(key);
            self.next.push(0);
        }
        self.page.extend(rows.into_iter().map(|(_, entry)| entry));
        Ok(())
    }
}

impl Iterator for PagedScan {
    type Item = Result<PathEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.page.pop_front() {
            return Some(Ok(entry));
        }
        if self.exhausted {
            return None;
        }

        match self.fill() {
            Ok(()) => self.page.pop_front().map(Ok),
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}
