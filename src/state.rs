// src/state.rs

//! Host state database
//!
//! Durable, process-local record of what the managed host looks like:
//! the installed package set, dpkg-style holds, legacy name+constraint
//! locks, and reload bookkeeping. This is the selection database the
//! commit step mutates; the engine never rolls these tables back on its
//! own.

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// A legacy lock entry: name plus optional relation/version condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub name: String,
    pub relation: String,
    pub version: String,
}

/// Connection to the host state database.
#[derive(Debug)]
pub struct HostState {
    conn: Connection,
}

impl HostState {
    /// Open (creating and migrating if necessary) the state database.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Channel(format!("failed to create state directory: {}", e))
            })?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        let state = Self { conn };
        state.migrate()?;
        debug!("Host state database opened at {}", db_path.display());
        Ok(state)
    }

    /// In-memory state, for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let state = Self { conn };
        state.migrate()?;
        Ok(state)
    }

    /// Idempotent schema creation.
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS installed (
                name    TEXT PRIMARY KEY,
                version TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS holds (
                name TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS locks (
                name     TEXT NOT NULL,
                relation TEXT NOT NULL DEFAULT '',
                version  TEXT NOT NULL DEFAULT '',
                UNIQUE (name, relation, version)
            );
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // Installed set

    pub fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM installed WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    pub fn is_installed(&self, name: &str, version: &str) -> Result<bool> {
        Ok(self.installed_version(name)?.as_deref() == Some(version))
    }

    /// Every installed (name, version) pair.
    pub fn installed(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, version FROM installed ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    pub fn set_installed(&self, name: &str, version: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO installed (name, version) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET version = excluded.version",
            params![name, version],
        )?;
        Ok(())
    }

    pub fn remove_installed(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM installed WHERE name = ?1", params![name])?;
        Ok(())
    }

    // Holds (modern backend)

    pub fn set_hold(&self, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO holds (name) VALUES (?1)",
            params![name],
        )?;
        Ok(())
    }

    pub fn remove_hold(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM holds WHERE name = ?1", params![name])?;
        Ok(())
    }

    pub fn is_held(&self, name: &str) -> Result<bool> {
        let held: Option<String> = self
            .conn
            .query_row("SELECT name FROM holds WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(held.is_some())
    }

    pub fn holds(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM holds ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Locks (legacy backend)

    pub fn set_lock(&self, name: &str, relation: &str, version: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO locks (name, relation, version) VALUES (?1, ?2, ?3)",
            params![name, relation, version],
        )?;
        Ok(())
    }

    pub fn remove_lock(&self, name: &str, relation: &str, version: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM locks WHERE name = ?1 AND relation = ?2 AND version = ?3",
            params![name, relation, version],
        )?;
        Ok(())
    }

    pub fn locks(&self) -> Result<Vec<LockEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, relation, version FROM locks ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(LockEntry {
                name: row.get(0)?,
                relation: row.get(1)?,
                version: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Reload bookkeeping

    pub fn record_reload(&self) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES ('last_reload', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn last_reload(&self) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_reload'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}
