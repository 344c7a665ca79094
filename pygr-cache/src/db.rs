//! Database operations for the pygr catalog

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::*;
use crate::schema::{CREATE_SCHEMA, SCHEMA_VERSION};

/// SQLite catalog database
///
/// Single-writer at the process level; a connection is never shared across
/// threads.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        let needs_init: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_info'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count == 0)?;

        if needs_init {
            self.conn.execute_batch(CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_info (version, description) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, "Initial schema"],
            )?;
        }

        Ok(())
    }

    /// Add or replace a store artifact record
    pub fn add_store_package(
        &self,
        hash: &str,
        name: &str,
        version: &str,
        path: &str,
        spec: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO store_packages (hash, name, version, path, spec, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![hash, name, version, path, spec, now],
        )?;
        Ok(())
    }

    /// Get a store artifact by fingerprint
    pub fn get_store_package(&self, hash: &str) -> Result<Option<StorePackage>> {
        let result = self
            .conn
            .query_row(
                "SELECT hash, name, version, path, spec, created_at
                 FROM store_packages WHERE hash = ?1",
                params![hash],
                Self::row_to_store_package,
            )
            .optional()?;
        Ok(result)
    }

    /// Bulk-fetch store artifacts, preserving the input order.
    ///
    /// Fingerprints with no catalog row are skipped with a warning; a missing
    /// row means the store was tampered with outside of pygr.
    pub fn store_packages_for(&self, hashes: &[String]) -> Result<Vec<StorePackage>> {
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.get_store_package(hash)? {
                Some(pkg) => out.push(pkg),
                None => tracing::warn!("no catalog record for store hash {}", hash),
            }
        }
        Ok(out)
    }

    /// Register or replace a recipe repository
    pub fn add_repo(&self, name: &str, url: &str, kind: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO repos (name, url, kind, added_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, url, kind, now],
        )?;
        Ok(())
    }

    /// List registered recipe repositories, ordered by name
    pub fn list_repos(&self) -> Result<Vec<RepoRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, url, kind, added_at FROM repos ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(RepoRecord {
                name: row.get(0)?,
                url: row.get(1)?,
                kind: row.get(2)?,
                added_at: parse_timestamp(row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Sqlite)
    }

    /// Insert a new generation row for a profile
    pub fn add_profile_generation(
        &self,
        profile: &str,
        generation: u64,
        packages: &[String],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let packages_json = serde_json::to_string(packages)?;
        self.conn.execute(
            "INSERT INTO profile_generations (profile, generation, packages, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![profile, generation as i64, packages_json, now],
        )?;
        Ok(())
    }

    /// Latest generation for a profile, if any
    pub fn latest_generation(&self, profile: &str) -> Result<Option<GenerationRecord>> {
        let result = self
            .conn
            .query_row(
                "SELECT profile, generation, packages, created_at
                 FROM profile_generations WHERE profile = ?1
                 ORDER BY generation DESC LIMIT 1",
                params![profile],
                Self::row_to_generation,
            )
            .optional()?;
        Ok(result)
    }

    /// Package list of a specific generation
    pub fn get_generation(&self, profile: &str, generation: u64) -> Result<Option<Vec<String>>> {
        let packages_json: Option<String> = self
            .conn
            .query_row(
                "SELECT packages FROM profile_generations
                 WHERE profile = ?1 AND generation = ?2",
                params![profile, generation as i64],
                |row| row.get(0),
            )
            .optional()?;
        match packages_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// All generations of a profile, oldest first
    pub fn list_generations(&self, profile: &str) -> Result<Vec<GenerationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT profile, generation, packages, created_at
             FROM profile_generations WHERE profile = ?1 ORDER BY generation",
        )?;
        let rows = stmt.query_map(params![profile], Self::row_to_generation)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Sqlite)
    }

    fn row_to_store_package(row: &rusqlite::Row) -> rusqlite::Result<StorePackage> {
        Ok(StorePackage {
            hash: row.get(0)?,
            name: row.get(1)?,
            version: row.get(2)?,
            path: row.get(3)?,
            spec: row.get(4)?,
            created_at: parse_timestamp(row.get::<_, String>(5)?),
        })
    }

    fn row_to_generation(row: &rusqlite::Row) -> rusqlite::Result<GenerationRecord> {
        let packages_json: String = row.get(2)?;
        let packages = serde_json::from_str(&packages_json).unwrap_or_default();
        Ok(GenerationRecord {
            profile: row.get(0)?,
            generation: row.get::<_, i64>(1)? as u64,
            packages,
            created_at: parse_timestamp(row.get::<_, String>(3)?),
        })
    }
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
