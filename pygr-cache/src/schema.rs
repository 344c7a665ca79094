//! SQLite schema definitions

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create the database schema
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    version INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    description TEXT
);

-- Store artifacts, keyed by derivation fingerprint
CREATE TABLE IF NOT EXISTS store_packages (
    hash TEXT PRIMARY KEY,
    name TEXT NOT NULL COLLATE NOCASE,
    version TEXT NOT NULL,
    path TEXT NOT NULL,
    spec TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registered recipe repositories
CREATE TABLE IF NOT EXISTS repos (
    name TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'github',
    added_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Profile generations; packages is a JSON array of fingerprints
CREATE TABLE IF NOT EXISTS profile_generations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile TEXT NOT NULL,
    generation INTEGER NOT NULL,
    packages TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE(profile, generation)
);

-- Indexes for common queries
CREATE INDEX IF NOT EXISTS idx_store_packages_name ON store_packages(name);
CREATE INDEX IF NOT EXISTS idx_generations_profile ON profile_generations(profile, generation);
"#;
