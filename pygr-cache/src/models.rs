//! Data models for the catalog database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A built artifact recorded in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePackage {
    /// Derivation fingerprint (64-hex SHA-256)
    pub hash: String,
    pub name: String,
    pub version: String,
    /// Absolute path of the artifact directory under the store root
    pub path: String,
    /// Origin spec, e.g. `recipe:ripgrep@14.1.0` or `github:owner/name@<commit>`
    pub spec: String,
    pub created_at: DateTime<Utc>,
}

/// A registered recipe repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub name: String,
    pub url: String,
    pub kind: String,
    pub added_at: DateTime<Utc>,
}

/// One immutable generation of a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub profile: String,
    pub generation: u64,
    /// Fingerprints of the artifacts exposed by this generation
    pub packages: Vec<String>,
    pub created_at: DateTime<Utc>,
}
