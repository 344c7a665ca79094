//! Binary cache client
//!
//! Optionally fetches a pre-built artifact by derivation fingerprint from a
//! remote cache serving `{base}/{fingerprint}.tar.gz`. Every failure mode is
//! a cache miss: the transaction falls back to building from source, and the
//! final store path is never left partially populated.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use tar::Archive;

use crate::error::Result;
use crate::types::PygrEnv;

pub struct BinaryCacheClient {
    base_url: String,
    client: Client,
}

impl BinaryCacheClient {
    /// Build a client from `$PYGR_BINARY_CACHE` or the `binary_cache`
    /// setting; `None` when no cache is configured.
    pub fn from_env(env: &PygrEnv) -> Option<Self> {
        let base_url = std::env::var("PYGR_BINARY_CACHE")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| env.setting("binary_cache"))?;

        let client = Client::builder()
            .user_agent(concat!("pygr/", env!("CARGO_PKG_VERSION")))
            .build()
            .ok()?;

        Some(Self { base_url, client })
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Try to populate `store_path` from the cache. Returns whether it hit;
    /// errors are downgraded to misses.
    pub fn fetch(&self, fingerprint: &str, store_path: &Path) -> bool {
        match self.try_fetch(fingerprint, store_path) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("binary cache fetch for {} failed: {}", fingerprint, e);
                false
            }
        }
    }

    fn try_fetch(&self, fingerprint: &str, store_path: &Path) -> Result<bool> {
        let url = format!(
            "{}/{}.tar.gz",
            self.base_url.trim_end_matches('/'),
            fingerprint
        );

        let mut response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            tracing::debug!("binary cache miss for {} ({})", fingerprint, response.status());
            return Ok(false);
        }

        let store_root = store_path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(store_root)?;

        // Archive and extraction dir are both scoped; only a completed
        // extraction is renamed into the store.
        let mut archive_file = tempfile::NamedTempFile::new()?;
        response.copy_to(&mut archive_file)?;

        let extract_dir = tempfile::Builder::new()
            .prefix(".unpack-")
            .tempdir_in(store_root)?;

        let tar_gz = File::open(archive_file.path())?;
        let mut archive = Archive::new(GzDecoder::new(BufReader::new(tar_gz)));
        archive.unpack(extract_dir.path())?;

        let entries: Vec<_> = std::fs::read_dir(extract_dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();

        if entries.len() == 1 && entries[0].is_dir() {
            // Archive wraps the artifact in a single top-level directory
            std::fs::rename(&entries[0], store_path)?;
        } else {
            std::fs::rename(extract_dir.path(), store_path)?;
            // The tempdir guard now points at a moved-away path; its drop is
            // a no-op.
        }

        tracing::info!("binary cache hit for {}", fingerprint);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unreachable_cache_is_a_miss() {
        let root = tempdir().unwrap();
        let client = BinaryCacheClient::with_base_url("http://127.0.0.1:9/cache");
        let target = root.path().join("store").join("fp-pkg-1.0");

        assert!(!client.fetch("fp", &target));
        assert!(!target.exists());
    }

    #[test]
    fn test_from_env_requires_configuration() {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();
        // No env var, no settings entry
        if std::env::var_os("PYGR_BINARY_CACHE").is_none() {
            assert!(BinaryCacheClient::from_env(&env).is_none());
        }

        std::fs::write(env.settings_conf(), "binary_cache = http://example.com\n").unwrap();
        assert!(BinaryCacheClient::from_env(&env).is_some());
    }
}
