//! pygr environment: the user-configurable root and its on-disk layout

use std::path::{Path, PathBuf};

use crate::Result;

/// Root directory and derived paths of a pygr installation.
///
/// Layout under the root:
/// - `store/` - immutable artifacts at `{fingerprint}-{name}-{version}/`
/// - `store/sources/` - fetched source cache
/// - `repos/` - cloned recipe repositories
/// - `profiles/` - per-profile generations and `bin/` symlink farms
/// - `config/` - `packages.conf` and `settings.conf`
/// - `backups/` - timestamped copies of `config/`
/// - `pygr.db` - the catalog
#[derive(Debug, Clone)]
pub struct PygrEnv {
    pub root: PathBuf,
}

impl PygrEnv {
    /// Resolve the root from `$PYGR_ROOT`, defaulting to `~/.pygr`.
    pub fn from_env() -> Self {
        let root = std::env::var_os("PYGR_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".pygr")
            });
        Self { root }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the on-disk layout if it does not exist yet.
    pub fn bootstrap(&self) -> Result<()> {
        for dir in [
            self.store_dir(),
            self.sources_dir(),
            self.repos_dir(),
            self.profiles_dir(),
            self.config_dir(),
            self.backups_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.store_dir().join("sources")
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("pygr.db")
    }

    pub fn packages_conf(&self) -> PathBuf {
        self.config_dir().join("packages.conf")
    }

    pub fn settings_conf(&self) -> PathBuf {
        self.config_dir().join("settings.conf")
    }

    /// Look up a `key = value` line in `config/settings.conf`.
    pub fn setting(&self, key: &str) -> Option<String> {
        read_setting(&self.settings_conf(), key)
    }
}

fn read_setting(path: &Path, key: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                let value = v.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bootstrap_creates_layout() {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();

        assert!(env.store_dir().is_dir());
        assert!(env.sources_dir().is_dir());
        assert!(env.repos_dir().is_dir());
        assert!(env.profiles_dir().is_dir());
        assert!(env.config_dir().is_dir());
        assert!(env.backups_dir().is_dir());
    }

    #[test]
    fn test_setting_lookup() {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();

        std::fs::write(
            env.settings_conf(),
            "# settings\nbinary_cache = https://cache.example.com/pygr\n",
        )
        .unwrap();

        assert_eq!(
            env.setting("binary_cache").as_deref(),
            Some("https://cache.example.com/pygr")
        );
        assert!(env.setting("missing").is_none());
    }
}
