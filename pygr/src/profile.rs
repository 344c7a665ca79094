//! User profiles and generations
//!
//! A profile is a named sequence of immutable generations; the active one is
//! exposed through a stable `bin/` directory of symlinks into the store and
//! a `{name}-current` symlink marking the commit point.

use std::os::unix::fs::symlink;
use std::path::PathBuf;

use pygr_cache::Catalog;

use crate::error::{Error, Result};
use crate::types::PygrEnv;

pub struct Profile<'a> {
    env: &'a PygrEnv,
    catalog: &'a Catalog,
    name: String,
}

impl<'a> Profile<'a> {
    pub fn new(env: &'a PygrEnv, catalog: &'a Catalog, name: impl Into<String>) -> Self {
        Self {
            env,
            catalog,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn dir(&self) -> PathBuf {
        self.env.profiles_dir().join(&self.name)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir().join("bin")
    }

    fn gen_dir(&self, generation: u64) -> PathBuf {
        self.dir().join(format!("gen-{}", generation))
    }

    fn current_link(&self) -> PathBuf {
        self.env
            .profiles_dir()
            .join(format!("{}-current", self.name))
    }

    /// Latest committed generation: `(0, [])` when the profile is empty.
    pub fn current_generation(&self) -> Result<(u64, Vec<String>)> {
        Ok(self
            .catalog
            .latest_generation(&self.name)?
            .map(|gen| (gen.generation, gen.packages))
            .unwrap_or((0, Vec::new())))
    }

    /// Generation the `{name}-current` symlink points at. Falls back to the
    /// latest committed generation when the link is absent.
    pub fn active_generation(&self) -> Result<u64> {
        if let Ok(target) = std::fs::read_link(self.current_link()) {
            if let Some(n) = target
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("gen-"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                return Ok(n);
            }
        }
        Ok(self.current_generation()?.0)
    }

    /// Commit a new generation holding `packages` and switch to it.
    pub fn add_generation(&self, packages: &[String]) -> Result<u64> {
        let (current, _) = self.current_generation()?;
        let next = current + 1;

        self.catalog
            .add_profile_generation(&self.name, next, packages)?;

        let gen_dir = self.gen_dir(next);
        std::fs::create_dir_all(&gen_dir)?;
        std::fs::write(
            gen_dir.join("manifest.json"),
            serde_json::to_string_pretty(packages)?,
        )?;

        self.switch_to(next)?;
        tracing::info!("profile '{}' now at generation {}", self.name, next);
        Ok(next)
    }

    /// Point the profile at an existing generation: clear `bin/`, symlink
    /// every executable of the generation's artifacts, and move the current
    /// symlink.
    ///
    /// Artifacts are processed in fingerprint order, so when two expose the
    /// same executable name the winner is deterministic (the highest
    /// fingerprint). The clear-then-populate sequence is not atomic to
    /// concurrent readers; acceptable for a single-user tool.
    pub fn switch_to(&self, generation: u64) -> Result<()> {
        let packages = self
            .catalog
            .get_generation(&self.name, generation)?
            .ok_or_else(|| Error::UnknownGeneration {
                profile: self.name.clone(),
                generation,
            })?;

        let bin_dir = self.bin_dir();
        if bin_dir.exists() {
            std::fs::remove_dir_all(&bin_dir)?;
        }
        std::fs::create_dir_all(&bin_dir)?;

        let mut artifacts = self.catalog.store_packages_for(&packages)?;
        artifacts.sort_by(|a, b| a.hash.cmp(&b.hash));

        for artifact in &artifacts {
            let artifact_bin = PathBuf::from(&artifact.path).join("bin");
            if !artifact_bin.is_dir() {
                continue;
            }
            let mut entries: Vec<_> = std::fs::read_dir(&artifact_bin)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect();
            entries.sort();
            for entry in entries {
                let Some(file_name) = entry.file_name() else {
                    continue;
                };
                let link = bin_dir.join(file_name);
                if link.symlink_metadata().is_ok() {
                    // Same executable name from an earlier artifact: last wins
                    std::fs::remove_file(&link)?;
                }
                symlink(&entry, &link)?;
            }
        }

        let gen_dir = self.gen_dir(generation);
        std::fs::create_dir_all(&gen_dir)?;
        let link = self.current_link();
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link)?;
        }
        symlink(&gen_dir, &link)?;

        Ok(())
    }

    /// Switch to the generation before the active one. Returns the new
    /// active generation, or `None` when there is nothing to roll back to.
    pub fn rollback(&self) -> Result<Option<u64>> {
        let active = self.active_generation()?;
        if active <= 1 {
            return Ok(None);
        }
        let previous = active - 1;
        self.switch_to(previous)?;
        tracing::info!(
            "profile '{}' rolled back to generation {}",
            self.name,
            previous
        );
        Ok(Some(previous))
    }

    pub fn list_generations(&self) -> Result<Vec<pygr_cache::GenerationRecord>> {
        Ok(self.catalog.list_generations(&self.name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact(env: &PygrEnv, catalog: &Catalog, hash: &str, name: &str, bins: &[&str]) {
        let path = env.store_dir().join(format!("{}-{}-1.0", hash, name));
        std::fs::create_dir_all(path.join("bin")).unwrap();
        for bin in bins {
            std::fs::write(path.join("bin").join(bin), "#!/bin/sh\n").unwrap();
        }
        catalog
            .add_store_package(
                hash,
                name,
                "1.0",
                &path.to_string_lossy(),
                &format!("recipe:{}@1.0", name),
            )
            .unwrap();
    }

    fn setup() -> (tempfile::TempDir, PygrEnv, Catalog) {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();
        let catalog = Catalog::in_memory().unwrap();
        (root, env, catalog)
    }

    #[test]
    fn test_empty_profile() {
        let (_root, env, catalog) = setup();
        let profile = Profile::new(&env, &catalog, "default");
        assert_eq!(profile.current_generation().unwrap(), (0, Vec::new()));
        assert_eq!(profile.active_generation().unwrap(), 0);
        assert!(profile.rollback().unwrap().is_none());
    }

    #[test]
    fn test_generations_are_monotonic_and_switch_populates_bin() {
        let (_root, env, catalog) = setup();
        artifact(&env, &catalog, "aaa", "one", &["one"]);
        artifact(&env, &catalog, "bbb", "two", &["two"]);

        let profile = Profile::new(&env, &catalog, "default");
        assert_eq!(profile.add_generation(&["aaa".into()]).unwrap(), 1);
        assert!(profile.bin_dir().join("one").symlink_metadata().is_ok());
        assert!(profile.bin_dir().join("two").symlink_metadata().is_err());

        assert_eq!(
            profile
                .add_generation(&["aaa".into(), "bbb".into()])
                .unwrap(),
            2
        );
        assert!(profile.bin_dir().join("one").symlink_metadata().is_ok());
        assert!(profile.bin_dir().join("two").symlink_metadata().is_ok());

        // Earlier generation rows are unchanged
        assert_eq!(
            catalog.get_generation("default", 1).unwrap().unwrap(),
            vec!["aaa"]
        );
    }

    #[test]
    fn test_rollback_and_forward_restore_bin() {
        let (_root, env, catalog) = setup();
        artifact(&env, &catalog, "aaa", "one", &["one"]);
        artifact(&env, &catalog, "bbb", "two", &["two"]);

        let profile = Profile::new(&env, &catalog, "default");
        profile.add_generation(&["aaa".into()]).unwrap();
        profile
            .add_generation(&["aaa".into(), "bbb".into()])
            .unwrap();

        assert_eq!(profile.rollback().unwrap(), Some(1));
        assert_eq!(profile.active_generation().unwrap(), 1);
        assert!(profile.bin_dir().join("two").symlink_metadata().is_err());

        profile.switch_to(2).unwrap();
        assert!(profile.bin_dir().join("one").symlink_metadata().is_ok());
        assert!(profile.bin_dir().join("two").symlink_metadata().is_ok());
    }

    #[test]
    fn test_switch_to_unknown_generation() {
        let (_root, env, catalog) = setup();
        let profile = Profile::new(&env, &catalog, "default");
        let err = profile.switch_to(7).unwrap_err();
        assert!(matches!(err, Error::UnknownGeneration { generation: 7, .. }));
    }

    #[test]
    fn test_executable_collision_is_deterministic() {
        let (_root, env, catalog) = setup();
        artifact(&env, &catalog, "aaa", "one", &["tool"]);
        artifact(&env, &catalog, "zzz", "two", &["tool"]);

        let profile = Profile::new(&env, &catalog, "default");
        profile
            .add_generation(&["zzz".into(), "aaa".into()])
            .unwrap();

        // Highest fingerprint wins regardless of insertion order
        let target = std::fs::read_link(profile.bin_dir().join("tool")).unwrap();
        assert!(target.to_string_lossy().contains("zzz-two"));
    }
}
