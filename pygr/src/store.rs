//! Content-addressed artifact store
//!
//! Artifacts live at `{store-root}/{fingerprint}-{name}-{version}` and are
//! written exactly once: the build output is staged into a sibling directory
//! and renamed into place, so a derivation path either exists completely or
//! not at all.

use std::path::{Path, PathBuf};

use pygr_cache::Catalog;
use pygr_meta::{fingerprint, Recipe};
use serde_json::json;

use crate::error::Result;
use crate::types::PygrEnv;
use crate::utils::copy_dir_recursive;

pub struct Store<'a> {
    env: &'a PygrEnv,
    catalog: &'a Catalog,
}

impl<'a> Store<'a> {
    pub fn new(env: &'a PygrEnv, catalog: &'a Catalog) -> Self {
        Self { env, catalog }
    }

    /// Derivation fingerprint of a recipe, its source tree hash and the
    /// fingerprints of its dependencies (order-insensitive).
    pub fn derivation_hash(recipe: &Recipe, source_hash: &str, dep_hashes: &[String]) -> String {
        let mut deps = dep_hashes.to_vec();
        deps.sort();
        fingerprint(&json!({
            "recipe": recipe.to_value(),
            "source_hash": source_hash,
            "dependencies": deps,
        }))
    }

    /// Path an artifact occupies (or would occupy) in the store.
    pub fn artifact_path(&self, hash: &str, name: &str, version: &str) -> PathBuf {
        self.env
            .store_dir()
            .join(format!("{}-{}-{}", hash, name, version))
    }

    /// Place a build output into the store under its derivation fingerprint.
    ///
    /// Idempotent: an existing derivation path is returned as-is.
    pub fn add(
        &self,
        recipe: &Recipe,
        source_hash: &str,
        dep_hashes: &[String],
        build_output: &Path,
    ) -> Result<(String, PathBuf)> {
        let hash = Self::derivation_hash(recipe, source_hash, dep_hashes);
        let spec = format!("recipe:{}@{}", recipe.name, recipe.version);
        let path = self.place(&hash, &recipe.name, &recipe.version, build_output, &spec)?;
        Ok((hash, path))
    }

    /// Place an artifact with a caller-supplied identity and origin spec
    /// (used by the ad-hoc GitHub install path).
    pub fn place(
        &self,
        hash: &str,
        name: &str,
        version: &str,
        build_output: &Path,
        spec: &str,
    ) -> Result<PathBuf> {
        let target = self.artifact_path(hash, name, version);

        if !target.exists() {
            std::fs::create_dir_all(self.env.store_dir())?;
            let staging = self.env.store_dir().join(format!(".tmp-{}", hash));
            if staging.exists() {
                std::fs::remove_dir_all(&staging)?;
            }
            copy_dir_recursive(build_output, &staging)?;
            match std::fs::rename(&staging, &target) {
                Ok(()) => {}
                Err(e) => {
                    let _ = std::fs::remove_dir_all(&staging);
                    if !target.exists() {
                        return Err(e.into());
                    }
                }
            }
            tracing::info!("store add {}", target.display());
        } else {
            tracing::debug!("store path exists: {}", target.display());
        }

        self.catalog.add_store_package(
            hash,
            name,
            version,
            &target.to_string_lossy(),
            spec,
        )?;
        Ok(target)
    }

    /// Record an artifact whose directory was populated externally (e.g. by
    /// the binary cache client).
    pub fn record(
        &self,
        hash: &str,
        name: &str,
        version: &str,
        path: &Path,
        spec: &str,
    ) -> Result<()> {
        self.catalog
            .add_store_package(hash, name, version, &path.to_string_lossy(), spec)?;
        Ok(())
    }

    /// Look up the store path of a fingerprint via the catalog.
    pub fn path_for(&self, hash: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .catalog
            .get_store_package(hash)?
            .map(|pkg| PathBuf::from(pkg.path))
            .filter(|path| path.is_dir()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recipe(name: &str, version: &str, deps: &[&str]) -> Recipe {
        let deps_yaml = if deps.is_empty() {
            String::new()
        } else {
            let items: Vec<String> = deps.iter().map(|d| format!("  - \"{}\"", d)).collect();
            format!("dependencies:\n{}\n", items.join("\n"))
        };
        Recipe::from_yaml(&format!(
            "name: {name}\nversion: \"{version}\"\nsource: {{ type: github, repo: u/{name}, ref: main }}\n{deps_yaml}"
        ))
        .unwrap()
    }

    #[test]
    fn test_derivation_hash_inputs() {
        let r = recipe("pkg", "1.0", &[]);
        let h1 = Store::derivation_hash(&r, "abc", &[]);
        let h2 = Store::derivation_hash(&r, "abc", &[]);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);

        // Source hash changes the fingerprint
        assert_ne!(h1, Store::derivation_hash(&r, "abd", &[]));
        // Dependency set changes the fingerprint
        assert_ne!(h1, Store::derivation_hash(&r, "abc", &["dep1".into()]));
        // Recipe changes the fingerprint
        let other = recipe("pkg", "1.1", &[]);
        assert_ne!(h1, Store::derivation_hash(&other, "abc", &[]));
    }

    #[test]
    fn test_derivation_hash_dep_order_insensitive() {
        let r = recipe("pkg", "1.0", &["a", "b"]);
        let h1 = Store::derivation_hash(&r, "abc", &["x".into(), "y".into()]);
        let h2 = Store::derivation_hash(&r, "abc", &["y".into(), "x".into()]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_add_is_idempotent() {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();
        let catalog = Catalog::in_memory().unwrap();
        let store = Store::new(&env, &catalog);

        let out = tempdir().unwrap();
        std::fs::create_dir(out.path().join("bin")).unwrap();
        std::fs::write(out.path().join("bin/tool"), "#!/bin/sh\n").unwrap();

        let r = recipe("pkg", "1.0", &[]);
        let (hash, path) = store.add(&r, "srchash", &[], out.path()).unwrap();
        assert!(path.join("bin/tool").is_file());

        // Mutate the "build output" and add again: the store keeps the
        // first artifact untouched.
        std::fs::write(out.path().join("bin/tool"), "changed").unwrap();
        let (hash2, path2) = store.add(&r, "srchash", &[], out.path()).unwrap();
        assert_eq!(hash, hash2);
        assert_eq!(path, path2);
        assert_eq!(
            std::fs::read_to_string(path.join("bin/tool")).unwrap(),
            "#!/bin/sh\n"
        );
    }

    #[test]
    fn test_path_for_requires_existing_dir() {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();
        let catalog = Catalog::in_memory().unwrap();
        let store = Store::new(&env, &catalog);

        assert!(store.path_for("nope").unwrap().is_none());

        // Record pointing at a path that no longer exists is not a hit
        catalog
            .add_store_package("gone", "pkg", "1.0", "/nonexistent/path", "recipe:pkg@1.0")
            .unwrap();
        assert!(store.path_for("gone").unwrap().is_none());
    }
}
