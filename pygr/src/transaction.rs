//! Install, uninstall and upgrade transactions
//!
//! A transaction is a short-lived coordinator over resolver → fetch →
//! cache-or-build → store → profile → manifest. Failures abort before the
//! profile commit: no artifact is half-written and the manifest is only
//! touched after a successful commit.

use std::collections::HashSet;
use std::path::PathBuf;

use pygr_cache::Catalog;
use pygr_meta::{index_recipes, Recipe, Resolver, VersionConstraint};

use crate::bincache::BinaryCacheClient;
use crate::builder::{detect_build_commands, Builder};
use crate::distro::DistroPm;
use crate::error::{Error, Result};
use crate::fetcher::SourceFetcher;
use crate::github::GitHubClient;
use crate::manifest::{DeclarativeConfig, PackageSpec};
use crate::profile::Profile;
use crate::store::Store;
use crate::types::PygrEnv;

/// An artifact realized by a transaction
#[derive(Debug, Clone)]
pub struct InstalledArtifact {
    pub name: String,
    pub version: String,
    pub hash: String,
    pub path: PathBuf,
}

pub struct Transaction<'a> {
    env: &'a PygrEnv,
    catalog: &'a Catalog,
    github: GitHubClient,
    profile: String,
    sandbox: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(
        env: &'a PygrEnv,
        catalog: &'a Catalog,
        profile: impl Into<String>,
        sandbox: bool,
    ) -> Self {
        Self {
            env,
            catalog,
            github: GitHubClient::new(),
            profile: profile.into(),
            sandbox,
        }
    }

    /// Install recipe packages: resolve all specs, realize every selected
    /// recipe in dependency order, commit one new generation, and append the
    /// root specs to the manifest.
    pub fn install(
        &self,
        specs: &[(String, VersionConstraint)],
    ) -> Result<Vec<InstalledArtifact>> {
        let recipes_by_name = index_recipes(&self.env.repos_dir())?;
        let resolver = Resolver::new(&recipes_by_name);

        let mut plan: Vec<Recipe> = Vec::new();
        for (name, constraint) in specs {
            for recipe in resolver.resolve(name, constraint)? {
                if !plan.iter().any(|r| r.name == recipe.name) {
                    plan.push(recipe);
                }
            }
        }

        let built = self.realize(&plan)?;
        self.commit_generation(&built)?;

        let config = DeclarativeConfig::new(self.env.packages_conf());
        for (name, _) in specs {
            if let Some(artifact) = built.iter().find(|a| &a.name == name) {
                config.add_entry(&format!("recipe:{}@{}", artifact.name, artifact.version))?;
            }
        }

        Ok(built)
    }

    /// Realize a dependency-ordered plan: fetch each source, then take the
    /// artifact from the store, the binary cache, or a fresh build.
    fn realize(&self, plan: &[Recipe]) -> Result<Vec<InstalledArtifact>> {
        let fetcher = SourceFetcher::new(self.env, &self.github);
        let store = Store::new(self.env, self.catalog);
        let bincache = BinaryCacheClient::from_env(self.env);
        let builder = Builder::new(self.sandbox);

        let mut built: Vec<InstalledArtifact> = Vec::new();

        for recipe in plan {
            let mut dep_hashes = Vec::new();
            let mut dep_paths = Vec::new();
            for dep in &recipe.dependencies {
                if let Some(artifact) = built.iter().find(|a| a.name == dep.name) {
                    dep_hashes.push(artifact.hash.clone());
                    dep_paths.push(artifact.path.clone());
                }
            }

            let fetched = fetcher.fetch(&recipe.source.repo, &recipe.source.reference)?;
            let hash = Store::derivation_hash(recipe, &fetched.tree_hash, &dep_hashes);
            let spec = format!("recipe:{}@{}", recipe.name, recipe.version);

            let path = self.materialize(
                &store,
                bincache.as_ref(),
                recipe,
                &fetched,
                &hash,
                &dep_hashes,
                &dep_paths,
                &builder,
                &spec,
            )?;

            built.push(InstalledArtifact {
                name: recipe.name.clone(),
                version: recipe.version.clone(),
                hash,
                path,
            });
        }

        Ok(built)
    }

    #[allow(clippy::too_many_arguments)]
    fn materialize(
        &self,
        store: &Store,
        bincache: Option<&BinaryCacheClient>,
        recipe: &Recipe,
        fetched: &crate::fetcher::FetchedSource,
        hash: &str,
        dep_hashes: &[String],
        dep_paths: &[PathBuf],
        builder: &Builder,
        spec: &str,
    ) -> Result<PathBuf> {
        if let Some(existing) = store.path_for(hash)? {
            tracing::info!("{}@{} already in store", recipe.name, recipe.version);
            return Ok(existing);
        }

        let target = store.artifact_path(hash, &recipe.name, &recipe.version);
        if target.is_dir() {
            // On disk but missing from the catalog (e.g. restored store)
            store.record(hash, &recipe.name, &recipe.version, &target, spec)?;
            return Ok(target);
        }

        if let Some(cache) = bincache {
            if cache.fetch(hash, &target) {
                store.record(hash, &recipe.name, &recipe.version, &target, spec)?;
                return Ok(target);
            }
        }

        tracing::info!("building {}@{}", recipe.name, recipe.version);
        let output = builder.build(recipe, &fetched.dir, dep_paths)?;
        let (_, path) = store.add(recipe, &fetched.tree_hash, dep_hashes, &output.prefix)?;
        Ok(path)
    }

    /// Commit the union of the current generation and the new artifacts.
    ///
    /// A newly installed artifact supersedes any same-name artifact already
    /// in the generation, so repeated installs and upgrades do not grow the
    /// package set without bound. An unchanged set commits nothing.
    fn commit_generation(&self, built: &[InstalledArtifact]) -> Result<Option<u64>> {
        let profile = Profile::new(self.env, self.catalog, self.profile.as_str());
        let (_, current) = profile.current_generation()?;

        let new_names: HashSet<&str> = built.iter().map(|a| a.name.as_str()).collect();
        let superseded: HashSet<String> = self
            .catalog
            .store_packages_for(&current)?
            .into_iter()
            .filter(|p| new_names.contains(p.name.as_str()))
            .map(|p| p.hash)
            .collect();

        let mut next: Vec<String> = current
            .iter()
            .filter(|hash| !superseded.contains(*hash))
            .cloned()
            .collect();
        for artifact in built {
            if !next.contains(&artifact.hash) {
                next.push(artifact.hash.clone());
            }
        }

        let next_set: HashSet<&String> = next.iter().collect();
        let current_set: HashSet<&String> = current.iter().collect();
        if next_set == current_set {
            tracing::info!("profile '{}' unchanged; no new generation", self.profile);
            return Ok(None);
        }

        Ok(Some(profile.add_generation(&next)?))
    }

    /// Uninstall by name: drop every matching artifact from the current
    /// generation, remove the manifest entries, and hand `distro:` entries
    /// to the host package tool.
    pub fn uninstall(&self, names: &[String]) -> Result<()> {
        let profile = Profile::new(self.env, self.catalog, self.profile.as_str());
        let (_, current) = profile.current_generation()?;
        let artifacts = self.catalog.store_packages_for(&current)?;

        let removed: HashSet<&str> = artifacts
            .iter()
            .filter(|p| names.iter().any(|n| n == &p.name))
            .map(|p| p.hash.as_str())
            .collect();

        if !removed.is_empty() {
            let next: Vec<String> = current
                .iter()
                .filter(|hash| !removed.contains(hash.as_str()))
                .cloned()
                .collect();
            profile.add_generation(&next)?;
        }

        // Source artifacts leave the profile first; the distro remover runs
        // only for entries the manifest actually tagged as distro packages.
        let config = DeclarativeConfig::new(self.env.packages_conf());
        for name in names {
            let had_artifact = artifacts.iter().any(|p| &p.name == name);
            match config.remove_by_name(name)? {
                Some(line) => {
                    if let Ok(PackageSpec::Distro { pm, name }) = PackageSpec::parse(&line) {
                        match DistroPm::from_name(&pm) {
                            Some(pm) => pm.remove(&name)?,
                            None => {
                                tracing::warn!("unknown distro package manager '{}'", pm)
                            }
                        }
                    }
                }
                None if !had_artifact => tracing::warn!("'{}' is not installed", name),
                None => {}
            }
        }

        Ok(())
    }

    /// Upgrade named packages, or with no names every recipe-origin artifact
    /// in the current generation, by re-resolving at the highest available
    /// versions.
    pub fn upgrade(&self, names: &[String]) -> Result<Vec<InstalledArtifact>> {
        let specs: Vec<(String, VersionConstraint)> = if !names.is_empty() {
            names
                .iter()
                .map(|n| (n.clone(), VersionConstraint::any()))
                .collect()
        } else {
            let profile = Profile::new(self.env, self.catalog, self.profile.as_str());
            let (_, current) = profile.current_generation()?;
            let mut seen = HashSet::new();
            self.catalog
                .store_packages_for(&current)?
                .into_iter()
                // GitHub-origin artifacts have no recipe to re-resolve
                .filter(|p| p.spec.starts_with("recipe:"))
                .filter(|p| seen.insert(p.name.clone()))
                .map(|p| (p.name, VersionConstraint::any()))
                .collect()
        };

        if specs.is_empty() {
            tracing::info!("nothing to upgrade");
            return Ok(Vec::new());
        }
        self.install(&specs)
    }

    /// Ad-hoc install straight from a GitHub repository: fetch the commit,
    /// auto-detect the build system, and store the result under a
    /// `github:owner/name@commit` origin spec.
    pub fn install_github(
        &self,
        repo: &str,
        reference: Option<&str>,
    ) -> Result<InstalledArtifact> {
        let reference = match reference {
            Some(r) => r.to_string(),
            None => self.github.default_branch(repo)?,
        };

        let fetcher = SourceFetcher::new(self.env, &self.github);
        let fetched = fetcher.fetch(repo, &reference)?;

        let name = repo.split('/').next_back().unwrap_or(repo).to_string();
        let version = fetched.commit[..12].to_string();

        let (build, install) = detect_build_commands(&fetched.dir).ok_or_else(|| {
            Error::BuildFailed(format!("no recognized build system in {}", repo))
        })?;
        let recipe = Recipe::synthetic(
            &name,
            &version,
            repo,
            &fetched.commit,
            build,
            install,
        );

        let hash = Store::derivation_hash(&recipe, &fetched.tree_hash, &[]);
        let spec = format!("github:{}@{}", repo, fetched.commit);
        let store = Store::new(self.env, self.catalog);
        let bincache = BinaryCacheClient::from_env(self.env);
        let builder = Builder::new(self.sandbox);

        let path = self.materialize(
            &store,
            bincache.as_ref(),
            &recipe,
            &fetched,
            &hash,
            &[],
            &[],
            &builder,
            &spec,
        )?;

        let artifact = InstalledArtifact {
            name,
            version,
            hash,
            path,
        };
        self.commit_generation(std::slice::from_ref(&artifact))?;

        // Record what the user pinned; an unpinned ref stays a moving ref
        let config = DeclarativeConfig::new(self.env.packages_conf());
        config.add_entry(&format!("github:{}@{}", repo, reference))?;

        Ok(artifact)
    }

    /// Reconstruct the environment from the declarative manifest: distro
    /// entries one by one, GitHub entries through the ad-hoc pipeline, and
    /// all recipe entries as a single transactional install.
    pub fn apply(&self) -> Result<()> {
        let config = DeclarativeConfig::new(self.env.packages_conf());
        let entries = config.read_entries()?;
        if entries.is_empty() {
            tracing::info!("declarative manifest is empty; nothing to apply");
            return Ok(());
        }

        let mut recipe_specs: Vec<(String, VersionConstraint)> = Vec::new();
        for entry in &entries {
            match entry {
                PackageSpec::Distro { pm, name } => match DistroPm::from_name(pm) {
                    Some(pm) => pm.install(name)?,
                    None => tracing::warn!("unknown distro package manager '{}'", pm),
                },
                PackageSpec::GitHub { repo, reference } => {
                    self.install_github(repo, reference.as_deref())?;
                }
                PackageSpec::Recipe { name, version } => {
                    let constraint = match version {
                        Some(v) => VersionConstraint::parse(&format!("=={}", v)),
                        None => VersionConstraint::any(),
                    };
                    recipe_specs.push((name.clone(), constraint));
                }
            }
        }

        if !recipe_specs.is_empty() {
            self.install(&recipe_specs)?;
        }
        Ok(())
    }

    /// Write the current profile state back to the declarative manifest,
    /// keeping distro entries (which exist only there).
    pub fn sync(&self) -> Result<()> {
        let profile = Profile::new(self.env, self.catalog, self.profile.as_str());
        let (_, current) = profile.current_generation()?;
        let artifacts = self.catalog.store_packages_for(&current)?;

        let config = DeclarativeConfig::new(self.env.packages_conf());
        let mut lines: Vec<String> = config
            .read_entries()?
            .iter()
            .filter(|s| matches!(s, PackageSpec::Distro { .. }))
            .map(|s| s.to_string())
            .collect();
        for artifact in &artifacts {
            if !artifact.spec.is_empty() && !lines.contains(&artifact.spec) {
                lines.push(artifact.spec.clone());
            }
        }

        config.write_entries(&lines)?;
        tracing::info!("manifest synced ({} entries)", lines.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_artifact(env: &PygrEnv, catalog: &Catalog, hash: &str, name: &str, version: &str) {
        let path = env
            .store_dir()
            .join(format!("{}-{}-{}", hash, name, version));
        std::fs::create_dir_all(path.join("bin")).unwrap();
        std::fs::write(path.join("bin").join(name), "#!/bin/sh\n").unwrap();
        catalog
            .add_store_package(
                hash,
                name,
                version,
                &path.to_string_lossy(),
                &format!("recipe:{}@{}", name, version),
            )
            .unwrap();
    }

    fn installed(hash: &str, name: &str, version: &str, env: &PygrEnv) -> InstalledArtifact {
        InstalledArtifact {
            name: name.to_string(),
            version: version.to_string(),
            hash: hash.to_string(),
            path: env.store_dir().join(format!("{}-{}-{}", hash, name, version)),
        }
    }

    fn setup() -> (tempfile::TempDir, PygrEnv, Catalog) {
        let root = tempdir().unwrap();
        let env = PygrEnv::with_root(root.path());
        env.bootstrap().unwrap();
        let catalog = Catalog::in_memory().unwrap();
        (root, env, catalog)
    }

    #[test]
    fn test_commit_generation_unions_and_skips_unchanged() {
        let (_root, env, catalog) = setup();
        seed_artifact(&env, &catalog, "aaa", "one", "1.0");
        seed_artifact(&env, &catalog, "bbb", "two", "1.0");

        let tx = Transaction::new(&env, &catalog, "default", false);
        let committed = tx
            .commit_generation(&[installed("aaa", "one", "1.0", &env)])
            .unwrap();
        assert_eq!(committed, Some(1));

        // Same fingerprint set again: no new generation
        let committed = tx
            .commit_generation(&[installed("aaa", "one", "1.0", &env)])
            .unwrap();
        assert_eq!(committed, None);

        // New artifact unions with the current set
        let committed = tx
            .commit_generation(&[installed("bbb", "two", "1.0", &env)])
            .unwrap();
        assert_eq!(committed, Some(2));
        let (gen, packages) = Profile::new(&env, &catalog, "default")
            .current_generation()
            .unwrap();
        assert_eq!(gen, 2);
        assert_eq!(packages.len(), 2);
    }

    #[test]
    fn test_commit_generation_replaces_same_name() {
        let (_root, env, catalog) = setup();
        seed_artifact(&env, &catalog, "old", "tool", "1.0");
        seed_artifact(&env, &catalog, "new", "tool", "2.0");

        let tx = Transaction::new(&env, &catalog, "default", false);
        tx.commit_generation(&[installed("old", "tool", "1.0", &env)])
            .unwrap();
        tx.commit_generation(&[installed("new", "tool", "2.0", &env)])
            .unwrap();

        let (_, packages) = Profile::new(&env, &catalog, "default")
            .current_generation()
            .unwrap();
        assert_eq!(packages, vec!["new"]);
    }

    #[test]
    fn test_uninstall_drops_matching_names_and_rollback_restores() {
        let (_root, env, catalog) = setup();
        seed_artifact(&env, &catalog, "aaa", "keepme", "1.0");
        seed_artifact(&env, &catalog, "bbb", "dropme", "1.0");

        let tx = Transaction::new(&env, &catalog, "default", false);
        tx.commit_generation(&[
            installed("aaa", "keepme", "1.0", &env),
            installed("bbb", "dropme", "1.0", &env),
        ])
        .unwrap();

        tx.uninstall(&["dropme".into()]).unwrap();

        let profile = Profile::new(&env, &catalog, "default");
        let (gen, packages) = profile.current_generation().unwrap();
        assert_eq!(gen, 2);
        assert_eq!(packages, vec!["aaa"]);
        assert!(profile.bin_dir().join("dropme").symlink_metadata().is_err());

        // Rollback restores the uninstalled artifact's executables
        assert_eq!(profile.rollback().unwrap(), Some(1));
        assert!(profile.bin_dir().join("dropme").symlink_metadata().is_ok());
    }

    #[test]
    fn test_uninstall_unknown_name_commits_nothing() {
        let (_root, env, catalog) = setup();
        seed_artifact(&env, &catalog, "aaa", "one", "1.0");

        let tx = Transaction::new(&env, &catalog, "default", false);
        tx.commit_generation(&[installed("aaa", "one", "1.0", &env)])
            .unwrap();
        tx.uninstall(&["ghost".into()]).unwrap();

        let (gen, _) = Profile::new(&env, &catalog, "default")
            .current_generation()
            .unwrap();
        assert_eq!(gen, 1);
    }

    #[test]
    fn test_sync_writes_profile_state_and_keeps_distro_entries() {
        let (_root, env, catalog) = setup();
        seed_artifact(&env, &catalog, "aaa", "one", "1.0");

        let config = DeclarativeConfig::new(env.packages_conf());
        config.add_entry("distro:apt:htop").unwrap();

        let tx = Transaction::new(&env, &catalog, "default", false);
        tx.commit_generation(&[installed("aaa", "one", "1.0", &env)])
            .unwrap();
        tx.sync().unwrap();

        let entries: Vec<String> = config
            .read_entries()
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(entries, vec!["distro:apt:htop", "recipe:one@1.0"]);
    }
}
