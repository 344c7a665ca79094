//! Source fetcher
//!
//! Materializes a specific commit of a GitHub repository into the local
//! source cache and computes its tree hash. The tree hash, not the commit
//! id, is the authoritative source identity that feeds the derivation
//! fingerprint.

use std::path::{Path, PathBuf};
use std::process::Command;

use pygr_meta::tree_hash;

use crate::error::{Error, Result};
use crate::github::GitHubClient;
use crate::types::PygrEnv;
use crate::utils::is_commit_hex;

/// A materialized source tree
#[derive(Debug)]
pub struct FetchedSource {
    /// Cache directory holding the checked-out tree
    pub dir: PathBuf,
    /// Deterministic content hash of the tree
    pub tree_hash: String,
    /// Resolved commit id
    pub commit: String,
}

pub struct SourceFetcher<'a> {
    env: &'a PygrEnv,
    github: &'a GitHubClient,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(env: &'a PygrEnv, github: &'a GitHubClient) -> Self {
        Self { env, github }
    }

    /// Fetch `repo` at `reference` (commit, tag or branch) into the source
    /// cache, returning the cached tree and its hash.
    pub fn fetch(&self, repo: &str, reference: &str) -> Result<FetchedSource> {
        let commit = if is_commit_hex(reference) {
            reference.to_lowercase()
        } else {
            self.github.resolve_ref(repo, reference)?
        };

        let cache_key = format!("{}_{}", repo.replace('/', "_"), commit);
        let cache_path = self.env.sources_dir().join(&cache_key);

        if cache_path.is_dir() {
            tracing::debug!("source cache hit: {}", cache_key);
            let hash = tree_hash(&cache_path)?;
            return Ok(FetchedSource {
                dir: cache_path,
                tree_hash: hash,
                commit,
            });
        }

        tracing::info!("fetching {}@{}", repo, &commit[..12.min(commit.len())]);
        let git = which::which("git").map_err(|_| Error::ToolNotFound("git".into()))?;

        std::fs::create_dir_all(self.env.sources_dir())?;
        // Cloned next to the cache path so the final move is a rename, never
        // a cross-device copy; the temp dir is removed on every error path.
        let tmp = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(self.env.sources_dir())?;

        let url = format!("https://github.com/{}.git", repo);
        run_git(&git, tmp.path(), &["init", "-q"])?;
        run_git(&git, tmp.path(), &["remote", "add", "origin", &url])?;
        run_git(&git, tmp.path(), &["fetch", "-q", "--depth", "1", "origin", &commit])?;
        run_git(&git, tmp.path(), &["checkout", "-q", "FETCH_HEAD"])?;

        // The cache holds plain trees; git metadata is not part of the
        // source identity.
        std::fs::remove_dir_all(tmp.path().join(".git"))?;

        let hash = tree_hash(tmp.path())?;

        match std::fs::rename(tmp.path(), &cache_path) {
            Ok(()) => {}
            // Lost a race against another pygr run populating the same key
            Err(_) if cache_path.is_dir() => {}
            Err(e) => return Err(e.into()),
        }

        Ok(FetchedSource {
            dir: cache_path,
            tree_hash: hash,
            commit,
        })
    }
}

fn run_git(git: &Path, cwd: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new(git)
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::FetchFailed(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }

    Ok(())
}
