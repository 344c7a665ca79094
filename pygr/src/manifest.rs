//! Declarative package manifest
//!
//! `config/packages.conf` is the line-oriented mirror of the imperative
//! state: one spec per line, `#` comments and blank lines ignored. Every
//! successful install/uninstall keeps it in sync, and `apply` reconstructs
//! the environment from it.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const HEADER: &str = "# pygr declarative package list\n\
# One spec per line:\n\
#   distro:<pm>:<name>\n\
#   github:owner/name[@ref]\n\
#   recipe:name[@version]\n";

/// A parsed manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSpec {
    /// Host-native package, opaque to the core
    Distro { pm: String, name: String },
    /// Ad-hoc source build from a GitHub repository
    GitHub {
        repo: String,
        reference: Option<String>,
    },
    /// Named recipe from the registered recipe repositories
    Recipe {
        name: String,
        version: Option<String>,
    },
}

impl PackageSpec {
    /// Parse a manifest line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("distro:") {
            let (pm, name) = rest
                .split_once(':')
                .ok_or_else(|| Error::InvalidSpec(line.to_string()))?;
            if pm.is_empty() || name.is_empty() {
                return Err(Error::InvalidSpec(line.to_string()));
            }
            return Ok(Self::Distro {
                pm: pm.to_string(),
                name: name.to_string(),
            });
        }
        if let Some(rest) = line.strip_prefix("github:") {
            let (repo, reference) = match rest.split_once('@') {
                Some((repo, reference)) => (repo, Some(reference.to_string())),
                None => (rest, None),
            };
            if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
                return Err(Error::InvalidSpec(line.to_string()));
            }
            return Ok(Self::GitHub {
                repo: repo.to_string(),
                reference,
            });
        }
        if let Some(rest) = line.strip_prefix("recipe:") {
            let (name, version) = match rest.split_once('@') {
                Some((name, version)) => (name, Some(version.to_string())),
                None => (rest, None),
            };
            if name.is_empty() {
                return Err(Error::InvalidSpec(line.to_string()));
            }
            return Ok(Self::Recipe {
                name: name.to_string(),
                version,
            });
        }
        Err(Error::InvalidSpec(line.to_string()))
    }

    /// Parse a loose CLI argument: `owner/repo[@ref]` means GitHub,
    /// `name[@version]` means recipe, and the tagged manifest forms are
    /// accepted unchanged.
    pub fn parse_cli(arg: &str) -> Result<Self> {
        let arg = arg.trim();
        if arg.starts_with("distro:") || arg.starts_with("github:") || arg.starts_with("recipe:") {
            return Self::parse(arg);
        }
        if arg.contains('/') {
            return Self::parse(&format!("github:{}", arg));
        }
        Self::parse(&format!("recipe:{}", arg))
    }

    /// Name the entry is listed and removed under.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Distro { name, .. } => name,
            Self::GitHub { repo, .. } => repo.split('/').next_back().unwrap_or(repo),
            Self::Recipe { name, .. } => name,
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distro { pm, name } => write!(f, "distro:{}:{}", pm, name),
            Self::GitHub {
                repo,
                reference: Some(r),
            } => write!(f, "github:{}@{}", repo, r),
            Self::GitHub {
                repo,
                reference: None,
            } => write!(f, "github:{}", repo),
            Self::Recipe {
                name,
                version: Some(v),
            } => write!(f, "recipe:{}@{}", name, v),
            Self::Recipe {
                name,
                version: None,
            } => write!(f, "recipe:{}", name),
        }
    }
}

/// The on-disk manifest file
pub struct DeclarativeConfig {
    path: PathBuf,
}

impl DeclarativeConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(String::from).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse every entry line, skipping blanks and comments. Unparseable
    /// lines are skipped with a warning rather than poisoning the file.
    pub fn read_entries(&self) -> Result<Vec<PackageSpec>> {
        let mut entries = Vec::new();
        for line in self.read_lines()? {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match PackageSpec::parse(trimmed) {
                Ok(spec) => entries.push(spec),
                Err(e) => tracing::warn!("skipping manifest line '{}': {}", trimmed, e),
            }
        }
        Ok(entries)
    }

    /// Append a spec line unless an equal one is already present.
    /// Comments and blank lines are preserved. Returns whether it was added.
    pub fn add_entry(&self, spec: &str) -> Result<bool> {
        let spec = spec.trim();
        // Validate before writing
        PackageSpec::parse(spec)?;

        let lines = self.read_lines()?;
        if lines.iter().any(|l| l.trim() == spec) {
            return Ok(false);
        }

        let mut content = if lines.is_empty() {
            HEADER.to_string()
        } else {
            let mut c = lines.join("\n");
            c.push('\n');
            c
        };
        content.push_str(spec);
        content.push('\n');

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(true)
    }

    /// Remove the first entry whose display name matches. Everything else,
    /// comments included, is kept verbatim. Returns the removed line.
    pub fn remove_by_name(&self, name: &str) -> Result<Option<String>> {
        let lines = self.read_lines()?;
        let mut removed = None;
        let mut kept = Vec::with_capacity(lines.len());

        for line in lines {
            let trimmed = line.trim();
            if removed.is_none() && !trimmed.is_empty() && !trimmed.starts_with('#') {
                if let Ok(spec) = PackageSpec::parse(trimmed) {
                    if spec.display_name() == name {
                        removed = Some(trimmed.to_string());
                        continue;
                    }
                }
            }
            kept.push(line);
        }

        if removed.is_some() {
            let mut content = kept.join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            std::fs::write(&self.path, content)?;
        }
        Ok(removed)
    }

    /// Overwrite the manifest with a canonical header plus the given lines.
    pub fn write_entries(&self, specs: &[String]) -> Result<()> {
        let mut content = HEADER.to_string();
        for spec in specs {
            content.push_str(spec);
            content.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
