//! Recipe parsing and validation
//!
//! A recipe is the declarative build unit: a name, a version, a GitHub
//! source, optional build/install command lists and dependency terms.
//! Recipes are immutable after parse.

use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use crate::version::VersionConstraint;
use crate::{Error, Result};

/// The single supported remote source kind
pub const SOURCE_KIND: &str = "github";

/// GitHub source of a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// `owner/name` repository slug
    pub repo: String,
    /// Commit, tag or branch
    pub reference: String,
}

/// One dependency term, parsed from `name[<op><version>]` at load time
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl Dependency {
    /// Split a dependency string at the first `>`, `<` or `=`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (name, constraint) = match spec.find(|c| c == '>' || c == '<' || c == '=') {
            Some(idx) => (
                spec[..idx].trim(),
                VersionConstraint::parse(&spec[idx..]),
            ),
            None => (spec, VersionConstraint::any()),
        };
        if name.is_empty() {
            return Err(Error::RecipeInvalid(format!(
                "dependency '{}' has no package name",
                spec
            )));
        }
        Ok(Self {
            name: name.to_string(),
            constraint,
        })
    }
}

/// Raw recipe document shape; validation happens in `Recipe::from_doc`
#[derive(Debug, Deserialize)]
struct RecipeDoc {
    name: Option<String>,
    version: Option<String>,
    source: Option<SourceDoc>,
    #[serde(default)]
    build: Option<CommandBlock>,
    #[serde(default)]
    install: Option<CommandBlock>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SourceDoc {
    #[serde(rename = "type")]
    kind: Option<String>,
    repo: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandBlock {
    #[serde(default)]
    commands: Vec<String>,
}

/// A validated recipe
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub source: Source,
    pub build: Vec<String>,
    pub install: Vec<String>,
    /// Dependency terms parsed once at load
    pub dependencies: Vec<Dependency>,
    /// Original dependency strings, kept for re-serialization
    raw_dependencies: Vec<String>,
}

impl Recipe {
    /// Parse a recipe from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let doc: RecipeDoc = serde_yaml::from_str(content)?;
        Self::from_doc(doc)
    }

    /// Parse a recipe from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn from_doc(doc: RecipeDoc) -> Result<Self> {
        let name = doc
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::RecipeInvalid("recipe name is required".into()))?;
        let version = doc
            .version
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::RecipeInvalid(format!("recipe '{}' has no version", name)))?;
        let source = doc
            .source
            .ok_or_else(|| Error::RecipeInvalid(format!("recipe '{}' has no source", name)))?;

        match source.kind.as_deref() {
            Some(SOURCE_KIND) => {}
            other => {
                return Err(Error::RecipeInvalid(format!(
                    "only github sources are supported (got '{}')",
                    other.unwrap_or("none")
                )))
            }
        }
        let repo = source
            .repo
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::RecipeInvalid(format!("recipe '{}' source has no repo", name)))?;
        let reference = source
            .reference
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::RecipeInvalid(format!("recipe '{}' source has no ref", name)))?;

        let dependencies = doc
            .dependencies
            .iter()
            .map(|d| Dependency::parse(d))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            version,
            source: Source { repo, reference },
            build: doc.build.map(|b| b.commands).unwrap_or_default(),
            install: doc.install.map(|b| b.commands).unwrap_or_default(),
            dependencies,
            raw_dependencies: doc.dependencies,
        })
    }

    /// Construct a recipe without a recipe file, pinned to a commit.
    /// Used for ad-hoc installs straight from a repository.
    pub fn synthetic(
        name: impl Into<String>,
        version: impl Into<String>,
        repo: impl Into<String>,
        reference: impl Into<String>,
        build: Vec<String>,
        install: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: Source {
                repo: repo.into(),
                reference: reference.into(),
            },
            build,
            install,
            dependencies: Vec::new(),
            raw_dependencies: Vec::new(),
        }
    }

    /// Canonical document form of this recipe, used for fingerprinting.
    pub fn to_value(&self) -> serde_json::Value {
        let mut doc = serde_json::Map::new();
        doc.insert("name".into(), json!(self.name));
        doc.insert("version".into(), json!(self.version));
        doc.insert(
            "source".into(),
            json!({
                "type": SOURCE_KIND,
                "repo": self.source.repo,
                "ref": self.source.reference,
            }),
        );
        if !self.build.is_empty() {
            doc.insert("build".into(), json!({ "commands": self.build }));
        }
        if !self.install.is_empty() {
            doc.insert("install".into(), json!({ "commands": self.install }));
        }
        doc.insert("dependencies".into(), json!(self.raw_dependencies));
        serde_json::Value::Object(doc)
    }
}

/// Discover recipes in a directory tree.
///
/// Loads every `.yaml`/`.yml` file recursively; files that fail to parse or
/// validate are skipped with a warning so one broken recipe does not hide a
/// whole repository.
pub fn find_recipes_in_dir(dir: &Path) -> Result<Vec<Recipe>> {
    let mut recipes = Vec::new();

    for ext in ["yaml", "yml"] {
        let pattern = dir.join(format!("**/*.{}", ext));
        for entry in glob::glob(&pattern.to_string_lossy())? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                    continue;
                }
            };
            match Recipe::from_file(&path) {
                Ok(recipe) => recipes.push(recipe),
                Err(e) => {
                    tracing::warn!("skipping recipe {:?}: {}", path, e);
                }
            }
        }
    }

    Ok(recipes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_minimal_recipe() {
        let yaml = r#"
name: foo
version: "1.0"
source:
  type: github
  repo: user/foo
  ref: main
"#;
        let recipe = Recipe::from_yaml(yaml).unwrap();
        assert_eq!(recipe.name, "foo");
        assert_eq!(recipe.version, "1.0");
        assert_eq!(recipe.source.repo, "user/foo");
        assert_eq!(recipe.source.reference, "main");
        assert!(recipe.dependencies.is_empty());
    }

    #[test]
    fn test_parse_with_deps() {
        let yaml = r#"
name: bar
version: "2.0"
source:
  type: github
  repo: user/bar
  ref: v2.0
build:
  commands:
    - echo build
install:
  commands:
    - echo install
dependencies:
  - baz>=1.0
"#;
        let recipe = Recipe::from_yaml(yaml).unwrap();
        assert_eq!(recipe.build, vec!["echo build"]);
        assert_eq!(recipe.install, vec!["echo install"]);
        assert_eq!(recipe.dependencies.len(), 1);
        assert_eq!(recipe.dependencies[0].name, "baz");
        assert_eq!(recipe.dependencies[0].constraint.to_string(), ">=1.0");
        assert_eq!(recipe.to_value()["version"], "2.0");
        assert_eq!(recipe.to_value()["dependencies"][0], "baz>=1.0");
    }

    #[test]
    fn test_validation_non_github() {
        let yaml = r#"
name: x
version: "1"
source:
  type: gitlab
  repo: a/b
  ref: x
"#;
        let err = Recipe::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("github"));
    }

    #[test]
    fn test_validation_missing_repo() {
        let yaml = r#"
name: x
version: "1"
source:
  type: github
  ref: main
"#;
        assert!(matches!(
            Recipe::from_yaml(yaml),
            Err(Error::RecipeInvalid(_))
        ));
    }

    #[test]
    fn test_validation_missing_ref() {
        let yaml = r#"
name: x
version: "1"
source:
  type: github
  repo: a/b
"#;
        assert!(matches!(
            Recipe::from_yaml(yaml),
            Err(Error::RecipeInvalid(_))
        ));
    }

    #[test]
    fn test_dependency_parsing_forms() {
        let plain = Dependency::parse("lib").unwrap();
        assert_eq!(plain.name, "lib");
        assert_eq!(plain.constraint.to_string(), "any");

        let pinned = Dependency::parse("lib==1.0").unwrap();
        assert_eq!(pinned.name, "lib");
        assert_eq!(pinned.constraint.to_string(), "==1.0");

        let ranged = Dependency::parse("lib >= 2.1").unwrap();
        assert_eq!(ranged.name, "lib");
        assert_eq!(ranged.constraint.to_string(), ">=2.1");
    }

    #[test]
    fn test_find_recipes_in_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "name: a\nversion: \"1\"\nsource: { type: github, repo: u/a, ref: main }\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yml"),
            "name: b\nversion: \"1\"\nsource: { type: github, repo: u/b, ref: main }\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "not a recipe").unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "name: [").unwrap();

        let recipes = find_recipes_in_dir(dir.path()).unwrap();
        let mut names: Vec<_> = recipes.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_fingerprint_input_is_canonical() {
        let yaml = r#"
name: pkg
version: "1.0"
source: { type: github, repo: u/p, ref: main }
"#;
        let a = Recipe::from_yaml(yaml).unwrap();
        let b = Recipe::from_yaml(yaml).unwrap();
        assert_eq!(a.to_value(), b.to_value());
    }
}
