//! Recipe index over cached recipe repositories
//!
//! Walks every cloned repository under the repo cache and groups recipes by
//! name; the same name may appear at several versions across repositories.

use std::path::Path;

use indexmap::IndexMap;

use crate::recipe::{find_recipes_in_dir, Recipe};
use crate::Result;

/// Recipes grouped by name, in stable discovery order
pub type RecipesByName = IndexMap<String, Vec<Recipe>>;

/// Index every recipe found under `repos_root`.
///
/// Repositories are walked in name order so the grouping (and the resolver's
/// tie-breaking) is stable across runs.
pub fn index_recipes(repos_root: &Path) -> Result<RecipesByName> {
    let mut index: RecipesByName = IndexMap::new();

    if !repos_root.is_dir() {
        return Ok(index);
    }

    let mut repo_dirs: Vec<_> = std::fs::read_dir(repos_root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    repo_dirs.sort();

    for repo_dir in repo_dirs {
        for recipe in find_recipes_in_dir(&repo_dir)? {
            index.entry(recipe.name.clone()).or_default().push(recipe);
        }
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_recipe(dir: &Path, file: &str, name: &str, version: &str) {
        std::fs::write(
            dir.join(file),
            format!(
                "name: {}\nversion: \"{}\"\nsource: {{ type: github, repo: u/{}, ref: main }}\n",
                name, version, name
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_index_groups_by_name_across_repos() {
        let root = tempdir().unwrap();
        let repo_a = root.path().join("alpha");
        let repo_b = root.path().join("beta");
        std::fs::create_dir(&repo_a).unwrap();
        std::fs::create_dir(&repo_b).unwrap();

        write_recipe(&repo_a, "lib.yaml", "lib", "1.0");
        write_recipe(&repo_b, "lib.yaml", "lib", "2.0");
        write_recipe(&repo_b, "app.yaml", "app", "0.1");

        let index = index_recipes(root.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["lib"].len(), 2);
        // alpha walks before beta
        assert_eq!(index["lib"][0].version, "1.0");
        assert_eq!(index["lib"][1].version, "2.0");
        assert_eq!(index["app"].len(), 1);
    }

    #[test]
    fn test_index_missing_root_is_empty() {
        let root = tempdir().unwrap();
        let index = index_recipes(&root.path().join("nope")).unwrap();
        assert!(index.is_empty());
    }
}
