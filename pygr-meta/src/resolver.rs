//! Greedy dependency resolver
//!
//! Selects one version per package name, preferring the highest version that
//! satisfies the first constraint seen, then checks later constraints
//! against that selection. Incompatible later constraints fail the resolve
//! instead of backtracking.

use indexmap::IndexMap;

use crate::index::RecipesByName;
use crate::recipe::Recipe;
use crate::version::{parse_version, VersionConstraint};
use crate::{Error, Result};

pub struct Resolver<'a> {
    recipes: &'a RecipesByName,
}

impl<'a> Resolver<'a> {
    pub fn new(recipes: &'a RecipesByName) -> Self {
        Self { recipes }
    }

    /// Resolve `name` under `constraint` into a topologically ordered recipe
    /// list: dependencies always precede their dependents, the root is last.
    pub fn resolve(&self, name: &str, constraint: &VersionConstraint) -> Result<Vec<Recipe>> {
        let mut selected: IndexMap<String, Recipe> = IndexMap::new();
        let mut path: Vec<String> = Vec::new();
        self.select(name, constraint, &mut selected, &mut path)?;

        let mut order = Vec::with_capacity(selected.len());
        let mut visited = Vec::new();
        Self::visit(name, &selected, &mut visited, &mut order);
        Ok(order)
    }

    fn select(
        &self,
        name: &str,
        constraint: &VersionConstraint,
        selected: &mut IndexMap<String, Recipe>,
        path: &mut Vec<String>,
    ) -> Result<()> {
        if path.iter().any(|p| p == name) {
            let mut cycle = path.clone();
            cycle.push(name.to_string());
            return Err(Error::CircularDependency(cycle.join(" -> ")));
        }

        if let Some(chosen) = selected.get(name) {
            if !constraint.matches(&chosen.version)? {
                return Err(Error::IncompatibleRequirement {
                    name: name.to_string(),
                    selected: chosen.version.clone(),
                    constraint: constraint.to_string(),
                });
            }
            return Ok(());
        }

        let candidates = self
            .recipes
            .get(name)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::NoRecipe(name.to_string()))?;

        let mut matching = Vec::new();
        for recipe in candidates {
            if constraint.matches(&recipe.version)? {
                matching.push(recipe);
            }
        }
        if matching.is_empty() {
            return Err(Error::NoMatchingVersion {
                name: name.to_string(),
                constraint: constraint.to_string(),
            });
        }

        // Highest version wins; on ties the earliest candidate is kept so
        // selection is stable in the index's discovery order.
        let mut best = matching[0];
        let mut best_version = parse_version(&best.version)?;
        for &candidate in &matching[1..] {
            let version = parse_version(&candidate.version)?;
            if version > best_version {
                best = candidate;
                best_version = version;
            }
        }

        let chosen = best.clone();
        selected.insert(name.to_string(), chosen.clone());

        path.push(name.to_string());
        for dep in &chosen.dependencies {
            self.select(&dep.name, &dep.constraint, selected, path)?;
        }
        path.pop();

        Ok(())
    }

    /// Depth-first post-order over the selection graph
    fn visit(
        name: &str,
        selected: &IndexMap<String, Recipe>,
        visited: &mut Vec<String>,
        order: &mut Vec<Recipe>,
    ) {
        if visited.iter().any(|v| v == name) {
            return;
        }
        visited.push(name.to_string());

        let Some(recipe) = selected.get(name) else {
            return;
        };
        for dep in &recipe.dependencies {
            Self::visit(&dep.name, selected, visited, order);
        }
        order.push(recipe.clone());
    }
}
