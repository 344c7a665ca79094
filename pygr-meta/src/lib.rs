//! pygr-meta: recipe handling for pygr
//!
//! This crate provides:
//! - Canonical-JSON fingerprinting and source tree hashing
//! - Recipe parsing and validation
//! - Version constraint parsing and matching (PEP 440 precedence)
//! - The recipe index over cached recipe repositories
//! - The greedy dependency resolver

pub mod error;
pub mod hash;
pub mod index;
pub mod recipe;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
pub use hash::{fingerprint, tree_hash};
pub use index::{index_recipes, RecipesByName};
pub use recipe::{find_recipes_in_dir, Dependency, Recipe, Source};
pub use resolver::Resolver;
pub use version::{ConstraintOp, VersionConstraint};
