//! pygr-cache: persistent catalog for the pygr store
//!
//! Holds the SQLite-backed records behind pygr:
//! - Store artifacts keyed by derivation fingerprint
//! - Registered recipe repositories
//! - Profile generations (immutable, monotonically numbered)

pub mod db;
pub mod error;
pub mod models;
pub mod schema;

pub use db::Catalog;
pub use error::{Error, Result};
pub use models::{GenerationRecord, RepoRecord, StorePackage};
