//! Config backups
//!
//! Copies the `config/` directory into `backups/{utc-ts}_{label}/` so a
//! known-good declarative state can be restored by hand.

use std::path::PathBuf;

use chrono::Utc;

use crate::error::Result;
use crate::types::PygrEnv;
use crate::utils::copy_dir_recursive;

/// Snapshot `config/` under a timestamped backup directory.
pub fn backup_config(env: &PygrEnv, label: &str) -> Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let dest = env
        .backups_dir()
        .join(format!("{}_{}", timestamp, label));

    copy_dir_recursive(&env.config_dir(), &dest)?;
    tracing::info!("config backed up to {}", dest.display());
    Ok(dest)
}
