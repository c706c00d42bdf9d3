mod config;
pub mod database;
pub mod ledger;

pub use config::{Config, PlayerConfig};
pub use database::Database;
pub use ledger::{LedgerStore, MemoryLedger, SqliteLedger};

use std::path::PathBuf;

use crate::error::StorageError;

/// Returns `~/.config/bugslayer[-dev]/` based on BUGSLAYER_ENV.
///
/// Set BUGSLAYER_ENV=dev to use the development data directory.
/// BUGSLAYER_DATA_DIR replaces the whole path (used by tests and
/// portable installs).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("BUGSLAYER_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("BUGSLAYER_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("bugslayer-dev")
            } else {
                base_dir.join("bugslayer")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| StorageError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
