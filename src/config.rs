//! Configuration for choosing the ledger backend.

use std::path::PathBuf;

/// Where ledgers should be kept.
///
/// The backend is chosen once from this config, see [Store::select](crate::Store::select).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    /// File path to the SQLite database for the durable backend.
    ///
    /// `None` means the durable backend is not configured and ledgers are
    /// only kept in memory.
    pub db_path: Option<PathBuf>,
}

impl BackendConfig {
    /// Use the durable backend with the database at `db_path`.
    pub fn durable(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(db_path.into()),
        }
    }

    /// Keep ledgers in memory only.
    pub fn in_memory() -> Self {
        Self { db_path: None }
    }
}
