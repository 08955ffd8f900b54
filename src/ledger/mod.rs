//! Secret-version ledger module.
//!
//! This module records which registry-password and secret-environment
//! versions have been applied, so that secret changes can be planned without
//! ever reading secret values back from the API.

mod types;
mod store;
mod local;

pub use types::{LEDGER_VERSION, LedgerEntry, SecretLedger};
pub use store::{LedgerStore, MemoryLedgerStore};
pub use local::{LocalLedgerStore, ledger_path_for};
