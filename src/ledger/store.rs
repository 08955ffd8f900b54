//! Ledger store trait definition.
//!
//! This module defines the common interface for ledger storage backends.

use async_trait::async_trait;
use std::sync::Mutex;

use super::types::SecretLedger;
use crate::error::{LedgerError, ProvisionerError, Result};

/// Trait for secret-version ledger backends.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Loads the ledger.
    ///
    /// Returns an empty ledger if nothing has been stored yet.
    async fn load(&self) -> Result<SecretLedger>;

    /// Saves the ledger.
    async fn save(&self, ledger: &SecretLedger) -> Result<()>;

    /// Checks if a ledger has been stored.
    async fn exists(&self) -> Result<bool>;

    /// Describes where the ledger lives, for log and error messages.
    fn location(&self) -> String;
}

#[async_trait]
impl LedgerStore for Box<dyn LedgerStore> {
    async fn load(&self) -> Result<SecretLedger> {
        (**self).load().await
    }

    async fn save(&self, ledger: &SecretLedger) -> Result<()> {
        (**self).save(ledger).await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// Ledger store kept in process memory.
///
/// Used by read-only commands and in tests.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: Mutex<Option<SecretLedger>>,
}

impl MemoryLedgerStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a ledger.
    #[must_use]
    pub fn with_ledger(ledger: SecretLedger) -> Self {
        Self {
            ledger: Mutex::new(Some(ledger)),
        }
    }

    fn poisoned() -> ProvisionerError {
        ProvisionerError::Ledger(LedgerError::Unavailable {
            message: String::from("in-memory ledger lock poisoned"),
        })
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<SecretLedger> {
        let guard = self.ledger.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.clone().unwrap_or_default())
    }

    async fn save(&self, ledger: &SecretLedger) -> Result<()> {
        let mut guard = self.ledger.lock().map_err(|_| Self::poisoned())?;
        *guard = Some(ledger.clone());
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        let guard = self.ledger.lock().map_err(|_| Self::poisoned())?;
        Ok(guard.is_some())
    }

    fn location(&self) -> String {
        String::from("memory")
    }
}
