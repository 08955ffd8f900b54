//! Local file-based ledger storage.
//!
//! The ledger lives next to the configuration file it belongs to, named after
//! the configuration's stem: `prod.yaml` pairs with `prod.apprun-state.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{LedgerError, ProvisionerError, Result};

use super::store::LedgerStore;
use super::types::{LEDGER_VERSION, SecretLedger};

/// Suffix appended to the configuration stem.
const LEDGER_SUFFIX: &str = ".apprun-state.json";

/// Returns the ledger path that belongs to a configuration file.
#[must_use]
pub fn ledger_path_for(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .map_or_else(|| String::from("apprun"), |s| s.to_string_lossy().into_owned());
    let file_name = format!("{stem}{LEDGER_SUFFIX}");

    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

/// Local file-based ledger store.
#[derive(Debug)]
pub struct LocalLedgerStore {
    /// Path to the ledger file.
    path: PathBuf,
}

impl LocalLedgerStore {
    /// Creates a store for the ledger belonging to a configuration file.
    #[must_use]
    pub fn for_config(config_path: impl AsRef<Path>) -> Self {
        Self::with_path(ledger_path_for(config_path.as_ref()))
    }

    /// Creates a store at an explicit ledger path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(action: &str, e: &std::io::Error) -> ProvisionerError {
        ProvisionerError::Ledger(LedgerError::Unavailable {
            message: format!("Failed to {action} ledger file: {e}"),
        })
    }
}

#[async_trait]
impl LedgerStore for LocalLedgerStore {
    async fn load(&self) -> Result<SecretLedger> {
        if !self.path.exists() {
            debug!("Ledger file does not exist: {}", self.path.display());
            return Ok(SecretLedger::new());
        }

        debug!("Loading ledger from: {}", self.path.display());

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            ProvisionerError::Ledger(LedgerError::Corrupted {
                message: format!("Failed to read ledger file: {e}"),
            })
        })?;

        let ledger: SecretLedger = serde_json::from_str(&content).map_err(|e| {
            ProvisionerError::Ledger(LedgerError::Corrupted {
                message: format!("Failed to parse ledger file {}: {e}", self.path.display()),
            })
        })?;

        if ledger.version != LEDGER_VERSION {
            return Err(ProvisionerError::Ledger(LedgerError::VersionMismatch {
                expected: LEDGER_VERSION,
                found: ledger.version,
            }));
        }

        Ok(ledger)
    }

    async fn save(&self, ledger: &SecretLedger) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Self::write_error("create directory for", &e))?;
        }

        info!("Saving ledger to: {}", self.path.display());

        let mut content = serde_json::to_string_pretty(ledger).map_err(|e| {
            ProvisionerError::Ledger(LedgerError::serialization(format!(
                "Failed to serialize ledger: {e}"
            )))
        })?;
        content.push('\n');

        // Write to a temporary file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Self::write_error("create temp", &e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Self::write_error("write", &e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::write_error("sync", &e))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Self::write_error("rename", &e))?;

        debug!("Ledger saved successfully");
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalLedgerStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalLedgerStore::for_config(temp_dir.path().join("prod.yaml"));
        (store, temp_dir)
    }

    #[test]
    fn test_ledger_path_for() {
        assert_eq!(
            ledger_path_for(Path::new("/etc/apprun/prod.yaml")),
            PathBuf::from("/etc/apprun/prod.apprun-state.json")
        );
        assert_eq!(
            ledger_path_for(Path::new("staging.yml")),
            PathBuf::from("staging.apprun-state.json")
        );
    }

    #[tokio::test]
    async fn test_load_nonexistent_is_empty() {
        let (store, _temp) = create_test_store();
        let ledger = store.load().await.expect("Load should not fail");
        assert!(ledger.is_empty());
        assert!(!store.exists().await.expect("exists check failed"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut ledger = SecretLedger::new();
        ledger.set_password_version("web", Some(3));
        ledger.set_secret_env_version("web", "API_KEY", Some(1));
        store.save(&ledger).await.expect("Failed to save ledger");

        assert!(store.exists().await.expect("exists check failed"));
        assert!(!store.path().with_extension("tmp").exists());

        let loaded = store.load().await.expect("Failed to load ledger");
        assert_eq!(loaded, ledger);
    }

    #[tokio::test]
    async fn test_pruned_entry_survives_round_trip() {
        let (store, _temp) = create_test_store();

        let mut ledger = SecretLedger::new();
        ledger.set_password_version("web", Some(1));
        ledger.set_password_version("web", None);
        store.save(&ledger).await.expect("save");

        let raw = std::fs::read_to_string(store.path()).expect("read");
        assert!(!raw.contains("web"));
        assert!(store.load().await.expect("load").applications.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_file() {
        let (store, _temp) = create_test_store();
        std::fs::write(store.path(), "{not json").expect("write");

        let result = store.load().await;
        assert!(matches!(
            result,
            Err(ProvisionerError::Ledger(LedgerError::Corrupted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_version_rejected() {
        let (store, _temp) = create_test_store();
        std::fs::write(store.path(), r#"{"version": 7, "applications": {}}"#).expect("write");

        let result = store.load().await;
        assert!(matches!(
            result,
            Err(ProvisionerError::Ledger(LedgerError::VersionMismatch { found: 7, .. }))
        ));
    }
}
