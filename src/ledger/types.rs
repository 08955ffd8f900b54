//! Secret-version ledger data.
//!
//! The API never returns secret values, so a change to a registry password or
//! a secret environment variable cannot be detected by comparison. Instead the
//! operator bumps an integer version in the config, and the ledger remembers
//! the last version that was successfully applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current version of the ledger file format.
pub const LEDGER_VERSION: u32 = 1;

/// Applied secret versions for every application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretLedger {
    /// Ledger format version.
    pub version: u32,
    /// Entries keyed by application name.
    #[serde(default)]
    pub applications: BTreeMap<String, LedgerEntry>,
}

/// Applied secret versions of one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Last applied registry password version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_password_version: Option<i64>,
    /// Last applied version per secret environment variable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_env_versions: BTreeMap<String, i64>,
}

impl Default for SecretLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerEntry {
    /// Returns true if the entry records nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry_password_version.is_none() && self.secret_env_versions.is_empty()
    }
}

impl SecretLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: LEDGER_VERSION,
            applications: BTreeMap::new(),
        }
    }

    /// Returns true if no application has recorded versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applications.values().all(LedgerEntry::is_empty)
    }

    /// Returns the recorded registry password version of an application.
    #[must_use]
    pub fn password_version(&self, app: &str) -> Option<i64> {
        self.applications.get(app)?.registry_password_version
    }

    /// Records (or clears, with `None`) the registry password version.
    ///
    /// Returns true if the ledger changed.
    pub fn set_password_version(&mut self, app: &str, version: Option<i64>) -> bool {
        if self.password_version(app) == version {
            return false;
        }
        self.entry_mut(app).registry_password_version = version;
        self.prune(app);
        true
    }

    /// Returns the recorded version of a secret environment variable.
    #[must_use]
    pub fn secret_env_version(&self, app: &str, key: &str) -> Option<i64> {
        self.applications.get(app)?.secret_env_versions.get(key).copied()
    }

    /// Records (or clears, with `None`) a secret environment variable version.
    ///
    /// Returns true if the ledger changed.
    pub fn set_secret_env_version(&mut self, app: &str, key: &str, version: Option<i64>) -> bool {
        if self.secret_env_version(app, key) == version {
            return false;
        }
        let entry = self.entry_mut(app);
        match version {
            Some(v) => {
                entry.secret_env_versions.insert(key.to_string(), v);
            }
            None => {
                entry.secret_env_versions.remove(key);
            }
        }
        self.prune(app);
        true
    }

    fn entry_mut(&mut self, app: &str) -> &mut LedgerEntry {
        self.applications.entry(app.to_string()).or_default()
    }

    fn prune(&mut self, app: &str) {
        if self.applications.get(app).is_some_and(LedgerEntry::is_empty) {
            self.applications.remove(app);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_means_never_set() {
        let ledger = SecretLedger::new();
        assert_eq!(ledger.password_version("web"), None);
        assert_eq!(ledger.secret_env_version("web", "API_KEY"), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_set_reports_change() {
        let mut ledger = SecretLedger::new();
        assert!(ledger.set_password_version("web", Some(1)));
        assert!(!ledger.set_password_version("web", Some(1)));
        assert!(ledger.set_password_version("web", Some(2)));
        assert_eq!(ledger.password_version("web"), Some(2));
    }

    #[test]
    fn test_empty_entry_is_pruned() {
        let mut ledger = SecretLedger::new();
        ledger.set_password_version("web", Some(1));
        ledger.set_secret_env_version("web", "API_KEY", Some(3));

        ledger.set_password_version("web", None);
        assert!(ledger.applications.contains_key("web"));

        ledger.set_secret_env_version("web", "API_KEY", None);
        assert!(!ledger.applications.contains_key("web"));
    }

    #[test]
    fn test_clearing_unknown_app_does_not_create_entry() {
        let mut ledger = SecretLedger::new();
        assert!(!ledger.set_secret_env_version("ghost", "K", None));
        assert!(ledger.applications.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let mut ledger = SecretLedger::new();
        ledger.set_password_version("web", Some(2));
        ledger.set_secret_env_version("api", "TOKEN", Some(5));

        let json = serde_json::to_value(&ledger).expect("serialize");
        assert_eq!(json["version"], 1);
        assert_eq!(json["applications"]["web"]["registryPasswordVersion"], 2);
        assert!(json["applications"]["web"].get("secretEnvVersions").is_none());
        assert_eq!(json["applications"]["api"]["secretEnvVersions"]["TOKEN"], 5);
    }
}
