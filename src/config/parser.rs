//! Configuration parser for loading cluster configuration files.
//!
//! This module handles loading configuration from YAML files, writing it back
//! out (for `dump`), loading `.env` files and resolving API credentials from
//! the environment.

use crate::error::{ConfigError, ProvisionerError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ClusterConfig;

/// Primary environment variable holding the API access token.
pub const ACCESS_TOKEN_ENV: &str = "SAKURA_ACCESS_TOKEN";
/// Legacy fallback for [`ACCESS_TOKEN_ENV`].
pub const ACCESS_TOKEN_FALLBACK_ENV: &str = "SAKURACLOUD_ACCESS_TOKEN";
/// Primary environment variable holding the API access token secret.
pub const ACCESS_SECRET_ENV: &str = "SAKURA_ACCESS_TOKEN_SECRET";
/// Legacy fallback for [`ACCESS_SECRET_ENV`].
pub const ACCESS_SECRET_FALLBACK_ENV: &str = "SAKURACLOUD_ACCESS_TOKEN_SECRET";

/// API credentials resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    /// Access token (basic auth user).
    pub access_token: String,
    /// Access token secret (basic auth password).
    pub access_token_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

/// Configuration parser for loading cluster configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ClusterConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ProvisionerError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionerError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ClusterConfig> {
        debug!("Parsing YAML configuration");

        let config: ClusterConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ProvisionerError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Successfully parsed configuration for cluster: {}", config.cluster_name);
        Ok(config)
    }

    /// Serializes a configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(config: &ClusterConfig) -> Result<String> {
        serde_yaml::to_string(config).map_err(|e| {
            ProvisionerError::Config(ConfigError::SerializeError {
                message: e.to_string(),
            })
        })
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ProvisionerError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves API credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if either the token or the secret is missing.
    pub fn credentials() -> Result<Credentials> {
        Self::credentials_from(|name| std::env::var(name).ok())
    }

    /// Resolves API credentials through the given variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if either the token or the secret is missing.
    pub fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
        let first_set = |primary: &str, fallback: &str| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(fallback).filter(|v| !v.is_empty()))
        };

        let token = first_set(ACCESS_TOKEN_ENV, ACCESS_TOKEN_FALLBACK_ENV);
        let secret = first_set(ACCESS_SECRET_ENV, ACCESS_SECRET_FALLBACK_ENV);

        match (token, secret) {
            (Some(access_token), Some(access_token_secret)) => Ok(Credentials {
                access_token,
                access_token_secret,
            }),
            _ => Err(ProvisionerError::Config(ConfigError::MissingEnvVar {
                name: format!(
                    "{ACCESS_TOKEN_ENV} (or {ACCESS_TOKEN_FALLBACK_ENV}) and \
                     {ACCESS_SECRET_ENV} (or {ACCESS_SECRET_FALLBACK_ENV}) environment variables are required"
                ),
            })),
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "apprun.yaml",
    "apprun.yml",
    "apprun-dedicated.yaml",
    "apprun-dedicated.yml",
];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ProvisionerError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
clusterName: prod
applications: []
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("parse");
        assert_eq!(config.cluster_name, "prod");
        assert!(config.cluster.is_none());
        assert!(config.auto_scaling_groups.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
clusterName: prod
cluster:
  letsEncryptEmail: ops@example.com
  servicePrincipalId: "113700000001"
autoScalingGroups:
  - name: workers
    zone: is1a
    workerServiceClassPath: cloud/plan/worker/4core-8gb
    minNodes: 1
    maxNodes: 3
    nameServers: [133.242.0.3, 133.242.0.4]
    interfaces:
      - interfaceIndex: 0
        upstream: shared
        connectsToLb: true
        ipPool:
          - start: 192.168.0.10
            end: 192.168.0.20
        netmaskLen: 24
        defaultGateway: 192.168.0.1
loadBalancers:
  - name: web-lb
    autoScalingGroupName: workers
    serviceClassPath: cloud/plan/lb/small
    interfaces:
      - interfaceIndex: 0
        upstream: shared
        vip: 192.168.0.100
        virtualRouterId: 10
applications:
  - name: web
    spec:
      cpu: 500
      memory: 1024
      scalingMode: cpu
      minScale: 1
      maxScale: 4
      scaleInThreshold: 40
      scaleOutThreshold: 80
      image: ghcr.io/example/web:1.0
      cmd: [nginx, -g, "daemon off;"]
      registryUsername: bot
      registryPassword: hunter2
      registryPasswordVersion: 2
      exposedPorts:
        - targetPort: 80
          loadBalancerPort: 443
          useLetsEncrypt: true
          host: [www.example.com]
          healthCheck:
            path: /healthz
            intervalSeconds: 10
            timeoutSeconds: 3
      env:
        - key: MODE
          value: production
        - key: API_KEY
          value: s3cr3t
          secret: true
          secretVersion: 1
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("parse");

        let settings = config.cluster.as_ref().expect("cluster settings");
        assert_eq!(settings.lets_encrypt_email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.auto_scaling_groups[0].interfaces[0].netmask_len, Some(24));
        assert!(config.auto_scaling_groups[0].interfaces[0].connects_to_lb);
        assert_eq!(config.load_balancers[0].interfaces[0].virtual_router_id, Some(10));

        let spec = &config.applications[0].spec;
        assert_eq!(spec.cmd.len(), 3);
        assert_eq!(spec.registry_password_version, Some(2));
        assert_eq!(spec.exposed_ports[0].host, vec!["www.example.com"]);
        assert_eq!(spec.env[1].secret_version, Some(1));
    }

    #[test]
    fn test_yaml_round_trip_skips_empty_fields() {
        let config = ConfigParser::new()
            .parse_yaml("clusterName: prod\napplications: []\n", None)
            .expect("parse");
        let yaml = ConfigParser::to_yaml(&config).expect("serialize");
        assert!(yaml.contains("clusterName: prod"));
        assert!(!yaml.contains("autoScalingGroups"));
        assert!(!yaml.contains("cluster:"));
    }

    #[test]
    fn test_load_file_missing() {
        let err = ConfigParser::new()
            .load_file("/nonexistent/apprun.yaml")
            .expect_err("missing file");
        assert!(matches!(
            err,
            ProvisionerError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("apprun.yaml"), "clusterName: x\n").expect("write");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, dir.path().join("apprun.yaml"));
    }

    #[test]
    fn test_credentials_fallback() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ACCESS_TOKEN_FALLBACK_ENV, "legacy-token"),
            (ACCESS_SECRET_ENV, "secret"),
        ]);
        let creds = ConfigParser::credentials_from(|k| vars.get(k).map(|v| (*v).to_string()))
            .expect("credentials");
        assert_eq!(creds.access_token, "legacy-token");
        assert_eq!(creds.access_token_secret, "secret");
    }

    #[test]
    fn test_credentials_missing() {
        let err = ConfigParser::credentials_from(|_| None).expect_err("missing");
        assert!(err.to_string().contains("SAKURA_ACCESS_TOKEN (or SAKURACLOUD_ACCESS_TOKEN)"));
    }
}
