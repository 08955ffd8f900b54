//! Error types for the `AppRun` provisioner.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation cycle: configuration loading, the secret-version ledger,
//! the `AppRun` Dedicated API, name resolution, planning and apply.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the provisioner.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Secret-version ledger errors.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// `AppRun` API errors.
    #[error("AppRun API error: {0}")]
    Api(#[from] ApiError),

    /// Name resolution errors.
    #[error("{0}")]
    Resolve(#[from] ResolveError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Apply errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable, or a description of the alternatives.
        name: String,
    },

    /// Configuration could not be serialized back to YAML.
    #[error("Failed to serialize configuration: {message}")]
    SerializeError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Secret-version ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger file is corrupted.
    #[error("Ledger is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("Ledger serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Ledger format version mismatch.
    #[error("Ledger version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Supported ledger version.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// The backing store could not be accessed.
    #[error("Ledger store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// `AppRun` Dedicated API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed.
    #[error("AppRun authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed with a non-success status.
    #[error("AppRun API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the API.
        message: String,
    },

    /// Rate limited.
    #[error("AppRun API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with AppRun: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from AppRun API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised while resolving names to live resources.
///
/// These are always raised before any mutation is attempted.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No cluster with the given name exists.
    #[error("cluster \"{name}\" not found")]
    ClusterNotFound {
        /// Cluster name.
        name: String,
    },

    /// No application with the given name exists in the cluster.
    #[error("application \"{name}\" not found in cluster")]
    ApplicationNotFound {
        /// Application name.
        name: String,
    },

    /// The application has no active version.
    #[error("no active version exists for application \"{application}\"")]
    NoActiveVersion {
        /// Application name.
        application: String,
    },

    /// The application has no versions at all.
    #[error("no versions exist for application \"{application}\"")]
    NoVersions {
        /// Application name.
        application: String,
    },

    /// The requested version does not exist.
    #[error("version {version} not found for application \"{application}\"")]
    VersionNotFound {
        /// Application name.
        application: String,
        /// Requested version number.
        version: i32,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two specs could not be compared.
    #[error("Failed to compare specs for {resource}: {message}")]
    ComparisonFailed {
        /// Resource being compared.
        resource: String,
        /// Description of the malformed input.
        message: String,
    },
}

/// The ordered stages of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    /// Cluster-level settings update.
    ClusterSettings,
    /// Load balancer deletion.
    DeleteLoadBalancers,
    /// Auto-scaling group deletion.
    DeleteAutoScalingGroups,
    /// Auto-scaling group creation.
    CreateAutoScalingGroups,
    /// Load balancer creation.
    CreateLoadBalancers,
    /// Application and version writes.
    Applications,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClusterSettings => "cluster settings",
            Self::DeleteLoadBalancers => "delete load balancers",
            Self::DeleteAutoScalingGroups => "delete auto-scaling groups",
            Self::CreateAutoScalingGroups => "create auto-scaling groups",
            Self::CreateLoadBalancers => "create load balancers",
            Self::Applications => "applications",
        };
        write!(f, "{name}")
    }
}

/// Apply errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A stage failed; remaining stages were not run.
    #[error("stage '{stage}' failed for {resource}: {source}")]
    StageFailed {
        /// Stage that failed.
        stage: ApplyStage,
        /// Resource being processed.
        resource: String,
        /// Underlying error.
        source: Box<ProvisionerError>,
    },

    /// A resource did not disappear before the polling ceiling.
    #[error("timed out after {elapsed_secs}s waiting for {resource_type} '{name}' to be deleted")]
    DeletionTimeout {
        /// Kind of resource.
        resource_type: String,
        /// Resource name.
        name: String,
        /// Seconds spent waiting.
        elapsed_secs: u64,
    },

    /// The plan references a resource missing from the desired configuration.
    #[error("{resource_type} '{name}' not found in desired configuration")]
    MissingConfig {
        /// Kind of resource.
        resource_type: String,
        /// Resource name.
        name: String,
    },

    /// An identifier needed for the action could not be resolved.
    #[error("cannot {operation} {resource_type} '{name}': {reason}")]
    MissingIdentifier {
        /// Operation attempted.
        operation: String,
        /// Kind of resource.
        resource_type: String,
        /// Resource name.
        name: String,
        /// Why the identifier is unavailable.
        reason: String,
    },
}

/// Result type alias for provisioner operations.
pub type Result<T> = std::result::Result<T, ProvisionerError>;

impl ProvisionerError {
    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::RateLimited { .. } | ApiError::NetworkError { .. })
        )
    }

    /// Returns the delay the server asked for before retrying, if any.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Returns true if this error is an authentication failure.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api(ApiError::AuthenticationFailed { .. }))
    }

    /// Wraps this error as a failed apply stage.
    #[must_use]
    pub fn in_stage(self, stage: ApplyStage, resource: impl Into<String>) -> Self {
        Self::Apply(ApplyError::StageFailed {
            stage,
            resource: resource.into(),
            source: Box::new(self),
        })
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl PlanError {
    /// Attributes the failure to a named resource.
    #[must_use]
    pub fn for_resource(self, resource: impl Into<String>) -> Self {
        match self {
            Self::ComparisonFailed { message, .. } => Self::ComparisonFailed {
                resource: resource.into(),
                message,
            },
        }
    }
}

impl LedgerError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_not_found_message() {
        let err = ProvisionerError::from(ResolveError::ClusterNotFound {
            name: "prod".to_string(),
        });
        assert_eq!(err.to_string(), "cluster \"prod\" not found");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ProvisionerError::from(ApiError::network("reset")).is_retryable());
        assert!(!ProvisionerError::from(ApiError::api_error(500, "boom")).is_retryable());
    }

    #[test]
    fn test_only_rate_limits_carry_a_retry_delay() {
        let limited = ProvisionerError::from(ApiError::RateLimited { retry_after_secs: 30 });
        assert_eq!(limited.retry_delay_secs(), Some(30));
        assert_eq!(ProvisionerError::from(ApiError::network("reset")).retry_delay_secs(), None);
    }

    #[test]
    fn test_stage_failure_names_stage_and_resource() {
        let err = ProvisionerError::from(ApiError::api_error(409, "conflict"))
            .in_stage(ApplyStage::CreateLoadBalancers, "web-lb");
        let message = err.to_string();
        assert!(message.contains("create load balancers"));
        assert!(message.contains("web-lb"));
        assert!(message.contains("conflict"));
    }
}
