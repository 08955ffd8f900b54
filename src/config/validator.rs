//! Configuration validation for cluster specs.
//!
//! Field ranges are declared on the spec types with `validator` derives;
//! cross-field rules (scaling mode requirements, secret versions, name
//! uniqueness) are checked here.

use crate::error::{ConfigError, ProvisionerError, Result};
use std::collections::HashSet;
use tracing::debug;
use validator::Validate;

use super::spec::{
    ApplicationConfig, AutoScalingGroupConfig, ClusterConfig, LoadBalancerConfig, ScalingMode,
};

/// Validator for cluster configurations.
#[derive(Debug)]
pub struct ConfigValidator {
    /// Whether to warn about mutable `:latest` image tags.
    warn_latest_tag: bool,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            warn_latest_tag: true,
        }
    }

    /// Disables the `:latest` image tag warning.
    #[must_use]
    pub const fn without_latest_tag_warning(mut self) -> Self {
        self.warn_latest_tag = false;
        self
    }

    /// Validates a cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &ClusterConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(ProvisionerError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &ClusterConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.cluster_name.trim().is_empty() {
            result.push_error("clusterName", "clusterName is required");
        }

        if let Some(settings) = &config.cluster
            && settings.service_principal_id.trim().is_empty()
        {
            result.push_error(
                "cluster.servicePrincipalId",
                "servicePrincipalId is required when cluster settings are given",
            );
        }

        Self::validate_auto_scaling_groups(&config.auto_scaling_groups, &mut result);
        Self::validate_load_balancers(config, &mut result);
        self.validate_applications(&config.applications, &mut result);

        result
    }

    fn validate_auto_scaling_groups(groups: &[AutoScalingGroupConfig], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, asg) in groups.iter().enumerate() {
            let prefix = format!("autoScalingGroups[{i}]");

            if asg.name.is_empty() {
                result.push_error(&prefix, "name is required");
            } else if !seen.insert(asg.name.as_str()) {
                result.push_error(&prefix, format!("duplicate auto-scaling group name '{}'", asg.name));
            }

            if asg.zone.is_empty() {
                result.push_error(format!("{prefix}.zone"), "zone is required");
            }
            if asg.worker_service_class_path.is_empty() {
                result.push_error(
                    format!("{prefix}.workerServiceClassPath"),
                    "workerServiceClassPath is required",
                );
            }
            if asg.min_nodes < 0 || asg.min_nodes > asg.max_nodes {
                result.push_error(
                    format!("{prefix}.minNodes"),
                    format!(
                        "minNodes ({}) must be between 0 and maxNodes ({})",
                        asg.min_nodes, asg.max_nodes
                    ),
                );
            }
        }
    }

    fn validate_load_balancers(config: &ClusterConfig, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, lb) in config.load_balancers.iter().enumerate() {
            let prefix = format!("loadBalancers[{i}]");

            if lb.name.is_empty() {
                result.push_error(&prefix, "name is required");
            } else if !seen.insert((lb.auto_scaling_group_name.as_str(), lb.name.as_str())) {
                result.push_error(
                    &prefix,
                    format!(
                        "duplicate load balancer name '{}' in auto-scaling group '{}'",
                        lb.name, lb.auto_scaling_group_name
                    ),
                );
            }

            Self::validate_load_balancer_owner(config, lb, &prefix, result);

            if lb.service_class_path.is_empty() {
                result.push_error(format!("{prefix}.serviceClassPath"), "serviceClassPath is required");
            }
        }
    }

    fn validate_load_balancer_owner(
        config: &ClusterConfig,
        lb: &LoadBalancerConfig,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        if lb.auto_scaling_group_name.is_empty() {
            result.push_error(
                format!("{prefix}.autoScalingGroupName"),
                "autoScalingGroupName is required",
            );
        } else if config.auto_scaling_group(&lb.auto_scaling_group_name).is_none() {
            result.warnings.push(format!(
                "Load balancer '{}' references auto-scaling group '{}' which is not declared in this file",
                lb.name, lb.auto_scaling_group_name
            ));
        }
    }

    fn validate_applications(&self, applications: &[ApplicationConfig], result: &mut ValidationResult) {
        if applications.is_empty() {
            result.warnings.push(String::from("No applications defined"));
        }

        let mut seen = HashSet::new();

        for (i, app) in applications.iter().enumerate() {
            let prefix = format!("applications[{i}]");

            if app.name.is_empty() {
                result.push_error(&prefix, "name is required");
            } else if !seen.insert(app.name.as_str()) {
                result.push_error(&prefix, format!("duplicate application name '{}'", app.name));
            }

            self.validate_application_spec(app, &prefix, result);
        }
    }

    fn validate_application_spec(
        &self,
        app: &ApplicationConfig,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let spec = &app.spec;
        let spec_prefix = format!("{prefix}.spec");

        if let Err(errors) = spec.validate() {
            let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));

            for (field, field_errors) in fields {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("{field} is invalid ({})", error.code), ToString::to_string);
                    result.push_error(format!("{spec_prefix}.{}", camel_case(&field)), message);
                }
            }
        }

        match spec.scaling() {
            Some(ScalingMode::Manual) => {
                if spec.fixed_scale.is_none() {
                    result.push_error(
                        format!("{spec_prefix}.fixedScale"),
                        "fixedScale is required when scalingMode is 'manual'",
                    );
                }
            }
            Some(ScalingMode::Cpu) => {
                if spec.min_scale.is_none() || spec.max_scale.is_none() {
                    result.push_error(
                        format!("{spec_prefix}.minScale"),
                        "minScale and maxScale are required when scalingMode is 'cpu'",
                    );
                }
                if let (Some(min), Some(max)) = (spec.min_scale, spec.max_scale)
                    && min > max
                {
                    result.push_error(
                        format!("{spec_prefix}.minScale"),
                        format!("minScale ({min}) must not exceed maxScale ({max})"),
                    );
                }
            }
            None => result.push_error(
                format!("{spec_prefix}.scalingMode"),
                "scalingMode must be 'manual' or 'cpu'",
            ),
        }

        if spec.registry_password.is_some() && spec.registry_password_version.is_none() {
            result.push_error(
                format!("{spec_prefix}.registryPasswordVersion"),
                "registryPasswordVersion is required when registryPassword is set",
            );
        }

        let mut ports = HashSet::new();
        for (j, port) in spec.exposed_ports.iter().enumerate() {
            if !(1..=65535).contains(&port.target_port) {
                result.push_error(
                    format!("{spec_prefix}.exposedPorts[{j}].targetPort"),
                    format!("targetPort {} is out of range", port.target_port),
                );
            }
            if !ports.insert(port.target_port) {
                result.push_error(
                    format!("{spec_prefix}.exposedPorts[{j}].targetPort"),
                    format!("duplicate targetPort {}", port.target_port),
                );
            }
        }

        for (j, env) in spec.env.iter().enumerate() {
            if env.key.is_empty() {
                result.push_error(format!("{spec_prefix}.env[{j}]"), "key is required");
            }
            if env.secret && env.secret_version.is_none() {
                result.push_error(
                    format!("{spec_prefix}.env[{j}]"),
                    format!("secretVersion is required when secret is true (key: {})", env.key),
                );
            }
        }

        if self.warn_latest_tag && spec.image.ends_with(":latest") {
            result.warnings.push(format!(
                "Application '{}' uses a ':latest' image tag; image changes are not tracked after creation",
                app.name
            ));
        }
    }
}

/// Converts a Rust field name into the camelCase key used in YAML.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
