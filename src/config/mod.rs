//! Configuration module for the provisioner.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and serializing the cluster YAML file
//! - Validation of configuration values
//! - Resolving API credentials from the environment

mod spec;
mod parser;
mod validator;

pub use spec::{
    ApplicationConfig, ApplicationSpec, AsgInterfaceConfig, AutoScalingGroupConfig, ClusterConfig,
    ClusterSettings, EnvVarConfig, ExposedPortConfig, HealthCheckConfig, IpRangeConfig,
    LbInterfaceConfig, LoadBalancerConfig, ScalingMode,
};
pub use parser::{
    ACCESS_SECRET_ENV, ACCESS_SECRET_FALLBACK_ENV, ACCESS_TOKEN_ENV, ACCESS_TOKEN_FALLBACK_ENV,
    ConfigParser, Credentials, DEFAULT_CONFIG_FILES, find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
