//! Configuration specification types for the provisioner.
//!
//! These structs map one-to-one onto the cluster YAML file and fully
//! describe the desired state of a cluster. Keys are camelCase.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// The root configuration structure: one cluster and everything in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Name of the target cluster. Must already exist.
    #[serde(default)]
    pub cluster_name: String,
    /// Optional cluster-level settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterSettings>,
    /// Auto-scaling worker groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_scaling_groups: Vec<AutoScalingGroupConfig>,
    /// Load balancers, each owned by an auto-scaling group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancers: Vec<LoadBalancerConfig>,
    /// Applications deployed on the cluster.
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// Cluster-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSettings {
    /// Contact email for Let's Encrypt certificates. Never returned by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lets_encrypt_email: Option<String>,
    /// Service principal the cluster acts as.
    pub service_principal_id: String,
}

/// An auto-scaling group of worker nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalingGroupConfig {
    /// Unique name within the cluster.
    pub name: String,
    /// Availability zone.
    pub zone: String,
    /// Service class path of the worker nodes.
    pub worker_service_class_path: String,
    /// Minimum node count.
    pub min_nodes: i32,
    /// Maximum node count.
    pub max_nodes: i32,
    /// DNS servers, order-sensitive.
    #[serde(default)]
    pub name_servers: Vec<String>,
    /// Network interfaces.
    #[serde(default)]
    pub interfaces: Vec<AsgInterfaceConfig>,
}

/// A network interface of an auto-scaling group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AsgInterfaceConfig {
    /// Interface slot.
    pub interface_index: i16,
    /// Upstream network.
    pub upstream: String,
    /// Whether this interface faces the load balancers.
    #[serde(default)]
    pub connects_to_lb: bool,
    /// Address pool.
    #[serde(default)]
    pub ip_pool: Vec<IpRangeConfig>,
    /// Netmask length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask_len: Option<i16>,
    /// Default gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    /// Packet filter attached to the interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_filter_id: Option<String>,
}

/// An inclusive IP address range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpRangeConfig {
    /// First address.
    pub start: String,
    /// Last address.
    pub end: String,
}

/// A load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    /// Unique name within the owning group.
    pub name: String,
    /// Name of the owning auto-scaling group.
    pub auto_scaling_group_name: String,
    /// Service class path of the load balancer nodes.
    pub service_class_path: String,
    /// DNS servers, order-sensitive.
    #[serde(default)]
    pub name_servers: Vec<String>,
    /// Network interfaces.
    #[serde(default)]
    pub interfaces: Vec<LbInterfaceConfig>,
}

/// A network interface of a load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LbInterfaceConfig {
    /// Interface slot.
    pub interface_index: i16,
    /// Upstream network.
    pub upstream: String,
    /// Address pool.
    #[serde(default)]
    pub ip_pool: Vec<IpRangeConfig>,
    /// Netmask length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask_len: Option<i16>,
    /// Default gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    /// Virtual IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip: Option<String>,
    /// VRRP router id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router_id: Option<i16>,
    /// Packet filter attached to the interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_filter_id: Option<String>,
}

/// A named application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Unique name within the cluster.
    pub name: String,
    /// Desired version spec.
    pub spec: ApplicationSpec,
}

/// The desired spec of an application version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// CPU in millicores.
    #[validate(range(min = 100, max = 64000, message = "cpu must be between 100 and 64000"))]
    pub cpu: i64,
    /// Memory in MiB.
    #[validate(range(min = 128, max = 131_072, message = "memory must be between 128 and 131072"))]
    pub memory: i64,
    /// Either `manual` or `cpu`.
    #[serde(default)]
    pub scaling_mode: String,
    /// Replica count under manual scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_scale: Option<i32>,
    /// Lower replica bound under cpu scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_scale: Option<i32>,
    /// Upper replica bound under cpu scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scale: Option<i32>,
    /// CPU percentage below which replicas are removed.
    #[validate(range(min = 30, max = 70, message = "scaleInThreshold must be between 30 and 70"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_in_threshold: Option<i32>,
    /// CPU percentage above which replicas are added.
    #[validate(range(min = 50, max = 99, message = "scaleOutThreshold must be between 50 and 99"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_out_threshold: Option<i32>,
    /// Container image. Only used when the application is created.
    #[validate(length(min = 1, message = "image is required"))]
    #[serde(default)]
    pub image: String,
    /// Command override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    /// Private registry user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_username: Option<String>,
    /// Private registry password. Never returned by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_password: Option<String>,
    /// Operator-maintained version of the registry password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_password_version: Option<i64>,
    /// Ports exposed through the load balancers.
    #[validate(length(min = 1, message = "at least one exposed port is required"))]
    #[serde(default)]
    pub exposed_ports: Vec<ExposedPortConfig>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarConfig>,
}

/// A port exposed by an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExposedPortConfig {
    /// Container port.
    pub target_port: i32,
    /// Port on the load balancer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_port: Option<i32>,
    /// Whether to provision a Let's Encrypt certificate.
    #[serde(default)]
    pub use_lets_encrypt: bool,
    /// Host names routed to this port.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    /// Optional HTTP health check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,
}

/// HTTP health check for an exposed port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    /// Request path.
    pub path: String,
    /// Seconds between checks.
    pub interval_seconds: i32,
    /// Seconds before a check fails.
    pub timeout_seconds: i32,
}

/// An environment variable of an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarConfig {
    /// Variable name.
    pub key: String,
    /// Value. Secret values are never returned by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the value is secret.
    #[serde(default)]
    pub secret: bool,
    /// Operator-maintained version of the secret value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_version: Option<i64>,
}

/// Replica scaling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    /// Fixed replica count.
    Manual,
    /// Scale on CPU usage between bounds.
    Cpu,
}

impl ScalingMode {
    /// Parses the configuration spelling of a scaling mode.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(Self::Manual),
            "cpu" => Some(Self::Cpu),
            _ => None,
        }
    }

    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ClusterConfig {
    /// Looks up an application by name.
    #[must_use]
    pub fn application(&self, name: &str) -> Option<&ApplicationConfig> {
        self.applications.iter().find(|a| a.name == name)
    }

    /// Looks up an auto-scaling group by name.
    #[must_use]
    pub fn auto_scaling_group(&self, name: &str) -> Option<&AutoScalingGroupConfig> {
        self.auto_scaling_groups.iter().find(|a| a.name == name)
    }

    /// Looks up a load balancer by owning group and name.
    #[must_use]
    pub fn load_balancer(&self, asg_name: &str, name: &str) -> Option<&LoadBalancerConfig> {
        self.load_balancers
            .iter()
            .find(|lb| lb.auto_scaling_group_name == asg_name && lb.name == name)
    }
}

impl ApplicationSpec {
    /// Returns the parsed scaling mode, if recognized.
    #[must_use]
    pub fn scaling(&self) -> Option<ScalingMode> {
        ScalingMode::parse(&self.scaling_mode)
    }

    /// Returns true if any environment variable is marked secret.
    #[must_use]
    pub fn has_secret_env(&self) -> bool {
        self.env.iter().any(|e| e.secret)
    }
}
