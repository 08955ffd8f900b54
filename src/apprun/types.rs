//! `AppRun` Dedicated API types.
//!
//! Request and response bodies exchanged with the control plane. All JSON
//! keys are camelCase; list responses carry an opaque `nextCursor`.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// One page of a cursor-paginated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page.
    #[must_use]
    pub const fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// Creates a final page.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Accepts a cursor encoded as a string or a number. Empty means "no more pages".
fn deserialize_cursor<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ============================================================================
// Clusters
// ============================================================================

/// Cluster entry in a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Cluster ID.
    pub cluster_id: Uuid,
    /// Cluster name.
    pub name: String,
}

/// Full cluster detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDetail {
    /// Cluster ID.
    pub cluster_id: Uuid,
    /// Cluster name.
    pub name: String,
    /// Service principal the cluster acts as.
    #[serde(default)]
    pub service_principal_id: String,
    /// Whether a Let's Encrypt email is configured. The value itself is never returned.
    #[serde(default)]
    pub has_lets_encrypt_email: bool,
}

/// Cluster settings update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClusterRequest {
    /// Service principal.
    pub service_principal_id: String,
    /// Let's Encrypt contact email; omitted to leave unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lets_encrypt_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListClustersResponse {
    #[serde(default)]
    pub clusters: Vec<ClusterSummary>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetClusterResponse {
    pub cluster: ClusterDetail,
}

// ============================================================================
// Auto-scaling groups
// ============================================================================

/// An inclusive IP address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    /// First address.
    pub start: String,
    /// Last address.
    pub end: String,
}

/// Auto-scaling group interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsgInterface {
    /// Interface slot.
    pub interface_index: i16,
    /// Upstream network.
    pub upstream: String,
    /// Whether this interface faces the load balancers.
    #[serde(default)]
    pub connects_to_lb: bool,
    /// Address pool.
    #[serde(default)]
    pub ip_pool: Vec<IpRange>,
    /// Netmask length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask_len: Option<i16>,
    /// Default gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    /// Packet filter ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_filter_id: Option<String>,
}

/// Live auto-scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalingGroup {
    /// Group ID.
    pub auto_scaling_group_id: Uuid,
    /// Group name.
    pub name: String,
    /// Availability zone.
    #[serde(default)]
    pub zone: String,
    /// Worker service class path.
    #[serde(default)]
    pub worker_service_class_path: String,
    /// Minimum node count.
    #[serde(default)]
    pub min_nodes: i32,
    /// Maximum node count.
    #[serde(default)]
    pub max_nodes: i32,
    /// DNS servers.
    #[serde(default)]
    pub name_servers: Vec<String>,
    /// Network interfaces.
    #[serde(default)]
    pub interfaces: Vec<AsgInterface>,
}

/// Auto-scaling group creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutoScalingGroupRequest {
    /// Group name.
    pub name: String,
    /// Availability zone.
    pub zone: String,
    /// Worker service class path.
    pub worker_service_class_path: String,
    /// Minimum node count.
    pub min_nodes: i32,
    /// Maximum node count.
    pub max_nodes: i32,
    /// DNS servers.
    pub name_servers: Vec<String>,
    /// Network interfaces.
    pub interfaces: Vec<AsgInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListAutoScalingGroupsResponse {
    #[serde(default)]
    pub auto_scaling_groups: Vec<AutoScalingGroup>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AutoScalingGroupResponse {
    pub auto_scaling_group: AutoScalingGroup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedAutoScalingGroup {
    pub auto_scaling_group_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAutoScalingGroupResponse {
    pub auto_scaling_group: CreatedAutoScalingGroup,
}

// ============================================================================
// Load balancers
// ============================================================================

/// Load balancer interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LbInterface {
    /// Interface slot.
    pub interface_index: i16,
    /// Upstream network.
    pub upstream: String,
    /// Address pool.
    #[serde(default)]
    pub ip_pool: Vec<IpRange>,
    /// Netmask length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask_len: Option<i16>,
    /// Default gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    /// Virtual IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip: Option<String>,
    /// VRRP router ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router_id: Option<i16>,
    /// Packet filter ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_filter_id: Option<String>,
}

/// Load balancer entry in a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSummary {
    /// Load balancer ID.
    pub load_balancer_id: Uuid,
    /// Load balancer name.
    pub name: String,
}

/// Live load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Load balancer ID.
    pub load_balancer_id: Uuid,
    /// Load balancer name.
    pub name: String,
    /// Service class path.
    #[serde(default)]
    pub service_class_path: String,
    /// DNS servers.
    #[serde(default)]
    pub name_servers: Vec<String>,
    /// Network interfaces.
    #[serde(default)]
    pub interfaces: Vec<LbInterface>,
}

/// Load balancer creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadBalancerRequest {
    /// Load balancer name.
    pub name: String,
    /// Service class path.
    pub service_class_path: String,
    /// DNS servers.
    pub name_servers: Vec<String>,
    /// Network interfaces.
    pub interfaces: Vec<LbInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListLoadBalancersResponse {
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancerSummary>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadBalancerResponse {
    pub load_balancer: LoadBalancer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedLoadBalancer {
    pub load_balancer_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateLoadBalancerResponse {
    pub load_balancer: CreatedLoadBalancer,
}

// ============================================================================
// Applications
// ============================================================================

/// Live application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application ID.
    pub application_id: Uuid,
    /// Application name.
    pub name: String,
    /// Owning cluster.
    pub cluster_id: Uuid,
    /// Version currently serving traffic.
    #[serde(default)]
    pub active_version: Option<i32>,
}

/// Application creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    /// Application name.
    pub name: String,
    /// Owning cluster.
    pub cluster_id: Uuid,
}

/// Application update. `active_version: None` serializes as `null` and deactivates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplicationRequest {
    /// Version to activate.
    pub active_version: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListApplicationsResponse {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedApplication {
    pub application_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateApplicationResponse {
    pub application: CreatedApplication,
}

// ============================================================================
// Application versions
// ============================================================================

/// HTTP health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Request path.
    pub path: String,
    /// Seconds between checks.
    pub interval_seconds: i32,
    /// Seconds before a check fails.
    pub timeout_seconds: i32,
}

/// Exposed port of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedPort {
    /// Container port.
    pub target_port: i32,
    /// Port on the load balancer.
    #[serde(default)]
    pub load_balancer_port: Option<i32>,
    /// Whether a Let's Encrypt certificate is provisioned.
    #[serde(default)]
    pub use_lets_encrypt: bool,
    /// Host names routed to the port.
    #[serde(default)]
    pub host: Vec<String>,
    /// Optional health check.
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
}

/// Environment variable of a version. Secret values are never returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    /// Variable name.
    pub key: String,
    /// Value; `None` for secrets read back from the API.
    #[serde(default)]
    pub value: Option<String>,
    /// Whether the value is secret.
    #[serde(default)]
    pub secret: bool,
}

/// Version entry in a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    /// Version number.
    pub version: i32,
    /// Image of the version.
    #[serde(default)]
    pub image: String,
    /// Creation time, Unix seconds.
    #[serde(default)]
    pub created: i64,
    /// Nodes currently running the version.
    #[serde(default)]
    pub active_node_count: i64,
}

/// Full application version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVersion {
    /// Version number.
    pub version: i32,
    /// CPU in millicores.
    #[serde(default)]
    pub cpu: i64,
    /// Memory in MiB.
    #[serde(default)]
    pub memory: i64,
    /// Scaling mode.
    #[serde(default)]
    pub scaling_mode: String,
    /// Fixed replica count.
    #[serde(default)]
    pub fixed_scale: Option<i32>,
    /// Minimum replicas.
    #[serde(default)]
    pub min_scale: Option<i32>,
    /// Maximum replicas.
    #[serde(default)]
    pub max_scale: Option<i32>,
    /// Scale-in CPU threshold.
    #[serde(default)]
    pub scale_in_threshold: Option<i32>,
    /// Scale-out CPU threshold.
    #[serde(default)]
    pub scale_out_threshold: Option<i32>,
    /// Container image.
    #[serde(default)]
    pub image: String,
    /// Command override.
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Registry user.
    #[serde(default)]
    pub registry_username: Option<String>,
    /// Exposed ports.
    #[serde(default)]
    pub exposed_ports: Vec<ExposedPort>,
    /// Environment variables.
    #[serde(default)]
    pub env: Vec<EnvironmentVariable>,
}

/// What to do with the stored registry password when creating a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryPasswordAction {
    /// Store the password sent with the request.
    New,
    /// Carry the previous version's password forward.
    Keep,
    /// Drop the stored password.
    Remove,
}

/// Version creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    /// CPU in millicores.
    pub cpu: i64,
    /// Memory in MiB.
    pub memory: i64,
    /// Scaling mode.
    pub scaling_mode: String,
    /// Fixed replica count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_scale: Option<i32>,
    /// Minimum replicas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_scale: Option<i32>,
    /// Maximum replicas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_scale: Option<i32>,
    /// Scale-in CPU threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_in_threshold: Option<i32>,
    /// Scale-out CPU threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_out_threshold: Option<i32>,
    /// Container image.
    pub image: String,
    /// Command override.
    pub cmd: Vec<String>,
    /// Registry user; `null` for none.
    pub registry_username: Option<String>,
    /// Registry password; only sent with [`RegistryPasswordAction::New`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_password: Option<String>,
    /// Registry password handling.
    pub registry_password_action: RegistryPasswordAction,
    /// Exposed ports.
    pub exposed_ports: Vec<ExposedPort>,
    /// Environment variables.
    pub env: Vec<EnvironmentVariable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListVersionsResponse {
    #[serde(default)]
    pub versions: Vec<VersionSummary>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplicationVersionResponse {
    pub application_version: ApplicationVersion,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedVersion {
    pub version: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateVersionResponse {
    pub application_version: CreatedVersion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_accepts_string_and_number() {
        let s: ListVersionsResponse =
            serde_json::from_str(r#"{"versions": [], "nextCursor": "abc"}"#).expect("string");
        assert_eq!(s.next_cursor.as_deref(), Some("abc"));

        let n: ListVersionsResponse =
            serde_json::from_str(r#"{"versions": [], "nextCursor": 40}"#).expect("number");
        assert_eq!(n.next_cursor.as_deref(), Some("40"));

        let empty: ListVersionsResponse =
            serde_json::from_str(r#"{"versions": [], "nextCursor": ""}"#).expect("empty");
        assert!(empty.next_cursor.is_none());

        let missing: ListVersionsResponse =
            serde_json::from_str(r#"{"versions": []}"#).expect("missing");
        assert!(missing.next_cursor.is_none());
    }

    #[test]
    fn test_deactivate_serializes_null() {
        let body = serde_json::to_string(&UpdateApplicationRequest {
            active_version: None,
        })
        .expect("serialize");
        assert_eq!(body, r#"{"activeVersion":null}"#);
    }

    #[test]
    fn test_password_action_lowercase() {
        let json = serde_json::to_value(RegistryPasswordAction::Keep).expect("serialize");
        assert_eq!(json, "keep");
    }
}
