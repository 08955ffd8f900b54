//! Spec normalization and field-level comparison.
//!
//! Desired specs and live versions are projected into one canonical shape
//! so they can be compared field by field. Secret-bearing fields (registry
//! password, environment variables) are deliberately left out; they are
//! handled by the ledger-based diffs in [`super::diff`].

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;

use crate::apprun::{ApplicationVersion, ExposedPort};
use crate::config::{ApplicationSpec, ExposedPortConfig, ScalingMode};
use crate::error::{PlanError, ProvisionerError, Result};

/// Rendering of an absent optional value.
pub const UNSET: &str = "(unset)";

/// Comparison-ready projection of an application version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSpec {
    /// CPU in millicores.
    pub cpu: i64,
    /// Memory in MiB.
    pub memory: i64,
    /// Scaling mode.
    pub scaling_mode: String,
    /// Fixed replica count.
    pub fixed_scale: Option<i32>,
    /// Minimum replicas.
    pub min_scale: Option<i32>,
    /// Maximum replicas.
    pub max_scale: Option<i32>,
    /// Scale-in threshold.
    pub scale_in_threshold: Option<i32>,
    /// Scale-out threshold.
    pub scale_out_threshold: Option<i32>,
    /// Container image.
    pub image: String,
    /// Command, joined by single spaces.
    pub cmd: String,
    /// Registry user; empty when none.
    pub registry_username: String,
    /// Exposed ports sorted by target port.
    pub exposed_ports: Vec<NormalizedPort>,
}

/// Comparison-ready projection of an exposed port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPort {
    /// Container port; the matching key.
    pub target_port: i32,
    /// Port on the load balancer.
    pub load_balancer_port: Option<i32>,
    /// Whether Let's Encrypt is used.
    pub use_lets_encrypt: bool,
    /// Host names, sorted and joined by commas.
    pub hosts: String,
    /// Health check path; empty when none.
    pub health_check_path: String,
    /// Health check interval; 0 when none.
    pub health_check_interval: i32,
    /// Health check timeout; 0 when none.
    pub health_check_timeout: i32,
}

/// Options controlling [`compare`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Leave the image out of the comparison.
    pub skip_image: bool,
}

impl CompareOptions {
    /// Options for planning, where the image is always inherited.
    #[must_use]
    pub const fn planning() -> Self {
        Self { skip_image: true }
    }

    /// Options for comparing two live versions.
    #[must_use]
    pub const fn versions() -> Self {
        Self { skip_image: false }
    }
}

fn joined_hosts(hosts: &[String]) -> String {
    let mut sorted = hosts.to_vec();
    sorted.sort();
    sorted.join(",")
}

impl From<&ExposedPortConfig> for NormalizedPort {
    fn from(port: &ExposedPortConfig) -> Self {
        let hc = port.health_check.as_ref();
        Self {
            target_port: port.target_port,
            load_balancer_port: port.load_balancer_port,
            use_lets_encrypt: port.use_lets_encrypt,
            hosts: joined_hosts(&port.host),
            health_check_path: hc.map(|h| h.path.clone()).unwrap_or_default(),
            health_check_interval: hc.map_or(0, |h| h.interval_seconds),
            health_check_timeout: hc.map_or(0, |h| h.timeout_seconds),
        }
    }
}

impl From<&ExposedPort> for NormalizedPort {
    fn from(port: &ExposedPort) -> Self {
        let hc = port.health_check.as_ref();
        Self {
            target_port: port.target_port,
            load_balancer_port: port.load_balancer_port,
            use_lets_encrypt: port.use_lets_encrypt,
            hosts: joined_hosts(&port.host),
            health_check_path: hc.map(|h| h.path.clone()).unwrap_or_default(),
            health_check_interval: hc.map_or(0, |h| h.interval_seconds),
            health_check_timeout: hc.map_or(0, |h| h.timeout_seconds),
        }
    }
}

fn sorted_ports(mut ports: Vec<NormalizedPort>) -> Vec<NormalizedPort> {
    ports.sort_by_key(|p| p.target_port);
    ports
}

impl From<&ApplicationSpec> for NormalizedSpec {
    fn from(spec: &ApplicationSpec) -> Self {
        Self {
            cpu: spec.cpu,
            memory: spec.memory,
            scaling_mode: spec.scaling_mode.clone(),
            fixed_scale: spec.fixed_scale,
            min_scale: spec.min_scale,
            max_scale: spec.max_scale,
            scale_in_threshold: spec.scale_in_threshold,
            scale_out_threshold: spec.scale_out_threshold,
            image: spec.image.clone(),
            cmd: spec.cmd.join(" "),
            registry_username: spec.registry_username.clone().unwrap_or_default(),
            exposed_ports: sorted_ports(spec.exposed_ports.iter().map(NormalizedPort::from).collect()),
        }
    }
}

impl From<&ApplicationVersion> for NormalizedSpec {
    fn from(version: &ApplicationVersion) -> Self {
        Self {
            cpu: version.cpu,
            memory: version.memory,
            scaling_mode: version.scaling_mode.clone(),
            fixed_scale: version.fixed_scale,
            min_scale: version.min_scale,
            max_scale: version.max_scale,
            scale_in_threshold: version.scale_in_threshold,
            scale_out_threshold: version.scale_out_threshold,
            image: version.image.clone(),
            cmd: version.cmd.join(" "),
            registry_username: version.registry_username.clone().unwrap_or_default(),
            exposed_ports: sorted_ports(version.exposed_ports.iter().map(NormalizedPort::from).collect()),
        }
    }
}

fn show_str(value: &str) -> String {
    if value.is_empty() {
        String::from("\"\"")
    } else {
        value.to_string()
    }
}

fn show_opt<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| UNSET.to_string(), |v| v.to_string())
}

/// Accumulates `"Field: from -> to"` lines.
#[derive(Debug, Default)]
pub(crate) struct ChangeList {
    changes: Vec<String>,
}

impl ChangeList {
    pub(crate) fn scalar<T: PartialEq + Display>(&mut self, field: &str, from: T, to: T) {
        if from != to {
            self.changes.push(format!("{field}: {from} -> {to}"));
        }
    }

    pub(crate) fn text(&mut self, field: &str, from: &str, to: &str) {
        if from != to {
            self.changes
                .push(format!("{field}: {} -> {}", show_str(from), show_str(to)));
        }
    }

    pub(crate) fn optional<T: PartialEq + Display + Copy>(&mut self, field: &str, from: Option<T>, to: Option<T>) {
        if from != to {
            self.changes
                .push(format!("{field}: {} -> {}", show_opt(from), show_opt(to)));
        }
    }

    pub(crate) fn optional_text(&mut self, field: &str, from: Option<&str>, to: Option<&str>) {
        if from != to {
            self.changes
                .push(format!("{field}: {} -> {}", show_opt(from), show_opt(to)));
        }
    }

    pub(crate) fn push(&mut self, change: impl Into<String>) {
        self.changes.push(change.into());
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.changes
    }
}

fn index_ports<'s>(spec: &'s NormalizedSpec, side: &str) -> Result<BTreeMap<i32, &'s NormalizedPort>> {
    let mut seen = HashSet::new();
    let mut ports = BTreeMap::new();
    for port in &spec.exposed_ports {
        if !seen.insert(port.target_port) {
            return Err(ProvisionerError::Plan(PlanError::ComparisonFailed {
                resource: format!("{side} spec"),
                message: format!("duplicate target port {}", port.target_port),
            }));
        }
        ports.insert(port.target_port, port);
    }
    Ok(ports)
}

/// Compares two normalized specs and returns the ordered change list.
///
/// Scaling fields are compared according to the target's scaling mode:
/// only `FixedScale` under manual scaling, only the bounds and thresholds
/// under cpu scaling.
///
/// # Errors
///
/// Returns [`PlanError::ComparisonFailed`] if either side lists the same
/// target port twice.
pub fn compare(from: &NormalizedSpec, to: &NormalizedSpec, options: CompareOptions) -> Result<Vec<String>> {
    let mut changes = ChangeList::default();

    changes.scalar("CPU", from.cpu, to.cpu);
    changes.scalar("Memory", from.memory, to.memory);
    changes.text("ScalingMode", &from.scaling_mode, &to.scaling_mode);

    match ScalingMode::parse(&to.scaling_mode) {
        Some(ScalingMode::Manual) => {
            changes.optional("FixedScale", from.fixed_scale, to.fixed_scale);
        }
        Some(ScalingMode::Cpu) => {
            changes.optional("MinScale", from.min_scale, to.min_scale);
            changes.optional("MaxScale", from.max_scale, to.max_scale);
            changes.optional("ScaleInThreshold", from.scale_in_threshold, to.scale_in_threshold);
            changes.optional("ScaleOutThreshold", from.scale_out_threshold, to.scale_out_threshold);
        }
        None => {}
    }

    if !options.skip_image {
        changes.text("Image", &from.image, &to.image);
    }
    changes.text("Cmd", &from.cmd, &to.cmd);
    changes.text("RegistryUsername", &from.registry_username, &to.registry_username);

    let from_ports = index_ports(from, "current")?;
    let to_ports = index_ports(to, "desired")?;

    for (target, to_port) in &to_ports {
        let Some(from_port) = from_ports.get(target) else {
            changes.push(format!("ExposedPort add: {target}"));
            continue;
        };
        let field = |name: &str| format!("ExposedPorts[{target}].{name}");
        changes.optional(&field("LoadBalancerPort"), from_port.load_balancer_port, to_port.load_balancer_port);
        changes.scalar(&field("UseLetsEncrypt"), from_port.use_lets_encrypt, to_port.use_lets_encrypt);
        changes.text(&field("Hosts"), &from_port.hosts, &to_port.hosts);
        changes.text(&field("HealthCheckPath"), &from_port.health_check_path, &to_port.health_check_path);
        changes.scalar(
            &field("HealthCheckInterval"),
            from_port.health_check_interval,
            to_port.health_check_interval,
        );
        changes.scalar(
            &field("HealthCheckTimeout"),
            from_port.health_check_timeout,
            to_port.health_check_timeout,
        );
    }
    for target in from_ports.keys() {
        if !to_ports.contains_key(target) {
            changes.push(format!("ExposedPort remove: {target}"));
        }
    }

    Ok(changes.into_vec())
}

/// Renders a spec as the change list of a freshly created application.
#[must_use]
pub fn describe(spec: &NormalizedSpec) -> Vec<String> {
    let mut lines = vec![
        format!("CPU: {}", spec.cpu),
        format!("Memory: {}", spec.memory),
        format!("ScalingMode: {}", spec.scaling_mode),
    ];

    match ScalingMode::parse(&spec.scaling_mode) {
        Some(ScalingMode::Manual) => lines.push(format!("FixedScale: {}", show_opt(spec.fixed_scale))),
        Some(ScalingMode::Cpu) => {
            lines.push(format!(
                "MinScale: {}, MaxScale: {}",
                show_opt(spec.min_scale),
                show_opt(spec.max_scale)
            ));
            if spec.scale_in_threshold.is_some() || spec.scale_out_threshold.is_some() {
                lines.push(format!(
                    "ScaleInThreshold: {}, ScaleOutThreshold: {}",
                    show_opt(spec.scale_in_threshold),
                    show_opt(spec.scale_out_threshold)
                ));
            }
        }
        None => {}
    }

    lines.push(format!("Image: {}", spec.image));
    if !spec.cmd.is_empty() {
        lines.push(format!("Cmd: {}", spec.cmd));
    }
    if !spec.registry_username.is_empty() {
        lines.push(format!("RegistryUsername: {}", spec.registry_username));
    }
    if !spec.exposed_ports.is_empty() {
        let ports: Vec<String> = spec
            .exposed_ports
            .iter()
            .map(|p| p.target_port.to_string())
            .collect();
        lines.push(format!("ExposedPorts: {}", ports.join(", ")));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthCheckConfig;

    fn desired() -> ApplicationSpec {
        ApplicationSpec {
            cpu: 500,
            memory: 1024,
            scaling_mode: "manual".to_string(),
            fixed_scale: Some(1),
            image: "nginx:latest".to_string(),
            cmd: vec!["nginx".to_string(), "-g".to_string()],
            exposed_ports: vec![
                ExposedPortConfig {
                    target_port: 443,
                    load_balancer_port: Some(443),
                    use_lets_encrypt: true,
                    host: vec!["b.example.com".to_string(), "a.example.com".to_string()],
                    health_check: Some(HealthCheckConfig {
                        path: "/healthz".to_string(),
                        interval_seconds: 10,
                        timeout_seconds: 3,
                    }),
                },
                ExposedPortConfig {
                    target_port: 80,
                    load_balancer_port: None,
                    use_lets_encrypt: false,
                    host: vec![],
                    health_check: None,
                },
            ],
            ..ApplicationSpec::default()
        }
    }

    #[test]
    fn test_compare_with_self_is_empty() {
        let spec = NormalizedSpec::from(&desired());
        assert!(compare(&spec, &spec, CompareOptions::versions()).expect("compare").is_empty());
    }

    #[test]
    fn test_normalization_sorts_ports_and_hosts() {
        let spec = NormalizedSpec::from(&desired());
        assert_eq!(spec.exposed_ports[0].target_port, 80);
        assert_eq!(spec.exposed_ports[1].hosts, "a.example.com,b.example.com");
        assert_eq!(spec.cmd, "nginx -g");
    }

    #[test]
    fn test_cpu_change_is_single_line() {
        let live = NormalizedSpec::from(&desired());
        let mut wanted = desired();
        wanted.cpu = 1000;

        let changes = compare(&live, &NormalizedSpec::from(&wanted), CompareOptions::planning()).expect("compare");
        assert_eq!(changes, vec!["CPU: 500 -> 1000"]);
    }

    #[test]
    fn test_memory_change_format() {
        let live = NormalizedSpec::from(&desired());
        let mut wanted = desired();
        wanted.memory = 2048;

        let changes = compare(&live, &NormalizedSpec::from(&wanted), CompareOptions::planning()).expect("compare");
        assert_eq!(changes, vec!["Memory: 1024 -> 2048"]);
    }

    #[test]
    fn test_image_skipped_when_planning() {
        let live = NormalizedSpec::from(&desired());
        let mut wanted = desired();
        wanted.image = "nginx:1.27".to_string();
        let wanted = NormalizedSpec::from(&wanted);

        assert!(compare(&live, &wanted, CompareOptions::planning()).expect("compare").is_empty());
        assert_eq!(
            compare(&live, &wanted, CompareOptions::versions()).expect("compare"),
            vec!["Image: nginx:latest -> nginx:1.27"]
        );
    }

    #[test]
    fn test_scaling_fields_follow_target_mode() {
        let live = NormalizedSpec::from(&desired());
        let mut wanted = desired();
        wanted.min_scale = Some(2);
        // Bounds are ignored while the target is manual.
        assert!(
            compare(&live, &NormalizedSpec::from(&wanted), CompareOptions::planning())
                .expect("compare")
                .is_empty()
        );

        wanted.scaling_mode = "cpu".to_string();
        wanted.max_scale = Some(5);
        let changes = compare(&live, &NormalizedSpec::from(&wanted), CompareOptions::planning()).expect("compare");
        assert_eq!(
            changes,
            vec![
                "ScalingMode: manual -> cpu",
                "MinScale: (unset) -> 2",
                "MaxScale: (unset) -> 5",
            ]
        );
    }

    #[test]
    fn test_port_add_remove_and_field_change() {
        let live = NormalizedSpec::from(&desired());
        let mut wanted = desired();
        wanted.exposed_ports.remove(1);
        wanted.exposed_ports[0].load_balancer_port = None;
        wanted.exposed_ports.push(ExposedPortConfig {
            target_port: 8080,
            load_balancer_port: None,
            use_lets_encrypt: false,
            host: vec![],
            health_check: None,
        });

        let changes = compare(&live, &NormalizedSpec::from(&wanted), CompareOptions::planning()).expect("compare");
        assert_eq!(
            changes,
            vec![
                "ExposedPorts[443].LoadBalancerPort: 443 -> (unset)",
                "ExposedPort add: 8080",
                "ExposedPort remove: 80",
            ]
        );
    }

    #[test]
    fn test_duplicate_ports_fail_comparison() {
        let mut wanted = desired();
        wanted.exposed_ports[1].target_port = 443;
        let live = NormalizedSpec::from(&desired());

        let result = compare(&live, &NormalizedSpec::from(&wanted), CompareOptions::planning());
        assert!(matches!(
            result,
            Err(ProvisionerError::Plan(PlanError::ComparisonFailed { .. }))
        ));
    }

    #[test]
    fn test_describe_manual_spec() {
        let lines = describe(&NormalizedSpec::from(&desired()));
        assert_eq!(lines[0], "CPU: 500");
        assert!(lines.contains(&"FixedScale: 1".to_string()));
        assert!(lines.contains(&"ExposedPorts: 80, 443".to_string()));
    }
}
