//! Diff engine for comparing desired configuration with live resources.
//!
//! Infrastructure is compared field by field. Secrets cannot be read back
//! from the API, so their changes are judged against the [`SecretLedger`].

use std::collections::BTreeMap;
use tracing::warn;

use crate::apprun::{
    ApplicationVersion, AsgInterface, AutoScalingGroup, ClusterDetail, EnvironmentVariable,
    IpRange, LbInterface, LoadBalancer,
};
use crate::config::{
    ApplicationSpec, AsgInterfaceConfig, AutoScalingGroupConfig, ClusterSettings, EnvVarConfig,
    IpRangeConfig, LbInterfaceConfig, LoadBalancerConfig,
};
use crate::error::Result;
use crate::ledger::SecretLedger;

use super::normalize::{ChangeList, CompareOptions, NormalizedSpec, compare, describe};

/// Diff engine for computing resource changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

fn list(values: &[String]) -> String {
    format!("[{}]", values.join(", "))
}

fn same_pool(desired: &[IpRangeConfig], live: &[IpRange]) -> bool {
    desired.len() == live.len()
        && desired
            .iter()
            .zip(live)
            .all(|(d, l)| d.start == l.start && d.end == l.end)
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Renders an auto-scaling group that is about to be created.
    #[must_use]
    pub fn describe_asg(&self, desired: &AutoScalingGroupConfig) -> Vec<String> {
        let mut lines = vec![
            format!("Zone: {}", desired.zone),
            format!("WorkerServiceClassPath: {}", desired.worker_service_class_path),
            format!("MinNodes: {}, MaxNodes: {}", desired.min_nodes, desired.max_nodes),
        ];
        if !desired.name_servers.is_empty() {
            lines.push(format!("NameServers: {}", list(&desired.name_servers)));
        }
        lines.push(format!("Interfaces: {} configured", desired.interfaces.len()));
        lines
    }

    /// Compares a live auto-scaling group with its desired configuration.
    #[must_use]
    pub fn asg_changes(&self, live: &AutoScalingGroup, desired: &AutoScalingGroupConfig) -> Vec<String> {
        let mut changes = ChangeList::default();
        changes.text("Zone", &live.zone, &desired.zone);
        changes.text(
            "WorkerServiceClassPath",
            &live.worker_service_class_path,
            &desired.worker_service_class_path,
        );
        changes.scalar("MinNodes", live.min_nodes, desired.min_nodes);
        changes.scalar("MaxNodes", live.max_nodes, desired.max_nodes);
        if live.name_servers != desired.name_servers {
            changes.push(format!(
                "NameServers: {} -> {}",
                list(&live.name_servers),
                list(&desired.name_servers)
            ));
        }

        if live.interfaces.len() == desired.interfaces.len() {
            for wanted in &desired.interfaces {
                let found = live
                    .interfaces
                    .iter()
                    .find(|i| i.interface_index == wanted.interface_index);
                Self::asg_interface_changes(&mut changes, found, wanted);
            }
        } else {
            changes.push(format!(
                "Interfaces count: {} -> {}",
                live.interfaces.len(),
                desired.interfaces.len()
            ));
        }

        changes.into_vec()
    }

    fn asg_interface_changes(changes: &mut ChangeList, live: Option<&AsgInterface>, desired: &AsgInterfaceConfig) {
        let index = desired.interface_index;
        let Some(live) = live else {
            changes.push(format!("Interface[{index}]: new interface"));
            return;
        };
        let field = |name: &str| format!("Interface[{index}].{name}");

        changes.text(&field("Upstream"), &live.upstream, &desired.upstream);
        changes.scalar(&field("ConnectsToLB"), live.connects_to_lb, desired.connects_to_lb);
        changes.optional(&field("NetmaskLen"), live.netmask_len, desired.netmask_len);
        changes.optional_text(
            &field("DefaultGateway"),
            live.default_gateway.as_deref(),
            desired.default_gateway.as_deref(),
        );
        changes.optional_text(
            &field("PacketFilterID"),
            live.packet_filter_id.as_deref(),
            desired.packet_filter_id.as_deref(),
        );
        if !same_pool(&desired.ip_pool, &live.ip_pool) {
            changes.push(format!("Interface[{index}].IpPool: changed"));
        }
    }

    /// Renders a load balancer that is about to be created.
    #[must_use]
    pub fn describe_lb(&self, desired: &LoadBalancerConfig) -> Vec<String> {
        let mut lines = vec![
            format!("AutoScalingGroup: {}", desired.auto_scaling_group_name),
            format!("ServiceClassPath: {}", desired.service_class_path),
        ];
        if !desired.name_servers.is_empty() {
            lines.push(format!("NameServers: {}", list(&desired.name_servers)));
        }
        lines.push(format!("Interfaces: {} configured", desired.interfaces.len()));
        lines
    }

    /// Compares a live load balancer with its desired configuration.
    #[must_use]
    pub fn lb_changes(&self, live: &LoadBalancer, desired: &LoadBalancerConfig) -> Vec<String> {
        let mut changes = ChangeList::default();
        changes.text("ServiceClassPath", &live.service_class_path, &desired.service_class_path);
        if live.name_servers != desired.name_servers {
            changes.push(format!(
                "NameServers: {} -> {}",
                list(&live.name_servers),
                list(&desired.name_servers)
            ));
        }

        if live.interfaces.len() == desired.interfaces.len() {
            for wanted in &desired.interfaces {
                let found = live
                    .interfaces
                    .iter()
                    .find(|i| i.interface_index == wanted.interface_index);
                Self::lb_interface_changes(&mut changes, found, wanted);
            }
        } else {
            changes.push(format!(
                "Interfaces count: {} -> {}",
                live.interfaces.len(),
                desired.interfaces.len()
            ));
        }

        changes.into_vec()
    }

    fn lb_interface_changes(changes: &mut ChangeList, live: Option<&LbInterface>, desired: &LbInterfaceConfig) {
        let index = desired.interface_index;
        let Some(live) = live else {
            changes.push(format!("Interface[{index}]: new interface"));
            return;
        };
        let field = |name: &str| format!("Interface[{index}].{name}");

        changes.text(&field("Upstream"), &live.upstream, &desired.upstream);
        changes.optional(&field("NetmaskLen"), live.netmask_len, desired.netmask_len);
        changes.optional_text(
            &field("DefaultGateway"),
            live.default_gateway.as_deref(),
            desired.default_gateway.as_deref(),
        );
        changes.optional_text(&field("Vip"), live.vip.as_deref(), desired.vip.as_deref());
        changes.optional(&field("VirtualRouterID"), live.virtual_router_id, desired.virtual_router_id);
        changes.optional_text(
            &field("PacketFilterID"),
            live.packet_filter_id.as_deref(),
            desired.packet_filter_id.as_deref(),
        );
        if !same_pool(&desired.ip_pool, &live.ip_pool) {
            changes.push(format!("Interface[{index}].IpPool: changed"));
        }
    }

    /// Compares live cluster detail with the desired settings.
    ///
    /// The API only reports whether an email is set, never its value.
    #[must_use]
    pub fn cluster_settings_changes(&self, live: &ClusterDetail, desired: &ClusterSettings) -> Vec<String> {
        let mut changes = ChangeList::default();

        match (live.has_lets_encrypt_email, desired.lets_encrypt_email.as_deref()) {
            (false, Some(email)) => changes.push(format!("LetsEncryptEmail: (unset) -> {email}")),
            (true, None) => changes.push("LetsEncryptEmail: (set) -> (unset)"),
            (true, Some(email)) => changes.push(format!(
                "LetsEncryptEmail: (set) -> {email} (value comparison not possible)"
            )),
            (false, None) => {}
        }
        if live.service_principal_id != desired.service_principal_id {
            changes.push(format!(
                "ServicePrincipalID: {} -> {}",
                live.service_principal_id, desired.service_principal_id
            ));
        }

        changes.into_vec()
    }

    /// Compares the desired environment with the live one.
    ///
    /// Secret entries are judged by the ledger version rather than by value.
    #[must_use]
    pub fn env_changes(
        &self,
        app: &str,
        live: &[EnvironmentVariable],
        desired: &[EnvVarConfig],
        ledger: &SecretLedger,
    ) -> Vec<String> {
        let live_by_key: BTreeMap<&str, &EnvironmentVariable> =
            live.iter().map(|e| (e.key.as_str(), e)).collect();
        let mut changes = Vec::new();

        for wanted in desired {
            let Some(current) = live_by_key.get(wanted.key.as_str()) else {
                changes.push(Self::env_add(wanted));
                continue;
            };

            if wanted.secret {
                let Some(version) = wanted.secret_version else {
                    continue;
                };
                match ledger.secret_env_version(app, &wanted.key) {
                    None => changes.push(format!(
                        "Env update: {} (secret, version: new -> {version})",
                        wanted.key
                    )),
                    Some(stored) if stored != version => changes.push(format!(
                        "Env update: {} (secret, version: {stored} -> {version})",
                        wanted.key
                    )),
                    Some(_) => {}
                }
            } else if current.secret {
                changes.push(format!(
                    "Env update: {}=(secret) -> {}",
                    wanted.key,
                    wanted.value.as_deref().unwrap_or_default()
                ));
            } else if current.value != wanted.value {
                changes.push(format!(
                    "Env update: {}={} -> {}",
                    wanted.key,
                    current.value.as_deref().unwrap_or_default(),
                    wanted.value.as_deref().unwrap_or_default()
                ));
            }
        }

        for current in live {
            if !desired.iter().any(|d| d.key == current.key) {
                if current.secret {
                    changes.push(format!("Env remove: {} (secret)", current.key));
                } else {
                    changes.push(format!("Env remove: {}", current.key));
                }
            }
        }

        changes
    }

    fn env_add(wanted: &EnvVarConfig) -> String {
        if wanted.secret {
            format!("Env add: {} (secret)", wanted.key)
        } else if let Some(value) = &wanted.value {
            format!("Env add: {}={value}", wanted.key)
        } else {
            format!("Env add: {}", wanted.key)
        }
    }

    /// Compares the desired registry password version with the ledger.
    #[must_use]
    pub fn registry_password_change(&self, app: &str, desired: Option<i64>, ledger: &SecretLedger) -> Option<String> {
        match (ledger.password_version(app), desired) {
            (None, Some(version)) => Some(format!("RegistryPasswordVersion: (new) -> {version}")),
            (Some(stored), Some(version)) if stored != version => {
                Some(format!("RegistryPasswordVersion: {stored} -> {version}"))
            }
            (Some(stored), None) => {
                warn!(
                    "Application {app}: registryPasswordVersion omitted but version {stored} was applied; it will be removed from the ledger"
                );
                Some(format!("RegistryPasswordVersion: {stored} -> (removed)"))
            }
            _ => None,
        }
    }

    /// Compares the environments of two live versions.
    ///
    /// Pairs where either side is secret cannot be compared and are
    /// skipped. The flag reports whether any secret entry was seen.
    #[must_use]
    pub fn version_env_changes(
        &self,
        from: &[EnvironmentVariable],
        to: &[EnvironmentVariable],
    ) -> (Vec<String>, bool) {
        let has_secret = from.iter().chain(to).any(|e| e.secret);
        let from_by_key: BTreeMap<&str, &EnvironmentVariable> =
            from.iter().map(|e| (e.key.as_str(), e)).collect();
        let mut changes = Vec::new();

        for after in to {
            match from_by_key.get(after.key.as_str()) {
                None if after.secret => changes.push(format!("Env add: {} (secret)", after.key)),
                None => changes.push(format!(
                    "Env add: {}={}",
                    after.key,
                    after.value.as_deref().unwrap_or_default()
                )),
                Some(before) if before.secret || after.secret => {}
                Some(before) if before.value != after.value => changes.push(format!(
                    "Env update: {}={} -> {}",
                    after.key,
                    before.value.as_deref().unwrap_or_default(),
                    after.value.as_deref().unwrap_or_default()
                )),
                Some(_) => {}
            }
        }
        for before in from {
            if !to.iter().any(|e| e.key == before.key) {
                if before.secret {
                    changes.push(format!("Env remove: {} (secret)", before.key));
                } else {
                    changes.push(format!("Env remove: {}", before.key));
                }
            }
        }

        (changes, has_secret)
    }

    /// Renders an application that is about to be created.
    #[must_use]
    pub fn describe_application(&self, app: &str, desired: &ApplicationSpec, ledger: &SecretLedger) -> Vec<String> {
        let mut lines = describe(&NormalizedSpec::from(desired));
        lines.extend(desired.env.iter().map(Self::env_add));
        if let Some(change) = self.registry_password_change(app, desired.registry_password_version, ledger) {
            lines.push(change);
        }
        lines
    }

    /// Compares the latest live version of an application with its desired spec.
    ///
    /// The image is inherited on update and therefore not compared.
    ///
    /// # Errors
    ///
    /// Returns an error if the specs cannot be compared.
    pub fn application_changes(
        &self,
        app: &str,
        live: &ApplicationVersion,
        desired: &ApplicationSpec,
        ledger: &SecretLedger,
    ) -> Result<Vec<String>> {
        let mut changes = compare(
            &NormalizedSpec::from(live),
            &NormalizedSpec::from(desired),
            CompareOptions::planning(),
        )?;
        changes.extend(self.env_changes(app, &live.env, &desired.env, ledger));
        if let Some(change) = self.registry_password_change(app, desired.registry_password_version, ledger) {
            changes.push(change);
        }
        Ok(changes)
    }
}
