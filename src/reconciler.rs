//! Reconciler tying observation, planning and execution together.
//!
//! Each call resolves the cluster by name and reads whatever live state it
//! needs; nothing is cached between calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::apprun::{
    Application, ApplicationVersion, AutoScalingGroup, ClusterObserver, Gateway, LoadBalancer,
    PollSettings, ResourceProvisioner,
};
use crate::config::{
    ApplicationConfig, ApplicationSpec, AsgInterfaceConfig, AutoScalingGroupConfig, ClusterConfig,
    ClusterSettings, EnvVarConfig, ExposedPortConfig, HealthCheckConfig, IpRangeConfig,
    LbInterfaceConfig, LoadBalancerConfig,
};
use crate::error::{ResolveError, Result};
use crate::ledger::LedgerStore;
use crate::planner::{
    ApplyOptions, CompareOptions, DiffEngine, ExecutionResult, NormalizedSpec, Plan, PlanExecutor,
    Planner, compare,
};

/// One version in a [`VersionList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Version number.
    pub version: i32,
    /// Container image.
    pub image: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Nodes currently running this version.
    pub active_nodes: i64,
    /// Whether this is the active version.
    pub is_active: bool,
}

/// Every version of an application, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionList {
    /// Application name.
    pub application_name: String,
    /// Application ID.
    pub application_id: Uuid,
    /// Versions, newest first.
    pub versions: Vec<VersionInfo>,
    /// Active version, if any.
    pub active_version: Option<i32>,
    /// Highest version number, if any.
    pub latest_version: Option<i32>,
}

impl fmt::Display for VersionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.versions.is_empty() {
            return write!(f, "Application {} has no versions", self.application_name);
        }
        writeln!(f, "Versions of {}:", self.application_name)?;
        for v in &self.versions {
            let marker = if v.is_active { "*" } else { " " };
            writeln!(
                f,
                "{marker} {:>4}  {}  {}  nodes={}",
                v.version,
                v.created.format("%Y-%m-%d %H:%M:%S"),
                v.image,
                v.active_nodes
            )?;
        }
        Ok(())
    }
}

/// Differences between two versions of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    /// Application name.
    pub application_name: String,
    /// Base version.
    pub from: i32,
    /// Compared version.
    pub to: i32,
    /// Human-readable changes.
    pub changes: Vec<String>,
    /// Whether either side has secret variables, which cannot be compared.
    pub has_secret_env: bool,
    /// Whether either side uses a registry password, which cannot be compared.
    pub has_registry_password: bool,
}

impl fmt::Display for VersionDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: version {} -> {}", self.application_name, self.from, self.to)?;
        if self.changes.is_empty() {
            writeln!(f, "  No differences")?;
        }
        for change in &self.changes {
            writeln!(f, "  {change}")?;
        }
        if self.has_secret_env {
            writeln!(f, "Note: secret environment variable values cannot be compared")?;
        }
        if self.has_registry_password {
            writeln!(f, "Note: registry passwords cannot be compared")?;
        }
        Ok(())
    }
}

/// Reconciler for an `AppRun` Dedicated cluster.
#[derive(Debug)]
pub struct Reconciler<'a, G: Gateway + ?Sized, L: LedgerStore + ?Sized> {
    /// Gateway to the control plane.
    gateway: &'a G,
    /// Secret-version ledger storage.
    ledger_store: &'a L,
    /// Deletion polling used during apply.
    poll: PollSettings,
}

impl<'a, G: Gateway + ?Sized, L: LedgerStore + ?Sized> Reconciler<'a, G, L> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(gateway: &'a G, ledger_store: &'a L) -> Self {
        Self {
            gateway,
            ledger_store,
            poll: PollSettings::default(),
        }
    }

    /// Sets the deletion polling behavior.
    #[must_use]
    pub const fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    const fn observer(&self) -> ClusterObserver<'a, G> {
        ClusterObserver::new(self.gateway)
    }

    /// Computes the plan for a desired configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded, the cluster cannot
    /// be observed or a spec cannot be compared.
    pub async fn plan(&self, desired: &ClusterConfig) -> Result<Plan> {
        let ledger = self.ledger_store.load().await?;
        let live = self.observer().observe(&desired.cluster_name).await?;
        Planner::new(&ledger).plan(desired, &live)
    }

    /// Applies a previously computed plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded or saved, or if any
    /// stage fails.
    pub async fn apply(&self, desired: &ClusterConfig, plan: &Plan, options: ApplyOptions) -> Result<ExecutionResult> {
        let mut ledger = self.ledger_store.load().await?;
        PlanExecutor::new(self.gateway)
            .with_poll(self.poll)
            .with_options(options)
            .execute(desired, plan, &mut ledger, self.ledger_store)
            .await
    }

    async fn resolve_application(&self, cluster_name: &str, app_name: &str) -> Result<Application> {
        let observer = self.observer();
        let cluster = observer.resolve_cluster(cluster_name).await?;
        observer.find_application(cluster.id, app_name).await
    }

    /// Lists every version of an application.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster or application cannot be resolved.
    pub async fn list_versions(&self, cluster_name: &str, app_name: &str) -> Result<VersionList> {
        let application = self.resolve_application(cluster_name, app_name).await?;
        let summaries = self.observer().list_versions(application.application_id).await?;

        let mut versions: Vec<VersionInfo> = summaries
            .into_iter()
            .map(|s| VersionInfo {
                version: s.version,
                image: s.image,
                created: DateTime::from_timestamp(s.created, 0).unwrap_or_default(),
                active_nodes: s.active_node_count,
                is_active: application.active_version == Some(s.version),
            })
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));

        Ok(VersionList {
            application_name: application.name,
            application_id: application.application_id,
            latest_version: versions.first().map(|v| v.version),
            versions,
            active_version: application.active_version,
        })
    }

    /// Compares two versions of an application.
    ///
    /// `from` defaults to the active version and `to` to the latest one.
    ///
    /// # Errors
    ///
    /// Returns an error if a default cannot be resolved or a requested
    /// version does not exist.
    pub async fn version_diff(
        &self,
        cluster_name: &str,
        app_name: &str,
        from: Option<i32>,
        to: Option<i32>,
    ) -> Result<VersionDiff> {
        let application = self.resolve_application(cluster_name, app_name).await?;
        let observer = self.observer();
        let numbers: Vec<i32> = observer
            .list_versions(application.application_id)
            .await?
            .iter()
            .map(|v| v.version)
            .collect();

        let from = from
            .or(application.active_version)
            .ok_or_else(|| ResolveError::NoActiveVersion {
                application: app_name.to_string(),
            })?;
        let to = to
            .or_else(|| numbers.iter().max().copied())
            .ok_or_else(|| ResolveError::NoVersions {
                application: app_name.to_string(),
            })?;

        let before = self.fetch_version(&application, &numbers, from).await?;
        let after = self.fetch_version(&application, &numbers, to).await?;

        let mut changes = compare(
            &NormalizedSpec::from(&before),
            &NormalizedSpec::from(&after),
            CompareOptions::versions(),
        )?;
        let (env_changes, has_secret_env) = DiffEngine::new().version_env_changes(&before.env, &after.env);
        changes.extend(env_changes);

        let uses_registry = |v: &ApplicationVersion| v.registry_username.as_deref().is_some_and(|u| !u.is_empty());

        Ok(VersionDiff {
            application_name: application.name.clone(),
            from,
            to,
            changes,
            has_secret_env,
            has_registry_password: uses_registry(&before) || uses_registry(&after),
        })
    }

    async fn fetch_version(&self, application: &Application, numbers: &[i32], version: i32) -> Result<ApplicationVersion> {
        if !numbers.contains(&version) {
            return Err(ResolveError::VersionNotFound {
                application: application.name.clone(),
                version,
            }
            .into());
        }
        self.gateway
            .get_application_version(application.application_id, version)
            .await
    }

    /// Activates a version, defaulting to the latest one.
    ///
    /// # Errors
    ///
    /// Returns an error if the version does not exist or activation fails.
    pub async fn activate_version(&self, cluster_name: &str, app_name: &str, version: Option<i32>) -> Result<i32> {
        let application = self.resolve_application(cluster_name, app_name).await?;
        let numbers: Vec<i32> = self
            .observer()
            .list_versions(application.application_id)
            .await?
            .iter()
            .map(|v| v.version)
            .collect();

        let version = match version {
            Some(v) if numbers.contains(&v) => v,
            Some(v) => {
                return Err(ResolveError::VersionNotFound {
                    application: application.name,
                    version: v,
                }
                .into());
            }
            None => numbers
                .iter()
                .max()
                .copied()
                .ok_or_else(|| ResolveError::NoVersions {
                    application: application.name.clone(),
                })?,
        };

        ResourceProvisioner::new(self.gateway)
            .activate_version(application.application_id, &application.name, version)
            .await?;
        Ok(version)
    }

    /// Reconstructs a configuration from the live cluster.
    ///
    /// Secret values and registry passwords are never included. Applications
    /// whose latest version cannot be read are left out with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster or its infrastructure cannot be read.
    pub async fn dump_cluster_config(&self, cluster_name: &str) -> Result<ClusterConfig> {
        info!("Dumping configuration of cluster {cluster_name}");
        let observer = self.observer();
        let cluster = observer.resolve_cluster(cluster_name).await?;
        let detail = self.gateway.get_cluster(cluster.id).await?;

        let asgs = observer.list_auto_scaling_groups(cluster.id).await?;
        let mut load_balancers = Vec::new();
        for asg in &asgs {
            for lb in observer
                .list_load_balancers(cluster.id, asg.auto_scaling_group_id)
                .await?
            {
                load_balancers.push(lb_config(&lb, &asg.name));
            }
        }

        let mut applications = Vec::new();
        for application in observer.list_applications(cluster.id).await? {
            match observer.latest_version(application.application_id).await {
                Ok(Some(version)) => applications.push(ApplicationConfig {
                    name: application.name,
                    spec: application_spec(&version),
                }),
                Ok(None) => warn!("Skipping application {}: no versions exist", application.name),
                Err(e) => warn!("Skipping application {}: {e}", application.name),
            }
        }

        Ok(ClusterConfig {
            cluster_name: cluster.name,
            cluster: Some(ClusterSettings {
                lets_encrypt_email: None,
                service_principal_id: detail.service_principal_id,
            }),
            auto_scaling_groups: asgs.iter().map(asg_config).collect(),
            load_balancers,
            applications,
        })
    }
}

fn ip_pool(pool: &[crate::apprun::IpRange]) -> Vec<IpRangeConfig> {
    pool.iter()
        .map(|r| IpRangeConfig {
            start: r.start.clone(),
            end: r.end.clone(),
        })
        .collect()
}

fn asg_config(asg: &AutoScalingGroup) -> AutoScalingGroupConfig {
    AutoScalingGroupConfig {
        name: asg.name.clone(),
        zone: asg.zone.clone(),
        worker_service_class_path: asg.worker_service_class_path.clone(),
        min_nodes: asg.min_nodes,
        max_nodes: asg.max_nodes,
        name_servers: asg.name_servers.clone(),
        interfaces: asg
            .interfaces
            .iter()
            .map(|i| AsgInterfaceConfig {
                interface_index: i.interface_index,
                upstream: i.upstream.clone(),
                connects_to_lb: i.connects_to_lb,
                ip_pool: ip_pool(&i.ip_pool),
                netmask_len: i.netmask_len,
                default_gateway: i.default_gateway.clone(),
                packet_filter_id: i.packet_filter_id.clone(),
            })
            .collect(),
    }
}

fn lb_config(lb: &LoadBalancer, asg_name: &str) -> LoadBalancerConfig {
    LoadBalancerConfig {
        name: lb.name.clone(),
        auto_scaling_group_name: asg_name.to_string(),
        service_class_path: lb.service_class_path.clone(),
        name_servers: lb.name_servers.clone(),
        interfaces: lb
            .interfaces
            .iter()
            .map(|i| LbInterfaceConfig {
                interface_index: i.interface_index,
                upstream: i.upstream.clone(),
                ip_pool: ip_pool(&i.ip_pool),
                netmask_len: i.netmask_len,
                default_gateway: i.default_gateway.clone(),
                vip: i.vip.clone(),
                virtual_router_id: i.virtual_router_id,
                packet_filter_id: i.packet_filter_id.clone(),
            })
            .collect(),
    }
}

fn application_spec(version: &ApplicationVersion) -> ApplicationSpec {
    ApplicationSpec {
        cpu: version.cpu,
        memory: version.memory,
        scaling_mode: version.scaling_mode.clone(),
        fixed_scale: version.fixed_scale,
        min_scale: version.min_scale,
        max_scale: version.max_scale,
        scale_in_threshold: version.scale_in_threshold,
        scale_out_threshold: version.scale_out_threshold,
        image: version.image.clone(),
        cmd: version.cmd.clone(),
        registry_username: version.registry_username.clone().filter(|u| !u.is_empty()),
        registry_password: None,
        registry_password_version: None,
        exposed_ports: version
            .exposed_ports
            .iter()
            .map(|p| ExposedPortConfig {
                target_port: p.target_port,
                load_balancer_port: p.load_balancer_port,
                use_lets_encrypt: p.use_lets_encrypt,
                host: p.host.clone(),
                health_check: p.health_check.as_ref().map(|h| HealthCheckConfig {
                    path: h.path.clone(),
                    interval_seconds: h.interval_seconds,
                    timeout_seconds: h.timeout_seconds,
                }),
            })
            .collect(),
        env: version
            .env
            .iter()
            .map(|e| EnvVarConfig {
                key: e.key.clone(),
                value: if e.secret { None } else { e.value.clone() },
                secret: e.secret,
                secret_version: None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apprun::fake::FakeGateway;
    use crate::apprun::{EnvironmentVariable, ExposedPort};
    use crate::config::ConfigParser;
    use crate::error::ProvisionerError;
    use crate::ledger::MemoryLedgerStore;
    use crate::planner::ActionType;

    fn version(number: i32, image: &str, cpu: i64) -> ApplicationVersion {
        ApplicationVersion {
            version: number,
            cpu,
            memory: 1024,
            scaling_mode: "manual".to_string(),
            fixed_scale: Some(1),
            min_scale: None,
            max_scale: None,
            scale_in_threshold: None,
            scale_out_threshold: None,
            image: image.to_string(),
            cmd: vec![],
            registry_username: None,
            exposed_ports: vec![ExposedPort {
                target_port: 80,
                load_balancer_port: None,
                use_lets_encrypt: false,
                host: vec![],
                health_check: None,
            }],
            env: vec![EnvironmentVariable {
                key: "TOKEN".to_string(),
                value: Some("should-not-leak".to_string()),
                secret: true,
            }],
        }
    }

    #[tokio::test]
    async fn test_plan_and_apply_new_application() {
        let gateway = FakeGateway::new("prod");
        let store = MemoryLedgerStore::new();
        let reconciler = Reconciler::new(&gateway, &store);

        let desired = ConfigParser::new()
            .parse_yaml(
                r"
clusterName: prod
applications:
  - name: web
    spec:
      cpu: 500
      memory: 1024
      scalingMode: manual
      fixedScale: 1
      image: nginx:latest
      registryPasswordVersion: 1
      registryUsername: ci
      registryPassword: hunter2
      exposedPorts:
        - targetPort: 80
",
                None,
            )
            .expect("parse");

        let plan = reconciler.plan(&desired).await.expect("plan");
        assert_eq!(plan.app_actions[0].action, ActionType::Create);
        assert!(
            plan.app_actions[0]
                .changes
                .contains(&"RegistryPasswordVersion: (new) -> 1".to_string())
        );

        reconciler
            .apply(&desired, &plan, ApplyOptions::default())
            .await
            .expect("apply");
        assert_eq!(store.load().await.expect("load").password_version("web"), Some(1));

        let replan = reconciler.plan(&desired).await.expect("replan");
        assert!(!replan.has_changes());
    }

    #[tokio::test]
    async fn test_list_versions_newest_first() {
        let gateway = FakeGateway::new("prod");
        gateway.seed_application("web", &[1, 2, 3]);
        let store = MemoryLedgerStore::new();

        let list = Reconciler::new(&gateway, &store)
            .list_versions("prod", "web")
            .await
            .expect("list");

        let numbers: Vec<i32> = list.versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(list.latest_version, Some(3));
        assert!(list.versions[0].is_active);
        assert_eq!(list.versions[2].created.timestamp(), 1_700_000_001);
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let gateway = FakeGateway::new("prod");
        let store = MemoryLedgerStore::new();

        let err = Reconciler::new(&gateway, &store)
            .list_versions("prod", "missing")
            .await
            .expect_err("missing");
        assert!(matches!(
            err,
            ProvisionerError::Resolve(ResolveError::ApplicationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_version_diff_compares_image_and_flags_secrets() {
        let gateway = FakeGateway::new("prod");
        let app_id = gateway.seed_application("web", &[]);
        gateway.seed_version(app_id, version(1, "nginx:1.25", 500));
        gateway.seed_version(app_id, version(2, "nginx:1.27", 1000));
        let store = MemoryLedgerStore::new();

        let diff = Reconciler::new(&gateway, &store)
            .version_diff("prod", "web", Some(1), None)
            .await
            .expect("diff");

        assert_eq!(diff.to, 2);
        assert_eq!(
            diff.changes,
            vec!["CPU: 500 -> 1000", "Image: nginx:1.25 -> nginx:1.27"]
        );
        assert!(diff.has_secret_env);
        assert!(!diff.has_registry_password);
    }

    #[tokio::test]
    async fn test_version_diff_without_active_version() {
        let gateway = FakeGateway::new("prod");
        gateway.seed_application("web", &[]);
        let store = MemoryLedgerStore::new();

        let err = Reconciler::new(&gateway, &store)
            .version_diff("prod", "web", None, None)
            .await
            .expect_err("no active version");
        assert!(matches!(
            err,
            ProvisionerError::Resolve(ResolveError::NoActiveVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_defaults_to_latest() {
        let gateway = FakeGateway::new("prod");
        gateway.seed_application("web", &[1, 2]);
        let store = MemoryLedgerStore::new();
        let reconciler = Reconciler::new(&gateway, &store);

        let activated = reconciler.activate_version("prod", "web", None).await.expect("activate");
        assert_eq!(activated, 2);
        assert_eq!(gateway.calls(), vec!["activate:web:2"]);

        let err = reconciler
            .activate_version("prod", "web", Some(9))
            .await
            .expect_err("unknown version");
        assert!(matches!(
            err,
            ProvisionerError::Resolve(ResolveError::VersionNotFound { version: 9, .. })
        ));
    }

    #[tokio::test]
    async fn test_dump_omits_secrets_and_skips_empty_applications() {
        let gateway = FakeGateway::new("prod");
        let app_id = gateway.seed_application("web", &[]);
        gateway.seed_version(app_id, version(1, "nginx:1.25", 500));
        gateway.seed_application("empty", &[]);
        let store = MemoryLedgerStore::new();

        let dumped = Reconciler::new(&gateway, &store)
            .dump_cluster_config("prod")
            .await
            .expect("dump");

        assert_eq!(dumped.cluster_name, "prod");
        assert_eq!(dumped.applications.len(), 1);
        let spec = &dumped.applications[0].spec;
        assert_eq!(spec.image, "nginx:1.25");
        assert!(spec.env[0].secret && spec.env[0].value.is_none());

        let yaml = ConfigParser::to_yaml(&dumped).expect("yaml");
        assert!(!yaml.contains("should-not-leak"));
        assert!(yaml.contains("clusterName: prod"));
    }
}
