//! Resource provisioner for `AppRun` resources.
//!
//! This module turns desired configuration into API requests: creating and
//! deleting auto-scaling groups and load balancers (with bounded polling
//! until deletion completes), creating applications and versions, and
//! activating versions.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{
    ApplicationSpec, AsgInterfaceConfig, AutoScalingGroupConfig, ClusterSettings, EnvVarConfig,
    ExposedPortConfig, IpRangeConfig, LbInterfaceConfig, LoadBalancerConfig, ScalingMode,
};
use crate::error::{ApplyError, ProvisionerError, Result};

use super::gateway::Gateway;
use super::types::{
    ApplicationVersion, AsgInterface, CreateApplicationRequest, CreateAutoScalingGroupRequest,
    CreateLoadBalancerRequest, CreateVersionRequest, EnvironmentVariable, ExposedPort,
    HealthCheck, IpRange, LbInterface, RegistryPasswordAction, UpdateApplicationRequest,
    UpdateClusterRequest,
};

/// Default interval between deletion checks in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Default ceiling on deletion polling in seconds.
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// Polling behavior while waiting for asynchronous deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Time between checks.
    pub interval: Duration,
    /// Overall ceiling.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        )
    }
}

impl PollSettings {
    /// Creates poll settings.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Resource provisioner for creating, deleting and activating resources.
#[derive(Debug)]
pub struct ResourceProvisioner<'a, G: Gateway + ?Sized> {
    /// Gateway to the control plane.
    gateway: &'a G,
    /// Deletion polling behavior.
    poll: PollSettings,
}

impl<'a, G: Gateway + ?Sized> ResourceProvisioner<'a, G> {
    /// Creates a new provisioner with default polling.
    #[must_use]
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            poll: PollSettings::default(),
        }
    }

    /// Sets the deletion polling behavior.
    #[must_use]
    pub const fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Updates cluster-level settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn update_cluster(&self, cluster_id: Uuid, settings: &ClusterSettings) -> Result<()> {
        info!("Updating cluster settings: {cluster_id}");
        let request = UpdateClusterRequest {
            service_principal_id: settings.service_principal_id.clone(),
            lets_encrypt_email: settings.lets_encrypt_email.clone(),
        };
        self.gateway.update_cluster(cluster_id, &request).await
    }

    /// Creates an auto-scaling group and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn create_auto_scaling_group(
        &self,
        cluster_id: Uuid,
        config: &AutoScalingGroupConfig,
    ) -> Result<Uuid> {
        info!("Creating auto-scaling group: {}", config.name);
        let id = self
            .gateway
            .create_auto_scaling_group(cluster_id, &Self::build_asg_request(config))
            .await?;
        info!("Created auto-scaling group {} ({id})", config.name);
        Ok(id)
    }

    /// Deletes an auto-scaling group and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete call fails or the group outlives the
    /// polling ceiling.
    pub async fn delete_auto_scaling_group(&self, cluster_id: Uuid, name: &str, asg_id: Uuid) -> Result<()> {
        info!("Deleting auto-scaling group: {name} ({asg_id})");
        self.gateway.delete_auto_scaling_group(cluster_id, asg_id).await?;

        self.wait_until_deleted("auto-scaling group", name, || {
            self.gateway.get_auto_scaling_group(cluster_id, asg_id)
        })
        .await
    }

    /// Creates a load balancer in a group and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn create_load_balancer(
        &self,
        cluster_id: Uuid,
        asg_id: Uuid,
        config: &LoadBalancerConfig,
    ) -> Result<Uuid> {
        info!(
            "Creating load balancer: {} (auto-scaling group {})",
            config.name, config.auto_scaling_group_name
        );
        let id = self
            .gateway
            .create_load_balancer(cluster_id, asg_id, &Self::build_lb_request(config))
            .await?;
        info!("Created load balancer {} ({id})", config.name);
        Ok(id)
    }

    /// Deletes a load balancer and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete call fails or the load balancer
    /// outlives the polling ceiling.
    pub async fn delete_load_balancer(
        &self,
        cluster_id: Uuid,
        asg_id: Uuid,
        name: &str,
        lb_id: Uuid,
    ) -> Result<()> {
        info!("Deleting load balancer: {name} ({lb_id})");
        self.gateway.delete_load_balancer(cluster_id, asg_id, lb_id).await?;

        self.wait_until_deleted("load balancer", name, || {
            self.gateway.get_load_balancer(cluster_id, asg_id, lb_id)
        })
        .await
    }

    /// Creates an application and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn create_application(&self, cluster_id: Uuid, name: &str) -> Result<Uuid> {
        info!("Creating application: {name}");
        self.gateway
            .create_application(&CreateApplicationRequest {
                name: name.to_string(),
                cluster_id,
            })
            .await
    }

    /// Creates a version from the desired spec, inheriting from `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn create_version(
        &self,
        application_id: Uuid,
        name: &str,
        spec: &ApplicationSpec,
        base: Option<&ApplicationVersion>,
    ) -> Result<i32> {
        let request = Self::build_version_request(spec, base);
        let version = self
            .gateway
            .create_application_version(application_id, &request)
            .await?;
        info!("Created version {version} of application {name}");
        Ok(version)
    }

    /// Makes a version the active one.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn activate_version(&self, application_id: Uuid, name: &str, version: i32) -> Result<()> {
        info!("Activating version {version} of application {name}");
        self.gateway
            .update_application(
                application_id,
                &UpdateApplicationRequest {
                    active_version: Some(version),
                },
            )
            .await
    }

    /// Polls `probe` until it fails, meaning the resource is gone.
    ///
    /// Any fetch error counts as deleted, with one exception: an
    /// authentication failure says nothing about the resource and is
    /// returned instead. Dropping the returned future cancels the wait.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::DeletionTimeout`] if the resource is still
    /// readable after the polling ceiling.
    pub async fn wait_until_deleted<T, F, Fut>(&self, resource_type: &str, name: &str, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();

        loop {
            match probe().await {
                Ok(_) => debug!("{resource_type} '{name}' still present"),
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    debug!("{resource_type} '{name}' no longer readable ({e})");
                    info!("Deleted {resource_type}: {name}");
                    return Ok(());
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.poll.timeout {
                warn!("Gave up waiting for {resource_type} '{name}' to be deleted");
                return Err(ProvisionerError::Apply(ApplyError::DeletionTimeout {
                    resource_type: resource_type.to_string(),
                    name: name.to_string(),
                    elapsed_secs: elapsed.as_secs(),
                }));
            }

            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Builds an auto-scaling group creation request.
    #[must_use]
    pub fn build_asg_request(config: &AutoScalingGroupConfig) -> CreateAutoScalingGroupRequest {
        CreateAutoScalingGroupRequest {
            name: config.name.clone(),
            zone: config.zone.clone(),
            worker_service_class_path: config.worker_service_class_path.clone(),
            min_nodes: config.min_nodes,
            max_nodes: config.max_nodes,
            name_servers: config.name_servers.clone(),
            interfaces: config.interfaces.iter().map(asg_interface).collect(),
        }
    }

    /// Builds a load balancer creation request.
    #[must_use]
    pub fn build_lb_request(config: &LoadBalancerConfig) -> CreateLoadBalancerRequest {
        CreateLoadBalancerRequest {
            name: config.name.clone(),
            service_class_path: config.service_class_path.clone(),
            name_servers: config.name_servers.clone(),
            interfaces: config.interfaces.iter().map(lb_interface).collect(),
        }
    }

    /// Builds a version request from the desired spec merged over `base`.
    ///
    /// The image always comes from `base` when there is one. Other fields
    /// come from the desired spec when set and are inherited otherwise.
    /// Scale fields that do not apply to the resulting scaling mode are
    /// dropped. Inherited secret variables never carry values.
    #[must_use]
    pub fn build_version_request(spec: &ApplicationSpec, base: Option<&ApplicationVersion>) -> CreateVersionRequest {
        let image = base.map_or_else(|| spec.image.clone(), |b| b.image.clone());

        let inherit_i64 = |desired: i64, from_base: fn(&ApplicationVersion) -> i64| {
            if desired != 0 {
                desired
            } else {
                base.map_or(0, from_base)
            }
        };
        let inherit_scale = |desired: Option<i32>, from_base: fn(&ApplicationVersion) -> Option<i32>| {
            desired.or_else(|| base.and_then(from_base))
        };

        let scaling_mode = if spec.scaling_mode.is_empty() {
            base.map(|b| b.scaling_mode.clone()).unwrap_or_default()
        } else {
            spec.scaling_mode.clone()
        };

        let mut fixed_scale = inherit_scale(spec.fixed_scale, |b| b.fixed_scale);
        let mut min_scale = inherit_scale(spec.min_scale, |b| b.min_scale);
        let mut max_scale = inherit_scale(spec.max_scale, |b| b.max_scale);
        let mut scale_in_threshold = inherit_scale(spec.scale_in_threshold, |b| b.scale_in_threshold);
        let mut scale_out_threshold = inherit_scale(spec.scale_out_threshold, |b| b.scale_out_threshold);

        match ScalingMode::parse(&scaling_mode) {
            Some(ScalingMode::Manual) => {
                min_scale = None;
                max_scale = None;
                scale_in_threshold = None;
                scale_out_threshold = None;
            }
            Some(ScalingMode::Cpu) => fixed_scale = None,
            None => {}
        }

        let cmd = if spec.cmd.is_empty() {
            base.map(|b| b.cmd.clone()).unwrap_or_default()
        } else {
            spec.cmd.clone()
        };

        let exposed_ports = if spec.exposed_ports.is_empty() {
            base.map(|b| b.exposed_ports.clone()).unwrap_or_default()
        } else {
            spec.exposed_ports.iter().map(exposed_port).collect()
        };

        let env = if spec.env.is_empty() {
            base.map(|b| {
                b.env
                    .iter()
                    .map(|e| EnvironmentVariable {
                        key: e.key.clone(),
                        value: if e.secret { None } else { e.value.clone() },
                        secret: e.secret,
                    })
                    .collect()
            })
            .unwrap_or_default()
        } else {
            spec.env.iter().map(environment_variable).collect()
        };

        let base_username = base
            .and_then(|b| b.registry_username.clone())
            .filter(|u| !u.is_empty());
        let desired_username = spec.registry_username.clone().filter(|u| !u.is_empty());
        let registry_password_action = if spec.registry_password.is_some() {
            RegistryPasswordAction::New
        } else if base_username.is_some() {
            RegistryPasswordAction::Keep
        } else if desired_username.is_some() {
            RegistryPasswordAction::New
        } else {
            RegistryPasswordAction::Remove
        };
        let registry_username = desired_username.or(base_username);
        let registry_password = match registry_password_action {
            RegistryPasswordAction::New => spec.registry_password.clone(),
            RegistryPasswordAction::Keep | RegistryPasswordAction::Remove => None,
        };

        CreateVersionRequest {
            cpu: inherit_i64(spec.cpu, |b| b.cpu),
            memory: inherit_i64(spec.memory, |b| b.memory),
            scaling_mode,
            fixed_scale,
            min_scale,
            max_scale,
            scale_in_threshold,
            scale_out_threshold,
            image,
            cmd,
            registry_username,
            registry_password,
            registry_password_action,
            exposed_ports,
            env,
        }
    }
}

fn ip_pool(pool: &[IpRangeConfig]) -> Vec<IpRange> {
    pool.iter()
        .map(|r| IpRange {
            start: r.start.clone(),
            end: r.end.clone(),
        })
        .collect()
}

fn asg_interface(config: &AsgInterfaceConfig) -> AsgInterface {
    AsgInterface {
        interface_index: config.interface_index,
        upstream: config.upstream.clone(),
        connects_to_lb: config.connects_to_lb,
        ip_pool: ip_pool(&config.ip_pool),
        netmask_len: config.netmask_len,
        default_gateway: config.default_gateway.clone(),
        packet_filter_id: config.packet_filter_id.clone(),
    }
}

fn lb_interface(config: &LbInterfaceConfig) -> LbInterface {
    LbInterface {
        interface_index: config.interface_index,
        upstream: config.upstream.clone(),
        ip_pool: ip_pool(&config.ip_pool),
        netmask_len: config.netmask_len,
        default_gateway: config.default_gateway.clone(),
        vip: config.vip.clone(),
        virtual_router_id: config.virtual_router_id,
        packet_filter_id: config.packet_filter_id.clone(),
    }
}

fn exposed_port(config: &ExposedPortConfig) -> ExposedPort {
    ExposedPort {
        target_port: config.target_port,
        load_balancer_port: config.load_balancer_port,
        use_lets_encrypt: config.use_lets_encrypt,
        host: config.host.clone(),
        health_check: config.health_check.as_ref().map(|h| HealthCheck {
            path: h.path.clone(),
            interval_seconds: h.interval_seconds,
            timeout_seconds: h.timeout_seconds,
        }),
    }
}

fn environment_variable(config: &EnvVarConfig) -> EnvironmentVariable {
    EnvironmentVariable {
        key: config.key.clone(),
        value: config.value.clone(),
        secret: config.secret,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apprun::gateway::MockGateway;
    use crate::apprun::types::AutoScalingGroup;
    use crate::error::ApiError;
    use mockall::Sequence;

    fn fast_poll() -> PollSettings {
        PollSettings::new(Duration::from_millis(5), Duration::from_millis(40))
    }

    fn live_asg(id: Uuid) -> AutoScalingGroup {
        AutoScalingGroup {
            auto_scaling_group_id: id,
            name: "workers".to_string(),
            zone: "is1a".to_string(),
            worker_service_class_path: "w".to_string(),
            min_nodes: 1,
            max_nodes: 2,
            name_servers: vec![],
            interfaces: vec![],
        }
    }

    fn manual_spec() -> ApplicationSpec {
        ApplicationSpec {
            cpu: 500,
            memory: 1024,
            scaling_mode: "manual".to_string(),
            fixed_scale: Some(1),
            image: "nginx:latest".to_string(),
            exposed_ports: vec![ExposedPortConfig {
                target_port: 80,
                load_balancer_port: None,
                use_lets_encrypt: false,
                host: vec![],
                health_check: None,
            }],
            ..ApplicationSpec::default()
        }
    }

    fn base_version() -> ApplicationVersion {
        ApplicationVersion {
            version: 4,
            cpu: 500,
            memory: 1024,
            scaling_mode: "cpu".to_string(),
            fixed_scale: None,
            min_scale: Some(1),
            max_scale: Some(3),
            scale_in_threshold: Some(40),
            scale_out_threshold: Some(80),
            image: "ghcr.io/example/web:1.4".to_string(),
            cmd: vec!["serve".to_string()],
            registry_username: Some("bot".to_string()),
            exposed_ports: vec![],
            env: vec![
                EnvironmentVariable {
                    key: "MODE".to_string(),
                    value: Some("prod".to_string()),
                    secret: false,
                },
                EnvironmentVariable {
                    key: "API_KEY".to_string(),
                    value: Some("leaked".to_string()),
                    secret: true,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_delete_waits_until_not_found() {
        let cluster_id = Uuid::new_v4();
        let asg_id = Uuid::new_v4();
        let mut gateway = MockGateway::new();
        let mut seq = Sequence::new();

        gateway
            .expect_delete_auto_scaling_group()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        gateway
            .expect_get_auto_scaling_group()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, id| Ok(live_asg(id)));
        gateway
            .expect_get_auto_scaling_group()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ApiError::api_error(404, "not found").into()));

        let provisioner = ResourceProvisioner::new(&gateway)
            .with_poll(PollSettings::new(Duration::from_millis(1), Duration::from_secs(5)));
        provisioner
            .delete_auto_scaling_group(cluster_id, "workers", asg_id)
            .await
            .expect("deleted");
    }

    #[tokio::test]
    async fn test_delete_times_out() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete_load_balancer()
            .returning(|_, _, _| Ok(()));
        gateway.expect_get_load_balancer().returning(|_, _, id| {
            Ok(crate::apprun::types::LoadBalancer {
                load_balancer_id: id,
                name: "lb".to_string(),
                service_class_path: String::new(),
                name_servers: vec![],
                interfaces: vec![],
            })
        });

        let err = ResourceProvisioner::new(&gateway)
            .with_poll(fast_poll())
            .delete_load_balancer(Uuid::new_v4(), Uuid::new_v4(), "lb", Uuid::new_v4())
            .await
            .expect_err("should time out");

        assert!(matches!(
            err,
            ProvisionerError::Apply(ApplyError::DeletionTimeout { ref name, .. }) if name == "lb"
        ));
    }

    #[tokio::test]
    async fn test_auth_failure_during_poll_is_fatal() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete_auto_scaling_group()
            .returning(|_, _| Ok(()));
        gateway.expect_get_auto_scaling_group().returning(|_, _| {
            Err(ApiError::AuthenticationFailed {
                message: "expired".to_string(),
            }
            .into())
        });

        let err = ResourceProvisioner::new(&gateway)
            .with_poll(fast_poll())
            .delete_auto_scaling_group(Uuid::new_v4(), "workers", Uuid::new_v4())
            .await
            .expect_err("auth failure");
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_new_version_uses_desired_image() {
        let request = ResourceProvisioner::<MockGateway>::build_version_request(&manual_spec(), None);
        assert_eq!(request.image, "nginx:latest");
        assert_eq!(request.cpu, 500);
        assert_eq!(request.fixed_scale, Some(1));
        assert_eq!(request.registry_password_action, RegistryPasswordAction::Remove);
        assert!(request.registry_username.is_none());
    }

    #[test]
    fn test_update_inherits_image_and_unset_fields() {
        let spec = ApplicationSpec {
            cpu: 1000,
            image: "nginx:2".to_string(),
            ..ApplicationSpec::default()
        };
        let base = base_version();
        let request = ResourceProvisioner::<MockGateway>::build_version_request(&spec, Some(&base));

        assert_eq!(request.image, "ghcr.io/example/web:1.4");
        assert_eq!(request.cpu, 1000);
        assert_eq!(request.memory, 1024);
        assert_eq!(request.scaling_mode, "cpu");
        assert_eq!(request.max_scale, Some(3));
        assert_eq!(request.cmd, vec!["serve"]);
        assert_eq!(request.registry_username.as_deref(), Some("bot"));
        assert_eq!(request.registry_password_action, RegistryPasswordAction::Keep);

        let secret = request.env.iter().find(|e| e.key == "API_KEY").expect("inherited");
        assert!(secret.value.is_none());
        let plain = request.env.iter().find(|e| e.key == "MODE").expect("inherited");
        assert_eq!(plain.value.as_deref(), Some("prod"));
    }

    #[test]
    fn test_switch_to_manual_drops_cpu_scale_fields() {
        let request =
            ResourceProvisioner::<MockGateway>::build_version_request(&manual_spec(), Some(&base_version()));
        assert_eq!(request.fixed_scale, Some(1));
        assert!(request.min_scale.is_none());
        assert!(request.scale_out_threshold.is_none());
    }

    #[test]
    fn test_new_registry_password() {
        let spec = ApplicationSpec {
            registry_username: Some("ci".to_string()),
            registry_password: Some("hunter2".to_string()),
            registry_password_version: Some(2),
            ..manual_spec()
        };
        let request = ResourceProvisioner::<MockGateway>::build_version_request(&spec, Some(&base_version()));
        assert_eq!(request.registry_username.as_deref(), Some("ci"));
        assert_eq!(request.registry_password.as_deref(), Some("hunter2"));
        assert_eq!(request.registry_password_action, RegistryPasswordAction::New);
    }

    #[test]
    fn test_username_without_password_on_first_version() {
        let spec = ApplicationSpec {
            registry_username: Some("ci".to_string()),
            ..manual_spec()
        };
        let request = ResourceProvisioner::<MockGateway>::build_version_request(&spec, None);
        assert_eq!(request.registry_username.as_deref(), Some("ci"));
        assert!(request.registry_password.is_none());
        assert_eq!(request.registry_password_action, RegistryPasswordAction::New);
    }
}
