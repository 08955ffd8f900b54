//! In-memory gateway used by scenario tests.
//!
//! Deletions take effect immediately; every mutation is appended to a call
//! log so tests can assert apply ordering.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{ApiError, Result};

use super::gateway::Gateway;
use super::types::{
    Application, ApplicationVersion, AutoScalingGroup, ClusterDetail, ClusterSummary,
    CreateApplicationRequest, CreateAutoScalingGroupRequest, CreateLoadBalancerRequest,
    CreateVersionRequest, EnvironmentVariable, LoadBalancer, LoadBalancerSummary, Page, UpdateApplicationRequest,
    UpdateClusterRequest, VersionSummary,
};

#[derive(Default)]
struct FakeState {
    clusters: Vec<ClusterSummary>,
    detail: Option<ClusterDetail>,
    asgs: Vec<AutoScalingGroup>,
    lbs: BTreeMap<Uuid, Vec<LoadBalancer>>,
    apps: Vec<Application>,
    versions: BTreeMap<Uuid, Vec<ApplicationVersion>>,
    version_requests: Vec<(Uuid, CreateVersionRequest)>,
    calls: Vec<String>,
    fail_on: Option<String>,
}

pub struct FakeGateway {
    cluster_id: Uuid,
    page_size: usize,
    state: Mutex<FakeState>,
}

fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: usize) -> Page<T> {
    let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    Page::new(items[start..end].to_vec(), next)
}

fn not_found(what: &str) -> crate::error::ProvisionerError {
    ApiError::api_error(404, format!("{what} not found")).into()
}

impl FakeGateway {
    pub fn new(cluster_name: &str) -> Self {
        let cluster_id = Uuid::new_v4();
        let state = FakeState {
            clusters: vec![ClusterSummary {
                cluster_id,
                name: cluster_name.to_string(),
            }],
            detail: Some(ClusterDetail {
                cluster_id,
                name: cluster_name.to_string(),
                service_principal_id: "sp-1".to_string(),
                has_lets_encrypt_email: false,
            }),
            ..FakeState::default()
        };
        Self {
            cluster_id,
            page_size: 30,
            state: Mutex::new(state),
        }
    }

    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state();
        if state.fail_on.as_deref() == Some(call.as_str()) {
            return Err(ApiError::api_error(500, format!("injected failure: {call}")).into());
        }
        state.calls.push(call);
        Ok(())
    }

    pub const fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }

    pub fn add_cluster(&self, cluster: ClusterSummary) {
        self.state().clusters.push(cluster);
    }

    pub fn set_detail(&self, detail: ClusterDetail) {
        self.state().detail = Some(detail);
    }

    pub fn fail_on(&self, call: &str) {
        self.state().fail_on = Some(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn version_requests(&self) -> Vec<(Uuid, CreateVersionRequest)> {
        self.state().version_requests.clone()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.state().apps.clone()
    }

    pub fn seed_auto_scaling_group(&self, asg: AutoScalingGroup) -> Uuid {
        let id = asg.auto_scaling_group_id;
        self.state().asgs.push(asg);
        id
    }

    pub fn seed_load_balancer(&self, asg_id: Uuid, lb: LoadBalancer) -> Uuid {
        let id = lb.load_balancer_id;
        self.state().lbs.entry(asg_id).or_default().push(lb);
        id
    }

    /// Seeds an application whose versions all share a default manual spec.
    pub fn seed_application(&self, name: &str, versions: &[i32]) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state();
        state.apps.push(Application {
            application_id: id,
            name: name.to_string(),
            cluster_id: self.cluster_id,
            active_version: versions.iter().max().copied(),
        });
        let seeded = versions
            .iter()
            .map(|v| ApplicationVersion {
                version: *v,
                cpu: 500,
                memory: 1024,
                scaling_mode: "manual".to_string(),
                fixed_scale: Some(1),
                min_scale: None,
                max_scale: None,
                scale_in_threshold: None,
                scale_out_threshold: None,
                image: "nginx:latest".to_string(),
                cmd: vec![],
                registry_username: None,
                exposed_ports: vec![],
                env: vec![],
            })
            .collect();
        state.versions.insert(id, seeded);
        id
    }

    pub fn seed_version(&self, application_id: Uuid, version: ApplicationVersion) {
        self.state()
            .versions
            .entry(application_id)
            .or_default()
            .push(version);
    }

    fn asg_name(state: &FakeState, asg_id: Uuid) -> String {
        state
            .asgs
            .iter()
            .find(|a| a.auto_scaling_group_id == asg_id)
            .map_or_else(|| asg_id.to_string(), |a| a.name.clone())
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn list_clusters(&self, cursor: Option<String>) -> Result<Page<ClusterSummary>> {
        Ok(paginate(&self.state().clusters, cursor.as_deref(), self.page_size))
    }

    async fn get_cluster(&self, cluster_id: Uuid) -> Result<ClusterDetail> {
        self.state()
            .detail
            .clone()
            .filter(|d| d.cluster_id == cluster_id)
            .ok_or_else(|| not_found("cluster"))
    }

    async fn update_cluster(&self, _cluster_id: Uuid, request: &UpdateClusterRequest) -> Result<()> {
        self.record(String::from("update_cluster"))?;
        let mut state = self.state();
        if let Some(detail) = state.detail.as_mut() {
            detail.service_principal_id.clone_from(&request.service_principal_id);
            detail.has_lets_encrypt_email = request.lets_encrypt_email.is_some();
        }
        Ok(())
    }

    async fn list_auto_scaling_groups(
        &self,
        _cluster_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<AutoScalingGroup>> {
        Ok(paginate(&self.state().asgs, cursor.as_deref(), self.page_size))
    }

    async fn get_auto_scaling_group(&self, _cluster_id: Uuid, asg_id: Uuid) -> Result<AutoScalingGroup> {
        self.state()
            .asgs
            .iter()
            .find(|a| a.auto_scaling_group_id == asg_id)
            .cloned()
            .ok_or_else(|| not_found("auto-scaling group"))
    }

    async fn create_auto_scaling_group(
        &self,
        _cluster_id: Uuid,
        request: &CreateAutoScalingGroupRequest,
    ) -> Result<Uuid> {
        self.record(format!("create_asg:{}", request.name))?;
        let id = Uuid::new_v4();
        self.state().asgs.push(AutoScalingGroup {
            auto_scaling_group_id: id,
            name: request.name.clone(),
            zone: request.zone.clone(),
            worker_service_class_path: request.worker_service_class_path.clone(),
            min_nodes: request.min_nodes,
            max_nodes: request.max_nodes,
            name_servers: request.name_servers.clone(),
            interfaces: request.interfaces.clone(),
        });
        Ok(id)
    }

    async fn delete_auto_scaling_group(&self, _cluster_id: Uuid, asg_id: Uuid) -> Result<()> {
        let name = Self::asg_name(&self.state(), asg_id);
        self.record(format!("delete_asg:{name}"))?;
        let mut state = self.state();
        state.asgs.retain(|a| a.auto_scaling_group_id != asg_id);
        state.lbs.remove(&asg_id);
        Ok(())
    }

    async fn list_load_balancers(
        &self,
        _cluster_id: Uuid,
        asg_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancerSummary>> {
        let summaries: Vec<LoadBalancerSummary> = self
            .state()
            .lbs
            .get(&asg_id)
            .map(|lbs| {
                lbs.iter()
                    .map(|lb| LoadBalancerSummary {
                        load_balancer_id: lb.load_balancer_id,
                        name: lb.name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(paginate(&summaries, cursor.as_deref(), self.page_size))
    }

    async fn get_load_balancer(&self, _cluster_id: Uuid, asg_id: Uuid, lb_id: Uuid) -> Result<LoadBalancer> {
        self.state()
            .lbs
            .get(&asg_id)
            .and_then(|lbs| lbs.iter().find(|lb| lb.load_balancer_id == lb_id))
            .cloned()
            .ok_or_else(|| not_found("load balancer"))
    }

    async fn create_load_balancer(
        &self,
        _cluster_id: Uuid,
        asg_id: Uuid,
        request: &CreateLoadBalancerRequest,
    ) -> Result<Uuid> {
        self.record(format!("create_lb:{}", request.name))?;
        let id = Uuid::new_v4();
        self.state().lbs.entry(asg_id).or_default().push(LoadBalancer {
            load_balancer_id: id,
            name: request.name.clone(),
            service_class_path: request.service_class_path.clone(),
            name_servers: request.name_servers.clone(),
            interfaces: request.interfaces.clone(),
        });
        Ok(id)
    }

    async fn delete_load_balancer(&self, _cluster_id: Uuid, asg_id: Uuid, lb_id: Uuid) -> Result<()> {
        let name = self
            .state()
            .lbs
            .get(&asg_id)
            .and_then(|lbs| lbs.iter().find(|lb| lb.load_balancer_id == lb_id))
            .map_or_else(|| lb_id.to_string(), |lb| lb.name.clone());
        self.record(format!("delete_lb:{name}"))?;
        if let Some(lbs) = self.state().lbs.get_mut(&asg_id) {
            lbs.retain(|lb| lb.load_balancer_id != lb_id);
        }
        Ok(())
    }

    async fn list_applications(&self, cluster_id: Uuid, cursor: Option<String>) -> Result<Page<Application>> {
        let apps: Vec<Application> = self
            .state()
            .apps
            .iter()
            .filter(|a| a.cluster_id == cluster_id)
            .cloned()
            .collect();
        Ok(paginate(&apps, cursor.as_deref(), self.page_size))
    }

    async fn create_application(&self, request: &CreateApplicationRequest) -> Result<Uuid> {
        self.record(format!("create_app:{}", request.name))?;
        let id = Uuid::new_v4();
        self.state().apps.push(Application {
            application_id: id,
            name: request.name.clone(),
            cluster_id: request.cluster_id,
            active_version: None,
        });
        Ok(id)
    }

    async fn update_application(&self, application_id: Uuid, request: &UpdateApplicationRequest) -> Result<()> {
        let name = self
            .state()
            .apps
            .iter()
            .find(|a| a.application_id == application_id)
            .map(|a| a.name.clone())
            .ok_or_else(|| not_found("application"))?;
        let version = request
            .active_version
            .map_or_else(|| "none".to_string(), |v| v.to_string());
        self.record(format!("activate:{name}:{version}"))?;

        let mut state = self.state();
        if let Some(app) = state.apps.iter_mut().find(|a| a.application_id == application_id) {
            app.active_version = request.active_version;
        }
        Ok(())
    }

    async fn list_application_versions(
        &self,
        application_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<VersionSummary>> {
        let summaries: Vec<VersionSummary> = self
            .state()
            .versions
            .get(&application_id)
            .map(|versions| {
                versions
                    .iter()
                    .map(|v| VersionSummary {
                        version: v.version,
                        image: v.image.clone(),
                        created: 1_700_000_000 + i64::from(v.version),
                        active_node_count: 0,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(paginate(&summaries, cursor.as_deref(), self.page_size))
    }

    async fn get_application_version(&self, application_id: Uuid, version: i32) -> Result<ApplicationVersion> {
        self.state()
            .versions
            .get(&application_id)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .cloned()
            .ok_or_else(|| not_found("version"))
    }

    async fn create_application_version(
        &self,
        application_id: Uuid,
        request: &CreateVersionRequest,
    ) -> Result<i32> {
        let name = self
            .state()
            .apps
            .iter()
            .find(|a| a.application_id == application_id)
            .map_or_else(|| application_id.to_string(), |a| a.name.clone());

        let number = self
            .state()
            .versions
            .get(&application_id)
            .and_then(|versions| versions.iter().map(|v| v.version).max())
            .unwrap_or(0)
            + 1;
        self.record(format!("create_version:{name}:{number}"))?;

        let mut state = self.state();
        state.versions.entry(application_id).or_default().push(ApplicationVersion {
            version: number,
            cpu: request.cpu,
            memory: request.memory,
            scaling_mode: request.scaling_mode.clone(),
            fixed_scale: request.fixed_scale,
            min_scale: request.min_scale,
            max_scale: request.max_scale,
            scale_in_threshold: request.scale_in_threshold,
            scale_out_threshold: request.scale_out_threshold,
            image: request.image.clone(),
            cmd: request.cmd.clone(),
            registry_username: request.registry_username.clone(),
            exposed_ports: request.exposed_ports.clone(),
            env: request
                .env
                .iter()
                .map(|e| EnvironmentVariable {
                    key: e.key.clone(),
                    value: if e.secret { None } else { e.value.clone() },
                    secret: e.secret,
                })
                .collect(),
        });
        state.version_requests.push((application_id, request.clone()));
        Ok(number)
    }
}
