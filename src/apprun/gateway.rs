//! Remote resource gateway trait.
//!
//! Everything the planner and executor know about the control plane goes
//! through this trait. [`ApiClient`](super::ApiClient) is the HTTP
//! implementation; tests substitute mocks and in-memory fakes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::types::{
    Application, ApplicationVersion, AutoScalingGroup, ClusterDetail, ClusterSummary,
    CreateApplicationRequest, CreateAutoScalingGroupRequest, CreateLoadBalancerRequest,
    CreateVersionRequest, LoadBalancer, LoadBalancerSummary, Page, UpdateApplicationRequest,
    UpdateClusterRequest, VersionSummary,
};

/// Page-level access to `AppRun` Dedicated resources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Lists one page of clusters.
    async fn list_clusters(&self, cursor: Option<String>) -> Result<Page<ClusterSummary>>;

    /// Fetches cluster detail.
    async fn get_cluster(&self, cluster_id: Uuid) -> Result<ClusterDetail>;

    /// Updates cluster settings.
    async fn update_cluster(&self, cluster_id: Uuid, request: &UpdateClusterRequest) -> Result<()>;

    /// Lists one page of auto-scaling groups.
    async fn list_auto_scaling_groups(
        &self,
        cluster_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<AutoScalingGroup>>;

    /// Fetches one auto-scaling group.
    async fn get_auto_scaling_group(&self, cluster_id: Uuid, asg_id: Uuid) -> Result<AutoScalingGroup>;

    /// Creates an auto-scaling group and returns its ID.
    async fn create_auto_scaling_group(
        &self,
        cluster_id: Uuid,
        request: &CreateAutoScalingGroupRequest,
    ) -> Result<Uuid>;

    /// Starts deletion of an auto-scaling group. Deletion completes asynchronously.
    async fn delete_auto_scaling_group(&self, cluster_id: Uuid, asg_id: Uuid) -> Result<()>;

    /// Lists one page of load balancer summaries in a group.
    async fn list_load_balancers(
        &self,
        cluster_id: Uuid,
        asg_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancerSummary>>;

    /// Fetches one load balancer.
    async fn get_load_balancer(&self, cluster_id: Uuid, asg_id: Uuid, lb_id: Uuid) -> Result<LoadBalancer>;

    /// Creates a load balancer and returns its ID.
    async fn create_load_balancer(
        &self,
        cluster_id: Uuid,
        asg_id: Uuid,
        request: &CreateLoadBalancerRequest,
    ) -> Result<Uuid>;

    /// Starts deletion of a load balancer. Deletion completes asynchronously.
    async fn delete_load_balancer(&self, cluster_id: Uuid, asg_id: Uuid, lb_id: Uuid) -> Result<()>;

    /// Lists one page of applications in a cluster.
    async fn list_applications(&self, cluster_id: Uuid, cursor: Option<String>) -> Result<Page<Application>>;

    /// Creates an application and returns its ID.
    async fn create_application(&self, request: &CreateApplicationRequest) -> Result<Uuid>;

    /// Updates an application (activation).
    async fn update_application(&self, application_id: Uuid, request: &UpdateApplicationRequest) -> Result<()>;

    /// Lists one page of versions of an application.
    async fn list_application_versions(
        &self,
        application_id: Uuid,
        cursor: Option<String>,
    ) -> Result<Page<VersionSummary>>;

    /// Fetches one version.
    async fn get_application_version(&self, application_id: Uuid, version: i32) -> Result<ApplicationVersion>;

    /// Creates a version and returns its number.
    async fn create_application_version(
        &self,
        application_id: Uuid,
        request: &CreateVersionRequest,
    ) -> Result<i32>;
}
