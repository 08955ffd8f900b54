//! `AppRun` Dedicated API integration module.
//!
//! This module provides everything that talks to the control plane: the
//! [`Gateway`] trait and its HTTP client, the observer that snapshots live
//! state, and the provisioner that creates, deletes and activates resources.

mod client;
mod types;
mod gateway;
mod observer;
mod provisioner;
#[cfg(test)]
pub(crate) mod fake;

pub use client::{ApiClient, DEFAULT_API_URL, PAGE_SIZE};
pub use types::{
    Application, ApplicationVersion, AsgInterface, AutoScalingGroup, ClusterDetail,
    ClusterSummary, CreateApplicationRequest, CreateAutoScalingGroupRequest,
    CreateLoadBalancerRequest, CreateVersionRequest, EnvironmentVariable, ExposedPort,
    HealthCheck, IpRange, LbInterface, LoadBalancer, LoadBalancerSummary, Page,
    RegistryPasswordAction, UpdateApplicationRequest, UpdateClusterRequest, VersionSummary,
};
pub use gateway::Gateway;
pub use observer::{ClusterIdentity, ClusterObserver, LiveApplication, LiveState, collect_pages};
pub use provisioner::{PollSettings, ResourceProvisioner};
