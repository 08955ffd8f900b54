//! Cluster observer for reading live `AppRun` state.
//!
//! The observer drains every paginated list it needs and assembles a
//! [`LiveState`] snapshot for the planner.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ResolveError, Result};

use super::gateway::Gateway;
use super::types::{
    Application, ApplicationVersion, AutoScalingGroup, ClusterDetail, LoadBalancer, Page,
    VersionSummary,
};

/// A cluster resolved by name, fixed for one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterIdentity {
    /// Cluster name.
    pub name: String,
    /// Cluster ID.
    pub id: Uuid,
}

/// A live application with its most recent version.
#[derive(Debug, Clone)]
pub struct LiveApplication {
    /// The application.
    pub application: Application,
    /// Highest-numbered version, if any exist.
    pub latest_version: Option<ApplicationVersion>,
}

/// Snapshot of everything live in a cluster.
#[derive(Debug, Clone)]
pub struct LiveState {
    /// Resolved cluster.
    pub cluster: ClusterIdentity,
    /// Cluster detail.
    pub detail: ClusterDetail,
    /// Auto-scaling groups, in API order.
    pub auto_scaling_groups: Vec<AutoScalingGroup>,
    /// Load balancers keyed by owning group name.
    pub load_balancers: BTreeMap<String, Vec<LoadBalancer>>,
    /// Applications, in API order.
    pub applications: Vec<LiveApplication>,
}

impl LiveState {
    /// Looks up a live auto-scaling group by name.
    #[must_use]
    pub fn auto_scaling_group(&self, name: &str) -> Option<&AutoScalingGroup> {
        self.auto_scaling_groups.iter().find(|a| a.name == name)
    }
}

/// Drains a cursor-paginated list.
///
/// # Errors
///
/// Returns the first page error.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = None;
    let mut seen = HashSet::new();

    loop {
        let page = fetch(cursor.clone()).await?;
        items.extend(page.items);

        match page.next_cursor {
            Some(next) if seen.insert(next.clone()) => {
                debug!("Fetching next page (cursor {next})");
                cursor = Some(next);
            }
            Some(next) => {
                warn!("Cursor {next} was already visited, stopping pagination");
                break;
            }
            None => break,
        }
    }

    Ok(items)
}

/// Observer reading live cluster state through a [`Gateway`].
#[derive(Debug)]
pub struct ClusterObserver<'a, G: Gateway + ?Sized> {
    /// Gateway to the control plane.
    gateway: &'a G,
}

impl<'a, G: Gateway + ?Sized> ClusterObserver<'a, G> {
    /// Creates a new observer.
    #[must_use]
    pub const fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Resolves a cluster name to its identity.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ClusterNotFound`] if no cluster has the name.
    pub async fn resolve_cluster(&self, name: &str) -> Result<ClusterIdentity> {
        let clusters = collect_pages(|cursor| self.gateway.list_clusters(cursor)).await?;

        clusters
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| ClusterIdentity {
                name: c.name,
                id: c.cluster_id,
            })
            .ok_or_else(|| {
                ResolveError::ClusterNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Lists every auto-scaling group in a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_auto_scaling_groups(&self, cluster_id: Uuid) -> Result<Vec<AutoScalingGroup>> {
        collect_pages(|cursor| self.gateway.list_auto_scaling_groups(cluster_id, cursor)).await
    }

    /// Lists every load balancer in a group, with full detail.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_load_balancers(&self, cluster_id: Uuid, asg_id: Uuid) -> Result<Vec<LoadBalancer>> {
        let summaries =
            collect_pages(|cursor| self.gateway.list_load_balancers(cluster_id, asg_id, cursor)).await?;

        let mut load_balancers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            load_balancers.push(
                self.gateway
                    .get_load_balancer(cluster_id, asg_id, summary.load_balancer_id)
                    .await?,
            );
        }
        Ok(load_balancers)
    }

    /// Lists every application in a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_applications(&self, cluster_id: Uuid) -> Result<Vec<Application>> {
        collect_pages(|cursor| self.gateway.list_applications(cluster_id, cursor)).await
    }

    /// Finds an application by name.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ApplicationNotFound`] if no application has the name.
    pub async fn find_application(&self, cluster_id: Uuid, name: &str) -> Result<Application> {
        self.list_applications(cluster_id)
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| {
                ResolveError::ApplicationNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Lists every version of an application.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_versions(&self, application_id: Uuid) -> Result<Vec<VersionSummary>> {
        collect_pages(|cursor| self.gateway.list_application_versions(application_id, cursor)).await
    }

    /// Fetches the highest-numbered version of an application.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn latest_version(&self, application_id: Uuid) -> Result<Option<ApplicationVersion>> {
        let latest = self
            .list_versions(application_id)
            .await?
            .iter()
            .map(|v| v.version)
            .max();

        match latest {
            Some(version) => Ok(Some(
                self.gateway
                    .get_application_version(application_id, version)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    /// Reads a complete snapshot of a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster cannot be resolved or any API call fails.
    pub async fn observe(&self, cluster_name: &str) -> Result<LiveState> {
        info!("Observing cluster: {cluster_name}");

        let cluster = self.resolve_cluster(cluster_name).await?;
        let detail = self.gateway.get_cluster(cluster.id).await?;

        let auto_scaling_groups = self.list_auto_scaling_groups(cluster.id).await?;

        let mut load_balancers = BTreeMap::new();
        for asg in &auto_scaling_groups {
            let lbs = self
                .list_load_balancers(cluster.id, asg.auto_scaling_group_id)
                .await?;
            load_balancers.insert(asg.name.clone(), lbs);
        }

        let mut applications = Vec::new();
        for application in self.list_applications(cluster.id).await? {
            let latest_version = self.latest_version(application.application_id).await?;
            applications.push(LiveApplication {
                application,
                latest_version,
            });
        }

        debug!(
            "Observed {} auto-scaling groups, {} load balancers, {} applications",
            auto_scaling_groups.len(),
            load_balancers.values().map(Vec::len).sum::<usize>(),
            applications.len()
        );

        Ok(LiveState {
            cluster,
            detail,
            auto_scaling_groups,
            load_balancers,
            applications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apprun::fake::FakeGateway;
    use crate::apprun::types::ClusterSummary;
    use crate::error::ProvisionerError;

    #[tokio::test]
    async fn test_collect_pages_drains_all_cursors() {
        let pages = collect_pages(|cursor: Option<String>| async move {
            Ok(match cursor.as_deref() {
                None => Page::new(vec![1, 2], Some("a".to_string())),
                Some("a") => Page::new(vec![3], Some("b".to_string())),
                _ => Page::last(vec![4]),
            })
        })
        .await
        .expect("collect");

        assert_eq!(pages, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_cursor_cycle() {
        let pages = collect_pages(|cursor: Option<String>| async move {
            Ok(match cursor.as_deref() {
                None => Page::new(vec![1], Some("a".to_string())),
                Some("a") => Page::new(vec![2], Some("b".to_string())),
                _ => Page::new(vec![3], Some("a".to_string())),
            })
        })
        .await
        .expect("collect");

        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_resolve_cluster_across_pages() {
        let gateway = FakeGateway::new("prod").with_page_size(1);
        gateway.add_cluster(ClusterSummary {
            cluster_id: Uuid::new_v4(),
            name: "staging".to_string(),
        });

        let observer = ClusterObserver::new(&gateway);
        let prod = observer.resolve_cluster("prod").await.expect("resolve");
        assert_eq!(prod.id, gateway.cluster_id());
        let staging = observer.resolve_cluster("staging").await.expect("resolve");
        assert_ne!(staging.id, gateway.cluster_id());
    }

    #[tokio::test]
    async fn test_cluster_not_found() {
        let gateway = FakeGateway::new("prod");
        let err = ClusterObserver::new(&gateway)
            .resolve_cluster("missing")
            .await
            .expect_err("should fail");

        assert!(matches!(
            err,
            ProvisionerError::Resolve(ResolveError::ClusterNotFound { .. })
        ));
        assert_eq!(err.to_string(), "cluster \"missing\" not found");
    }

    #[tokio::test]
    async fn test_latest_version_is_highest_number() {
        let gateway = FakeGateway::new("prod");
        let app_id = gateway.seed_application("web", &[1, 3, 2]);

        let latest = ClusterObserver::new(&gateway)
            .latest_version(app_id)
            .await
            .expect("latest")
            .expect("some version");
        assert_eq!(latest.version, 3);
    }
}
