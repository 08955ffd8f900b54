//! Plan executor for applying reconciliation plans.
//!
//! Execution runs in a fixed order of stages regardless of how actions are
//! listed in the plan:
//!
//! 0. cluster settings
//! 1. delete load balancers
//! 2. delete auto-scaling groups
//! 3. create auto-scaling groups
//! 4. create load balancers
//! 5. applications and versions
//!
//! The first failure aborts the remaining stages. Nothing is rolled back, but
//! ledger updates for writes that did succeed are still persisted.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::apprun::{ClusterObserver, Gateway, PollSettings, ResourceProvisioner};
use crate::config::{ApplicationSpec, ClusterConfig};
use crate::error::{ApplyError, ApplyStage, ProvisionerError, Result};
use crate::ledger::{LedgerStore, SecretLedger};

use super::plan::{ActionType, AppAction, LbAction, Plan};

/// Options controlling an apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Activate each newly created version.
    pub activate: bool,
}

impl ApplyOptions {
    /// Sets whether new versions are activated.
    #[must_use]
    pub const fn with_activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }
}

/// A version created during an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedVersion {
    /// Application name.
    pub application: String,
    /// New version number.
    pub version: i32,
    /// Whether the version was activated.
    pub activated: bool,
}

/// Result of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether cluster settings were updated.
    pub cluster_updated: bool,
    /// Deleted load balancers, as `group/name`.
    pub deleted_load_balancers: Vec<String>,
    /// Deleted auto-scaling groups.
    pub deleted_auto_scaling_groups: Vec<String>,
    /// Created auto-scaling groups.
    pub created_auto_scaling_groups: Vec<String>,
    /// Created load balancers, as `group/name`.
    pub created_load_balancers: Vec<String>,
    /// Created applications.
    pub created_applications: Vec<String>,
    /// Created versions.
    pub versions: Vec<CreatedVersion>,
    /// Whether the ledger changed and was persisted.
    pub ledger_modified: bool,
}

impl ExecutionResult {
    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.cluster_updated
            && self.deleted_load_balancers.is_empty()
            && self.deleted_auto_scaling_groups.is_empty()
            && self.created_auto_scaling_groups.is_empty()
            && self.created_load_balancers.is_empty()
            && self.created_applications.is_empty()
            && self.versions.is_empty()
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Apply complete: no changes");
        }

        writeln!(f, "Apply complete:")?;
        if self.cluster_updated {
            writeln!(f, "  cluster settings updated")?;
        }
        for name in &self.deleted_load_balancers {
            writeln!(f, "  - load balancer {name}")?;
        }
        for name in &self.deleted_auto_scaling_groups {
            writeln!(f, "  - auto-scaling group {name}")?;
        }
        for name in &self.created_auto_scaling_groups {
            writeln!(f, "  + auto-scaling group {name}")?;
        }
        for name in &self.created_load_balancers {
            writeln!(f, "  + load balancer {name}")?;
        }
        for name in &self.created_applications {
            writeln!(f, "  + application {name}")?;
        }
        for version in &self.versions {
            write!(f, "  + {} version {}", version.application, version.version)?;
            if version.activated {
                write!(f, " (activated)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn missing_config(resource_type: &str, name: &str) -> ProvisionerError {
    ProvisionerError::Apply(ApplyError::MissingConfig {
        resource_type: resource_type.to_string(),
        name: name.to_string(),
    })
}

fn missing_identifier(operation: &str, resource_type: &str, name: &str, reason: impl Into<String>) -> ProvisionerError {
    ProvisionerError::Apply(ApplyError::MissingIdentifier {
        operation: operation.to_string(),
        resource_type: resource_type.to_string(),
        name: name.to_string(),
        reason: reason.into(),
    })
}

/// Executor for reconciliation plans.
#[derive(Debug)]
pub struct PlanExecutor<'a, G: Gateway + ?Sized> {
    /// Mutating operations.
    provisioner: ResourceProvisioner<'a, G>,
    /// Fresh reads needed mid-apply.
    observer: ClusterObserver<'a, G>,
    /// Apply options.
    options: ApplyOptions,
}

impl<'a, G: Gateway + ?Sized> PlanExecutor<'a, G> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(gateway: &'a G) -> Self {
        Self {
            provisioner: ResourceProvisioner::new(gateway),
            observer: ClusterObserver::new(gateway),
            options: ApplyOptions::default(),
        }
    }

    /// Sets the deletion polling behavior.
    #[must_use]
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.provisioner = self.provisioner.with_poll(poll);
        self
    }

    /// Sets the apply options.
    #[must_use]
    pub const fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    /// Executes a plan against the cluster.
    ///
    /// The ledger is updated after each confirmed write and saved to `store`
    /// once at the end if anything changed, including when a stage fails.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::StageFailed`] wrapping the first failure, or
    /// an error if the ledger cannot be saved.
    pub async fn execute<S: LedgerStore + ?Sized>(
        &self,
        desired: &ClusterConfig,
        plan: &Plan,
        ledger: &mut SecretLedger,
        store: &S,
    ) -> Result<ExecutionResult> {
        info!(
            "Applying plan for cluster {} ({} changes)",
            plan.cluster.name,
            plan.change_count()
        );

        let mut result = ExecutionResult::default();
        let outcome = self.run_stages(desired, plan, ledger, &mut result).await;
        if let Err(e) = &outcome {
            error!("Apply stopped: {e}");
        }

        let saved = if result.ledger_modified {
            debug!("Saving ledger to {}", store.location());
            store.save(ledger).await
        } else {
            Ok(())
        };

        match (outcome, saved) {
            (Ok(()), Ok(())) => {
                info!("Apply complete");
                Ok(result)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(save_err)) => Err(save_err),
            (Err(e), Err(save_err)) => {
                error!("Failed to save ledger after apply failure: {save_err}");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        desired: &ClusterConfig,
        plan: &Plan,
        ledger: &mut SecretLedger,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        let cluster_id = plan.cluster.id;

        if plan.cluster_action.action == ActionType::Update {
            let stage = |e: ProvisionerError| e.in_stage(ApplyStage::ClusterSettings, &plan.cluster.name);
            let settings = desired
                .cluster
                .as_ref()
                .ok_or_else(|| stage(missing_config("cluster settings", &plan.cluster.name)))?;
            self.provisioner
                .update_cluster(cluster_id, settings)
                .await
                .map_err(stage)?;
            result.cluster_updated = true;
        }

        for lb in plan.lb_actions.iter().filter(|a| a.action.deletes()) {
            let resource = format!("{}/{}", lb.asg_name, lb.name);
            let (Some(asg_id), Some(lb_id)) = (lb.asg_id, lb.existing_id) else {
                return Err(missing_identifier("delete", "load balancer", &resource, "no live identifier in plan")
                    .in_stage(ApplyStage::DeleteLoadBalancers, resource));
            };
            self.provisioner
                .delete_load_balancer(cluster_id, asg_id, &lb.name, lb_id)
                .await
                .map_err(|e| e.in_stage(ApplyStage::DeleteLoadBalancers, &resource))?;
            result.deleted_load_balancers.push(resource);
        }

        for asg in plan.asg_actions.iter().filter(|a| a.action.deletes()) {
            let Some(asg_id) = asg.existing_id else {
                return Err(
                    missing_identifier("delete", "auto-scaling group", &asg.name, "no live identifier in plan")
                        .in_stage(ApplyStage::DeleteAutoScalingGroups, &asg.name),
                );
            };
            self.provisioner
                .delete_auto_scaling_group(cluster_id, &asg.name, asg_id)
                .await
                .map_err(|e| e.in_stage(ApplyStage::DeleteAutoScalingGroups, &asg.name))?;
            result.deleted_auto_scaling_groups.push(asg.name.clone());
        }

        let mut created_asgs = HashMap::new();
        for asg in plan.asg_actions.iter().filter(|a| a.action.creates()) {
            let stage = |e: ProvisionerError| e.in_stage(ApplyStage::CreateAutoScalingGroups, &asg.name);
            let config = desired
                .auto_scaling_group(&asg.name)
                .ok_or_else(|| stage(missing_config("auto-scaling group", &asg.name)))?;
            let id = self
                .provisioner
                .create_auto_scaling_group(cluster_id, config)
                .await
                .map_err(stage)?;
            created_asgs.insert(asg.name.clone(), id);
            result.created_auto_scaling_groups.push(asg.name.clone());
        }

        for lb in plan.lb_actions.iter().filter(|a| a.action.creates()) {
            let resource = format!("{}/{}", lb.asg_name, lb.name);
            let stage = |e: ProvisionerError| e.in_stage(ApplyStage::CreateLoadBalancers, &resource);
            let config = desired
                .load_balancer(&lb.asg_name, &lb.name)
                .ok_or_else(|| stage(missing_config("load balancer", &resource)))?;
            let asg_id = self
                .resolve_owner(cluster_id, lb, &created_asgs)
                .await
                .map_err(stage)?;
            self.provisioner
                .create_load_balancer(cluster_id, asg_id, config)
                .await
                .map_err(stage)?;
            result.created_load_balancers.push(resource.clone());
        }

        for app in &plan.app_actions {
            if !matches!(app.action, ActionType::Create | ActionType::Update) {
                continue;
            }
            let stage = |e: ProvisionerError| e.in_stage(ApplyStage::Applications, &app.name);
            let config = desired
                .application(&app.name)
                .ok_or_else(|| stage(missing_config("application", &app.name)))?;
            self.apply_application(cluster_id, app, &config.spec, ledger, result)
                .await
                .map_err(stage)?;
        }

        Ok(())
    }

    /// Resolves the owning group of a load balancer about to be created.
    ///
    /// A group created in this apply wins over the id captured in the plan,
    /// since a recreated group has a new id. Otherwise the live group is
    /// looked up by name.
    async fn resolve_owner(&self, cluster_id: Uuid, lb: &LbAction, created: &HashMap<String, Uuid>) -> Result<Uuid> {
        if let Some(id) = created.get(&lb.asg_name) {
            return Ok(*id);
        }
        if let Some(id) = lb.asg_id {
            return Ok(id);
        }

        debug!("Looking up auto-scaling group {} for load balancer {}", lb.asg_name, lb.name);
        self.observer
            .list_auto_scaling_groups(cluster_id)
            .await?
            .into_iter()
            .find(|a| a.name == lb.asg_name)
            .map(|a| a.auto_scaling_group_id)
            .ok_or_else(|| {
                missing_identifier(
                    "create",
                    "load balancer",
                    &lb.name,
                    format!("auto-scaling group {} does not exist", lb.asg_name),
                )
            })
    }

    async fn apply_application(
        &self,
        cluster_id: Uuid,
        action: &AppAction,
        spec: &ApplicationSpec,
        ledger: &mut SecretLedger,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        let name = &action.name;

        let (application_id, base) = if action.action == ActionType::Create {
            let id = self.provisioner.create_application(cluster_id, name).await?;
            result.created_applications.push(name.clone());
            (id, None)
        } else {
            let id = action
                .application_id
                .ok_or_else(|| missing_identifier("update", "application", name, "no live identifier in plan"))?;
            (id, self.observer.latest_version(id).await?)
        };

        let version = self
            .provisioner
            .create_version(application_id, name, spec, base.as_ref())
            .await?;
        if record_secret_versions(ledger, name, spec) {
            result.ledger_modified = true;
        }

        if self.options.activate {
            self.provisioner
                .activate_version(application_id, name, version)
                .await?;
        }
        result.versions.push(CreatedVersion {
            application: name.clone(),
            version,
            activated: self.options.activate,
        });
        Ok(())
    }
}

/// Records the secret versions carried by a freshly written version.
///
/// Secret entries without a version keep whatever was stored before.
/// Returns true if the ledger changed.
fn record_secret_versions(ledger: &mut SecretLedger, app: &str, spec: &ApplicationSpec) -> bool {
    let mut modified = ledger.set_password_version(app, spec.registry_password_version);

    let secrets: BTreeMap<&str, Option<i64>> = spec
        .env
        .iter()
        .filter(|e| e.secret)
        .map(|e| (e.key.as_str(), e.secret_version))
        .collect();

    let stale: Vec<String> = ledger
        .applications
        .get(app)
        .map(|entry| {
            entry
                .secret_env_versions
                .keys()
                .filter(|k| !secrets.contains_key(k.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for key in stale {
        modified |= ledger.set_secret_env_version(app, &key, None);
    }

    for (key, version) in secrets {
        if version.is_some() {
            modified |= ledger.set_secret_env_version(app, key, version);
        }
    }

    modified
}
