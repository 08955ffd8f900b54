//! Plan construction from desired and live state.
//!
//! Planning is pure: it only reads the desired configuration, the live
//! snapshot and the ledger.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::apprun::{LiveApplication, LiveState};
use crate::config::{ApplicationConfig, ClusterConfig};
use crate::error::{ProvisionerError, Result};
use crate::ledger::SecretLedger;

use super::diff::DiffEngine;
use super::plan::{ActionType, AppAction, AsgAction, ClusterAction, LbAction, Plan};

/// Change recorded for infrastructure that exists but is not configured.
pub const ORPHAN_SKIP: &str = "not in YAML, skipping";

/// Change recorded for an application that has no versions yet.
pub const INITIAL_VERSION: &str = "Create initial version (no versions exist)";

/// Builds reconciliation plans.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    /// Applied secret versions.
    ledger: &'a SecretLedger,
    /// Field-level comparisons.
    diff: DiffEngine,
}

impl<'a> Planner<'a> {
    /// Creates a planner that judges secrets against `ledger`.
    #[must_use]
    pub const fn new(ledger: &'a SecretLedger) -> Self {
        Self {
            ledger,
            diff: DiffEngine::new(),
        }
    }

    /// Computes the plan that moves `live` towards `desired`.
    ///
    /// # Errors
    ///
    /// Returns an error if an application spec cannot be compared.
    pub fn plan(&self, desired: &ClusterConfig, live: &LiveState) -> Result<Plan> {
        info!("Planning changes for cluster {}", live.cluster.name);

        let mut plan = Plan::new(live.cluster.clone());
        plan.cluster_action = self.plan_cluster(desired, live);
        plan.asg_actions = self.plan_auto_scaling_groups(desired, live);
        plan.lb_actions = self.plan_load_balancers(desired, live, &plan.asg_actions, &mut plan.warnings);
        self.plan_applications(desired, live, &mut plan)?;

        debug!(
            "Plan has {} changes and {} warnings",
            plan.change_count(),
            plan.warnings.len()
        );
        Ok(plan)
    }

    fn plan_cluster(&self, desired: &ClusterConfig, live: &LiveState) -> ClusterAction {
        let Some(settings) = &desired.cluster else {
            return ClusterAction::noop();
        };

        let changes = self.diff.cluster_settings_changes(&live.detail, settings);
        if changes.is_empty() {
            ClusterAction::noop()
        } else {
            ClusterAction {
                action: ActionType::Update,
                changes,
            }
        }
    }

    fn plan_auto_scaling_groups(&self, desired: &ClusterConfig, live: &LiveState) -> Vec<AsgAction> {
        let mut actions = Vec::new();

        for wanted in &desired.auto_scaling_groups {
            let action = match live.auto_scaling_group(&wanted.name) {
                None => AsgAction {
                    name: wanted.name.clone(),
                    action: ActionType::Create,
                    existing_id: None,
                    changes: self.diff.describe_asg(wanted),
                },
                Some(current) => {
                    let changes = self.diff.asg_changes(current, wanted);
                    AsgAction {
                        name: wanted.name.clone(),
                        action: if changes.is_empty() {
                            ActionType::Noop
                        } else {
                            ActionType::Recreate
                        },
                        existing_id: Some(current.auto_scaling_group_id),
                        changes,
                    }
                }
            };
            actions.push(action);
        }

        for current in &live.auto_scaling_groups {
            if desired.auto_scaling_group(&current.name).is_none() {
                actions.push(AsgAction {
                    name: current.name.clone(),
                    action: ActionType::Skip,
                    existing_id: Some(current.auto_scaling_group_id),
                    changes: vec![ORPHAN_SKIP.to_string()],
                });
            }
        }

        actions
    }

    fn plan_load_balancers(
        &self,
        desired: &ClusterConfig,
        live: &LiveState,
        asg_actions: &[AsgAction],
        warnings: &mut Vec<String>,
    ) -> Vec<LbAction> {
        let recreated: BTreeSet<&str> = asg_actions
            .iter()
            .filter(|a| a.action == ActionType::Recreate)
            .map(|a| a.name.as_str())
            .collect();
        let mut actions = Vec::new();

        for wanted in &desired.load_balancers {
            let owner = &wanted.auto_scaling_group_name;
            let Some(asg) = live.auto_scaling_group(owner) else {
                actions.push(LbAction {
                    name: wanted.name.clone(),
                    asg_name: owner.clone(),
                    action: ActionType::Create,
                    asg_id: None,
                    existing_id: None,
                    changes: self.diff.describe_lb(wanted),
                });
                continue;
            };

            let current = live
                .load_balancers
                .get(owner)
                .and_then(|lbs| lbs.iter().find(|lb| lb.name == wanted.name));

            let action = match current {
                None => LbAction {
                    name: wanted.name.clone(),
                    asg_name: owner.clone(),
                    action: ActionType::Create,
                    asg_id: Some(asg.auto_scaling_group_id),
                    existing_id: None,
                    changes: self.diff.describe_lb(wanted),
                },
                Some(current) => {
                    let mut changes = self.diff.lb_changes(current, wanted);
                    if changes.is_empty() && recreated.contains(owner.as_str()) {
                        changes.push(format!("AutoScalingGroup {owner} is recreated"));
                    }
                    LbAction {
                        name: wanted.name.clone(),
                        asg_name: owner.clone(),
                        action: if changes.is_empty() {
                            ActionType::Noop
                        } else {
                            ActionType::Recreate
                        },
                        asg_id: Some(asg.auto_scaling_group_id),
                        existing_id: Some(current.load_balancer_id),
                        changes,
                    }
                }
            };
            actions.push(action);
        }

        for (asg_name, lbs) in &live.load_balancers {
            let asg_id = live
                .auto_scaling_group(asg_name)
                .map(|a| a.auto_scaling_group_id);
            for current in lbs {
                if desired.load_balancer(asg_name, &current.name).is_none() {
                    let mut changes = vec![ORPHAN_SKIP.to_string()];
                    // Deleting the owner takes this load balancer with it.
                    if recreated.contains(asg_name.as_str()) {
                        let lost = format!(
                            "AutoScalingGroup {asg_name} is recreated; unlisted load balancer {} will be lost",
                            current.name
                        );
                        warn!("{lost}");
                        changes.push(lost.clone());
                        warnings.push(lost);
                    }
                    actions.push(LbAction {
                        name: current.name.clone(),
                        asg_name: asg_name.clone(),
                        action: ActionType::Skip,
                        asg_id,
                        existing_id: Some(current.load_balancer_id),
                        changes,
                    });
                }
            }
        }

        actions
    }

    fn plan_applications(&self, desired: &ClusterConfig, live: &LiveState, plan: &mut Plan) -> Result<()> {
        let live_by_name: HashMap<&str, &LiveApplication> = live
            .applications
            .iter()
            .map(|a| (a.application.name.as_str(), a))
            .collect();

        for wanted in &desired.applications {
            let action = self.plan_application(wanted, live_by_name.get(wanted.name.as_str()).copied())?;
            plan.app_actions.push(action);
        }

        for current in &live.applications {
            let name = &current.application.name;
            if desired.application(name).is_none() {
                warn!("Application {name} exists in the cluster but not in the configuration");
                plan.warnings
                    .push(format!("application \"{name}\" exists in the cluster but is not in YAML"));
            }
        }

        Ok(())
    }

    fn plan_application(&self, wanted: &ApplicationConfig, current: Option<&LiveApplication>) -> Result<AppAction> {
        let name = &wanted.name;

        let Some(current) = current else {
            return Ok(AppAction {
                name: name.clone(),
                action: ActionType::Create,
                application_id: None,
                changes: self.diff.describe_application(name, &wanted.spec, self.ledger),
            });
        };
        let application_id = Some(current.application.application_id);

        let Some(latest) = &current.latest_version else {
            return Ok(AppAction {
                name: name.clone(),
                action: ActionType::Update,
                application_id,
                changes: vec![INITIAL_VERSION.to_string()],
            });
        };

        let changes = self
            .diff
            .application_changes(name, latest, &wanted.spec, self.ledger)
            .map_err(|e| match e {
                ProvisionerError::Plan(inner) => ProvisionerError::Plan(inner.for_resource(name)),
                other => other,
            })?;

        Ok(AppAction {
            name: name.clone(),
            action: if changes.is_empty() {
                ActionType::Noop
            } else {
                ActionType::Update
            },
            application_id,
            changes,
        })
    }
}
