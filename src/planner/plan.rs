//! Reconciliation plan types.
//!
//! A [`Plan`] lists one action per resource name for each kind, plus the
//! cluster settings action and any warnings raised while planning.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::apprun::ClusterIdentity;

/// Outcome planned for a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Resource will be created.
    Create,
    /// Resource will get a new version in place.
    Update,
    /// Resource will be deleted and created again.
    Recreate,
    /// Resource already matches.
    Noop,
    /// Resource exists but is not managed by the configuration.
    Skip,
    /// Resource will be deleted.
    Delete,
}

impl ActionType {
    /// Returns true if applying this action mutates the cluster.
    #[must_use]
    pub const fn is_change(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Recreate | Self::Delete)
    }

    /// Returns true if this action removes the existing resource.
    #[must_use]
    pub const fn deletes(self) -> bool {
        matches!(self, Self::Recreate | Self::Delete)
    }

    /// Returns true if this action creates a resource.
    #[must_use]
    pub const fn creates(self) -> bool {
        matches!(self, Self::Create | Self::Recreate)
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Recreate => "-/+",
            Self::Noop => " ",
            Self::Skip => "?",
            Self::Delete => "-",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Recreate => "recreate",
            Self::Noop => "noop",
            Self::Skip => "skip",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Planned change to cluster-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAction {
    /// Either `Update` or `Noop`.
    pub action: ActionType,
    /// Human-readable changes.
    pub changes: Vec<String>,
}

impl ClusterAction {
    /// A cluster action that changes nothing.
    #[must_use]
    pub const fn noop() -> Self {
        Self {
            action: ActionType::Noop,
            changes: Vec::new(),
        }
    }
}

/// Planned action for an auto-scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsgAction {
    /// Group name.
    pub name: String,
    /// Planned outcome.
    pub action: ActionType,
    /// ID of the live group, if any.
    pub existing_id: Option<Uuid>,
    /// Human-readable changes.
    pub changes: Vec<String>,
}

/// Planned action for a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbAction {
    /// Load balancer name.
    pub name: String,
    /// Name of the owning group.
    pub asg_name: String,
    /// Planned outcome.
    pub action: ActionType,
    /// ID of the live owning group, if it exists.
    pub asg_id: Option<Uuid>,
    /// ID of the live load balancer, if any.
    pub existing_id: Option<Uuid>,
    /// Human-readable changes.
    pub changes: Vec<String>,
}

/// Planned action for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAction {
    /// Application name.
    pub name: String,
    /// Planned outcome.
    pub action: ActionType,
    /// ID of the live application, if any.
    pub application_id: Option<Uuid>,
    /// Human-readable changes.
    pub changes: Vec<String>,
}

/// A complete reconciliation plan for one cluster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Cluster the plan targets.
    pub cluster: ClusterIdentity,
    /// Cluster settings action.
    pub cluster_action: ClusterAction,
    /// Auto-scaling group actions.
    pub asg_actions: Vec<AsgAction>,
    /// Load balancer actions.
    pub lb_actions: Vec<LbAction>,
    /// Application actions.
    pub app_actions: Vec<AppAction>,
    /// Warnings raised while planning.
    pub warnings: Vec<String>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Creates an empty plan for a cluster.
    #[must_use]
    pub fn new(cluster: ClusterIdentity) -> Self {
        Self {
            cluster,
            cluster_action: ClusterAction::noop(),
            asg_actions: Vec::new(),
            lb_actions: Vec::new(),
            app_actions: Vec::new(),
            warnings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn action_types(&self) -> impl Iterator<Item = ActionType> + '_ {
        std::iter::once(self.cluster_action.action)
            .chain(self.asg_actions.iter().map(|a| a.action))
            .chain(self.lb_actions.iter().map(|a| a.action))
            .chain(self.app_actions.iter().map(|a| a.action))
    }

    /// Returns true if applying the plan would mutate anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.action_types().any(ActionType::is_change)
    }

    /// Returns the number of actions with the given outcome.
    #[must_use]
    pub fn count(&self, action: ActionType) -> usize {
        self.action_types().filter(|a| *a == action).count()
    }

    /// Returns the number of mutating actions.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.action_types().filter(|a| a.is_change()).count()
    }

    /// Looks up the planned action for an auto-scaling group.
    #[must_use]
    pub fn asg_action(&self, name: &str) -> Option<&AsgAction> {
        self.asg_actions.iter().find(|a| a.name == name)
    }

    /// Looks up the planned action for an application.
    #[must_use]
    pub fn app_action(&self, name: &str) -> Option<&AppAction> {
        self.app_actions.iter().find(|a| a.name == name)
    }
}

fn write_entry(f: &mut fmt::Formatter<'_>, action: ActionType, label: &str, changes: &[String]) -> fmt::Result {
    writeln!(f, "  {} {label} ({action})", action.symbol())?;
    if action != ActionType::Noop {
        for change in changes {
            writeln!(f, "      {change}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Plan for cluster {} ({} changes):",
            self.cluster.name,
            self.change_count()
        )?;

        if self.cluster_action.action != ActionType::Noop {
            write_entry(f, self.cluster_action.action, "cluster settings", &self.cluster_action.changes)?;
        }
        for asg in &self.asg_actions {
            write_entry(f, asg.action, &format!("auto-scaling group {}", asg.name), &asg.changes)?;
        }
        for lb in &self.lb_actions {
            write_entry(
                f,
                lb.action,
                &format!("load balancer {}/{}", lb.asg_name, lb.name),
                &lb.changes,
            )?;
        }
        for app in &self.app_actions {
            write_entry(f, app.action, &format!("application {}", app.name), &app.changes)?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
        }

        if !self.has_changes() {
            write!(f, "No changes required")?;
        }
        Ok(())
    }
}
