//! Planning module for reconciliation.
//!
//! This module compares the desired configuration with the live cluster,
//! builds a plan of per-resource actions, and applies that plan in a fixed
//! order of stages.

mod normalize;
mod diff;
mod plan;
mod builder;
mod executor;

pub use normalize::{CompareOptions, NormalizedPort, NormalizedSpec, UNSET, compare, describe};
pub use diff::DiffEngine;
pub use plan::{ActionType, AppAction, AsgAction, ClusterAction, LbAction, Plan};
pub use builder::{INITIAL_VERSION, ORPHAN_SKIP, Planner};
pub use executor::{ApplyOptions, CreatedVersion, ExecutionResult, PlanExecutor};
