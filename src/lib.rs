// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden
#![cfg_attr(test, allow(missing_docs))] // Generated mocks carry no docs

// ============================================================================
// Crate Documentation
// ============================================================================

//! # apprun-provisioner
//!
//! A declarative plan/apply reconciler for `AppRun` Dedicated clusters.
//!
//! ## Overview
//!
//! A YAML file describes the desired shape of one existing cluster: its
//! settings, auto-scaling groups, load balancers and applications. The
//! provisioner reads the live cluster, prints a plan of the differences and,
//! when asked, applies it in a fixed order:
//!
//! 1. **Cluster settings** are updated
//! 2. **Load balancers** then **auto-scaling groups** marked for recreation are deleted
//! 3. **Auto-scaling groups** then **load balancers** are created
//! 4. **Applications** are created and receive new versions
//!
//! Auto-scaling groups and load balancers are immutable and are recreated
//! when they drift. Applications are never modified in place: every change
//! becomes a new version. Secret values can never be read back, so a local
//! ledger records which secret versions have been applied.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`ledger`]: Secret-version ledger storage
//! - [`apprun`]: `AppRun` Dedicated API client, observation and provisioning
//! - [`planner`]: Spec comparison, planning and plan execution
//! - [`reconciler`]: Plan/apply cycle and version management
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! clusterName: prod
//! autoScalingGroups:
//!   - name: workers
//!     zone: is1a
//!     workerServiceClassPath: cloud/plan/small
//!     minNodes: 1
//!     maxNodes: 3
//!     interfaces:
//!       - interfaceIndex: 0
//!         upstream: shared
//! applications:
//!   - name: web
//!     spec:
//!       cpu: 500
//!       memory: 1024
//!       scalingMode: manual
//!       fixedScale: 1
//!       image: nginx:1.27
//!       exposedPorts:
//!         - targetPort: 80
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod apprun;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod reconciler;

// ============================================================================
// Re-exports
// ============================================================================

pub use apprun::{ApiClient, ClusterObserver, Gateway, ResourceProvisioner};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ClusterConfig, ConfigParser, ConfigValidator};
pub use error::{ProvisionerError, Result};
pub use ledger::{LedgerStore, LocalLedgerStore, MemoryLedgerStore, SecretLedger};
pub use planner::{DiffEngine, Plan, PlanExecutor, Planner};
pub use reconciler::{Reconciler, VersionDiff, VersionList};
