//! Core building blocks shared by planning and orchestration.
//!
//! This module holds the dependency resolver used by both sides and the
//! runtime task state recorded by the chain engine.

pub mod dag;
pub mod task;

pub use dag::{
    dependency_depth, is_valid_layering, resolve_waves, Dependent, DependencyGraph,
    IgnoreReason, IgnoredDependency,
};
pub use task::{queue_key, TaskExecution, TaskStatus};
