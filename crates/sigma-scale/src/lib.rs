//! Autoscaling and metrics for Sigma function controllers.
//!
//! Policies and metrics are pluggable: factories register by name in
//! process-wide registries, function specs reference them by name, and the
//! [`AutoScaler`] composes the attached policies into a single scale-up /
//! scale-down / no-op decision per control-loop tick.
//!
//! Registration is explicit: call [`register_builtins`] (or register your
//! own factories) at startup.

mod autoscaler;
mod builtin;
mod error;
mod metrics;
mod policy;

pub use autoscaler::{AutoScaler, ScaleDecision, BUILTIN_POLICY};
pub use builtin::{
    register_builtin_metrics, register_builtin_policies, register_builtins, METRIC_ACTIVE_NODES,
    METRIC_MEAN_EXEC_TIME_MS, METRIC_TOTAL_INVOCATIONS, POLICY_STATIC_COUNT,
};
pub use error::{Result, ScaleError};
pub use metrics::{Metric, MetricFactory, MetricRegistry, Metrics};
pub use policy::{Policy, PolicyDecision, PolicyFactory, PolicyRegistry, ScaleDirection};
