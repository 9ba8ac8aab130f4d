//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Lease lifecycle state machine, plan predicate and renewal loop."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
pub mod error;
pub mod metrics;
pub mod plan;
pub mod reconciler;
pub mod record;
pub mod renewal;

pub use error::{ReconcileError, Result};
pub use metrics::{new_registry, LeaseMetrics, SharedRegistry};
pub use plan::{needs_reconcile, plan, PlanAction, ReplaceReason};
pub use reconciler::LeaseReconciler;
pub use record::{LeaseRecord, LeaseSpec, Observation, PayloadContent, ReconcilePhase};
pub use renewal::{recommended_interval, RenewalHandle, RenewalLoop};
