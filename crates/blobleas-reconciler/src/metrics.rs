//! ---
//! bl_section: "04-lease-reconciler"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Prometheus counters for lease operations and renewals."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub type SharedRegistry = Arc<Registry>;

/// Create an empty registry for a process or a test.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Metrics published by the reconciler and renewal loop.
#[derive(Clone)]
pub struct LeaseMetrics {
    registry: SharedRegistry,
    operations_total: IntCounterVec,
    renewals_total: IntCounterVec,
    reacquisitions_total: IntCounter,
}

impl LeaseMetrics {
    /// Register the lease metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let operations_total = IntCounterVec::new(
            Opts::new(
                "blobleas_operations_total",
                "Reconciler operations by name and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let renewals_total = IntCounterVec::new(
            Opts::new(
                "blobleas_renewals_total",
                "Background lease renewals by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(renewals_total.clone()))?;

        let reacquisitions_total = IntCounter::new(
            "blobleas_reacquisitions_total",
            "Fallback re-acquisitions performed after a failed renewal",
        )?;
        registry.register(Box::new(reacquisitions_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            renewals_total,
            reacquisitions_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_renewal(&self, outcome: &str) {
        self.renewals_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_reacquisition(&self) {
        self.reacquisitions_total.inc();
    }
}

impl std::fmt::Debug for LeaseMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exported() {
        let metrics = LeaseMetrics::new(new_registry()).unwrap();
        metrics.record_operation("create", "success");
        metrics.record_operation("create", "success");
        metrics.record_renewal("failure");
        metrics.inc_reacquisition();

        let families = metrics.registry().gather();
        let operations = families
            .iter()
            .find(|family| family.get_name() == "blobleas_operations_total")
            .unwrap();
        assert_eq!(operations.get_metric()[0].get_counter().get_value(), 2.0);
        assert!(families
            .iter()
            .any(|family| family.get_name() == "blobleas_reacquisitions_total"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = new_registry();
        LeaseMetrics::new(registry.clone()).unwrap();
        assert!(LeaseMetrics::new(registry).is_err());
    }
}
