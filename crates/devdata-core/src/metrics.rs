//! ---
//! devdata_section: "03-persistence-logging"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Prometheus counters for element operations and notifications."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry};

use crate::error::Operation;

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Metrics published by data elements. Cheap to clone; one instance is
/// normally shared by every element of a process.
#[derive(Clone)]
pub struct ElementMetrics {
    registry: SharedRegistry,
    operations_total: IntCounterVec,
    notifications_total: IntCounterVec,
}

impl ElementMetrics {
    /// Register the element metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> prometheus::Result<Self> {
        let operations_total = IntCounterVec::new(
            Opts::new(
                "devdata_element_operations_total",
                "Read, write, and observe calls handled by data elements",
            ),
            &["element", "operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "devdata_element_notifications_total",
                "Subscription handler invocations caused by value changes",
            ),
            &["element"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            notifications_total,
        })
    }

    /// Registry the metrics were registered against.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub(crate) fn record_operation(&self, element: &str, operation: Operation, outcome: &str) {
        self.operations_total
            .with_label_values(&[element, operation.as_ref(), outcome])
            .inc();
    }

    pub(crate) fn record_notifications(&self, element: &str, handlers: usize) {
        self.notifications_total
            .with_label_values(&[element])
            .inc_by(handlers as u64);
    }

    /// Current operation count for a label combination.
    pub fn operation_count(&self, element: &str, operation: Operation, outcome: &str) -> u64 {
        self.operations_total
            .with_label_values(&[element, operation.as_ref(), outcome])
            .get()
    }

    /// Current handler invocation count for an element.
    pub fn notification_count(&self, element: &str) -> u64 {
        self.notifications_total.with_label_values(&[element]).get()
    }
}

impl std::fmt::Debug for ElementMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_both_families() {
        let registry = new_registry();
        let metrics = ElementMetrics::new(registry.clone()).unwrap();
        metrics.record_operation("temp", Operation::Read, "ok");
        metrics.record_notifications("temp", 2);
        assert_eq!(metrics.operation_count("temp", Operation::Read, "ok"), 1);
        assert_eq!(metrics.notification_count("temp"), 2);
        assert_eq!(registry.gather().len(), 2);
        assert!(std::sync::Arc::ptr_eq(metrics.registry(), &registry));
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = new_registry();
        ElementMetrics::new(registry.clone()).unwrap();
        assert!(ElementMetrics::new(registry).is_err());
    }
}
