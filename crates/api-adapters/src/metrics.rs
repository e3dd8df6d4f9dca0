//! Prometheus metrics.
//!
//! - `engine_operations_total{operation,outcome}` - every engine call made
//!   through the API, with `ok` or the error code as outcome
//! - `characters_deactivated_total` - flips to Inactive, whichever path ran
//!   the evaluation

use std::fmt;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation: String,
    pub outcome: String,
}

pub struct Metrics {
    registry: Registry,
    operations: Family<OperationLabels, Counter>,
    deactivated: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let operations = Family::<OperationLabels, Counter>::default();
        registry.register(
            "engine_operations",
            "Engine operations by name and outcome",
            operations.clone(),
        );

        let deactivated = Counter::default();
        registry.register(
            "characters_deactivated",
            "Characters flipped to inactive by the activity check",
            deactivated.clone(),
        );

        Self {
            registry,
            operations,
            deactivated,
        }
    }

    pub fn record(&self, operation: &str, outcome: &str) {
        self.operations
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_deactivations(&self, count: u64) {
        self.deactivated.inc_by(count);
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .get()
    }

    pub fn deactivated_count(&self) -> u64 {
        self.deactivated.get()
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
