//! Client metrics definitions
//!
//! OpenTelemetry instruments recorded by [`RestClient`](crate::RestClient)
//! when metrics are enabled.
//!
//! # Metrics Collected
//!
//! - **restbind.client.invocations.total**: invocations sent, by operation and
//!   response status (counter)
//! - **restbind.client.invocation.duration**: build, send and decode time in
//!   seconds (histogram)
//! - **restbind.client.errors.total**: failed invocations by error category
//!   (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use restbind_client::ClientMetrics;
//!
//! let metrics = ClientMetrics::new("patient-app");
//! metrics.record_invocation("patch_patient", 200, 0.05);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};
use restbind_core::ErrorCategory;

pub struct ClientMetrics {
    pub invocations_total: Counter<u64>,
    pub invocation_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
}

impl ClientMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        Self::new_with_meter(&global::meter(name))
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            invocations_total: meter
                .u64_counter("restbind.client.invocations.total")
                .with_description("Total number of invocations sent")
                .build(),
            invocation_duration: meter
                .f64_histogram("restbind.client.invocation.duration")
                .with_description("Invocation duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("restbind.client.errors.total")
                .with_description("Total number of failed invocations")
                .build(),
        }
    }

    /// Record a completed round trip
    pub fn record_invocation(&self, operation: &str, status: u16, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("status", i64::from(status)),
        ];
        self.invocations_total.add(1, attributes);
        self.invocation_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, operation: &str, category: ErrorCategory) {
        let attributes = &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("category", category.as_str()),
        ];
        self.errors_total.add(1, attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_metrics_record() {
        let metrics = ClientMetrics::new("test-client");
        metrics.record_invocation("patch_patient", 200, 0.01);
        metrics.record_error("patch_patient", ErrorCategory::Internal);
    }
}
