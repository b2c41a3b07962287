//! Server metrics definitions
//!
//! OpenTelemetry instruments recorded by the dispatcher when metrics are
//! enabled through `DispatcherBuilder::with_metrics` or
//! `DispatcherBuilder::with_observability`.
//!
//! # Metrics Collected
//!
//! - **restbind.server.requests.total**: handled requests, by operation,
//!   verb and status (counter)
//! - **restbind.server.request.duration**: time from selection to response
//!   in seconds (histogram)
//! - **restbind.server.errors.total**: failed requests by error category
//!   (counter)
//! - **restbind.server.operations.registered**: operations in the registry
//!   (gauge)
//!
//! # Examples
//!
//! ```rust,no_run
//! use restbind_server::ServerMetrics;
//!
//! let metrics = ServerMetrics::new("patient-api");
//! metrics.record_registered(3);
//! metrics.record_request("patch_patient", "PATCH", 200, 0.012);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};
use restbind_core::ErrorCategory;

/// Operation used in metric attributes when no operation was selected
pub const UNMATCHED: &str = "unmatched";

/// Dispatcher-level OpenTelemetry instruments
pub struct ServerMetrics {
    pub requests_total: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub operations_registered: Gauge<u64>,
}

impl ServerMetrics {
    /// Instruments on the global meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        // The global meter API keeps the name for the process lifetime
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        Self::new_with_meter(&global::meter(name))
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("restbind.server.requests.total")
                .with_description("Total number of requests handled")
                .build(),
            request_duration: meter
                .f64_histogram("restbind.server.request.duration")
                .with_description("Request handling duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("restbind.server.errors.total")
                .with_description("Total number of failed requests")
                .build(),
            operations_registered: meter
                .u64_gauge("restbind.server.operations.registered")
                .with_description("Number of registered operations")
                .build(),
        }
    }

    pub fn record_request(&self, operation: &str, verb: &str, status: u16, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("verb", verb.to_string()),
            KeyValue::new("status", i64::from(status)),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, operation: &str, category: ErrorCategory) {
        let attributes = &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("category", category.as_str()),
        ];
        self.errors_total.add(1, attributes);
    }

    pub fn record_registered(&self, count: usize) {
        self.operations_registered
            .record(u64::try_from(count).unwrap_or(u64::MAX), &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ServerMetrics::new("test-server");

        metrics.record_registered(2);
        metrics.record_request("patch_patient", "PATCH", 200, 0.01);
        metrics.record_request(UNMATCHED, "GET", 404, 0.0);
        metrics.record_error(UNMATCHED, ErrorCategory::Client);
        metrics.record_error("patch_patient", ErrorCategory::InvariantViolation);
    }

    #[test]
    fn test_metrics_with_custom_meter() {
        let meter = global::meter("restbind-test");
        let metrics = ServerMetrics::new_with_meter(&meter);
        metrics.record_request("patch_any", "PATCH", 204, 0.002);
    }
}
