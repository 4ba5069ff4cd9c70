//! Metrics for the connection layer.
//!
//! # Metrics
//! - `conns_retry_attempts_total` (counter): retries scheduled, by operation
//! - `conns_retry_exhausted_total` (counter): operations that ran out of attempts
//! - `conns_lazy_client_init_total` (counter): service clients built, by service
//!
//! Recording is a no-op until the host process installs a `metrics` recorder.

use metrics::counter;

pub fn record_retry_attempt(operation: &str) {
    counter!("conns_retry_attempts_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_retry_exhausted(operation: &str) {
    counter!("conns_retry_exhausted_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_lazy_client_init(service: &str) {
    counter!("conns_lazy_client_init_total", "service" => service.to_string()).increment(1);
}
