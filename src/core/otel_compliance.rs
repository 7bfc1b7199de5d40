//! OpenTelemetry conventions shared by the tracker and the export backends.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Convert nanoseconds since Unix epoch to SystemTime.
#[inline(always)]
pub fn nanos_to_system_time(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// Convert SystemTime to nanoseconds since Unix epoch.
#[inline(always)]
pub fn system_time_to_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Convert SystemTime to microseconds since Unix epoch (Jaeger's unit).
#[inline(always)]
pub fn system_time_to_micros(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Semantic convention keys for span attributes.
pub mod attributes {
    // Service attributes
    pub const SERVICE_NAME: &str = "service.name";
    pub const SERVICE_NAMESPACE: &str = "service.namespace";

    // Kubernetes attributes
    pub const K8S_NAMESPACE: &str = "k8s.namespace.name";
    pub const K8S_POD_NAME: &str = "k8s.pod.name";

    // Process attributes
    pub const PROCESS_NAME: &str = "process.executable.name";
    pub const PROCESS_PID: &str = "process.pid";

    // Captured event attributes
    pub const EVENT_TARGET: &str = "event.target";
    pub const EVENT_DETAILS: &str = "event.details";
}
