// Health probes used by the registry's monitor
pub mod health;

// Structured logging
pub mod logging;

// Metrics collection
pub mod metrics;

pub use health::{HealthProbe, HttpHealthProbe, ProbeResult};
pub use logging::{init_logging, CorrelationId};
