//! Process-level observability: log initialization and in-process metrics.

pub mod metrics;
pub mod tracing;

pub use metrics::MetricsRegistry;
