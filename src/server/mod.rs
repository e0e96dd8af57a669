//! HTTP sidecar around a prefetch coordinator.

pub mod api;
pub mod metrics;
pub mod origin;
