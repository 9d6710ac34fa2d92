//! Infrastructure Layer - Adapters and external integrations.
//!
//! The streamer client and the ambient plumbing around it.

/// Quote streamer WebSocket client and wire codec.
pub mod yahoo;

/// Broadcast channel for stream events.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
