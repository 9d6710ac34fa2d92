//! Application Layer - Caller-side policies built on the stream client.

/// Reconnect pacing used by the binary.
pub mod reconnect;
