//! Domain Layer - Core quote types and the ticker set.
//!
//! Pure types with no I/O. Serialization support only.

/// Decoded quote records and their classification enums.
pub mod quote;

/// Client-side ticker subscription set.
pub mod tickers;
