//! Quote Streamer Adapter
//!
//! WebSocket client for the real-time quote streamer.
//!
//! # Components
//!
//! - `schema`: the fixed `PricingData` field table
//! - `codec`: base64 + tagged-field decoding into quote records
//! - `messages`: subscription announcements and inbound envelopes
//! - `client`: connection manager and session task

pub mod client;
pub mod codec;
pub mod messages;
pub mod schema;

pub use client::{ConnectionState, QuoteStream, StreamError};
pub use codec::{DecodeError, QuoteDecoder, encode_frame, encode_quote};
pub use messages::{FrameEnvelope, SubscribeRequest};
pub use schema::{FieldKind, QuoteField, Schema, SchemaError};
