//! Streamer Message Types
//!
//! JSON shapes exchanged with the quote streamer besides the quote payload
//! itself.
//!
//! # Outbound
//! - `{"subscribe": ["AAPL", "MSFT"]}`: full replacement of the
//!   server-side subscription set
//!
//! # Inbound
//! - Bare base64 text, or an envelope `{"type": "pricing", "message": "..."}`
//!   carrying the same base64 string

use serde::{Deserialize, Serialize};

use crate::domain::tickers::TickerSet;

/// Subscription announcement. Always carries the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Symbols the server should stream.
    pub subscribe: Vec<String>,
}

impl SubscribeRequest {
    /// Announcement for the current contents of `tickers`.
    #[must_use]
    pub fn for_tickers(tickers: &TickerSet) -> Self {
        Self {
            subscribe: tickers.to_vec(),
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSON envelope around a base64 quote payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameEnvelope {
    /// Payload kind, `pricing` for quotes.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Base64 payload.
    #[serde(alias = "data")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_json() {
        let tickers: TickerSet = ["AAPL", "BTC-USD"].into_iter().collect();
        let json = SubscribeRequest::for_tickers(&tickers).to_json().unwrap();
        assert_eq!(json, r#"{"subscribe":["AAPL","BTC-USD"]}"#);
    }

    #[test]
    fn empty_subscribe_request_json() {
        let json = SubscribeRequest::for_tickers(&TickerSet::new())
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"subscribe":[]}"#);
    }

    #[test]
    fn envelope_accepts_message_or_data() {
        let a: FrameEnvelope =
            serde_json::from_str(r#"{"type":"pricing","message":"CgRBQVBM"}"#).unwrap();
        assert_eq!(a.kind.as_deref(), Some("pricing"));
        assert_eq!(a.message, "CgRBQVBM");

        let b: FrameEnvelope = serde_json::from_str(r#"{"data":"CgRBQVBM"}"#).unwrap();
        assert!(b.kind.is_none());
        assert_eq!(b.message, "CgRBQVBM");
    }
}
