//! Quote Record Types
//!
//! The decoded snapshot of one streamed quote update. A record is built
//! once per inbound frame and never mutated afterwards by the client.
//!
//! # Integer precision
//!
//! Count, volume and timestamp fields arrive as 64-bit zig-zag integers.
//! They are held as `i64` but the decoder only admits magnitudes up to
//! [`MAX_SAFE_INTEGER`], so every integer in a record converts to `f64`
//! (and therefore to JSON numbers) without loss. Larger values are a
//! decode error rather than a silently rounded number.

mod enums;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use enums::{MarketHours, OptionType, ParseLabelError, QuoteType, UNKNOWN_LABEL};

/// Largest integer magnitude exactly representable as an `f64` (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// One decoded quote update.
///
/// Field names in the JSON form follow the upstream wire names
/// (`quoteType`, `vol24hr`, `fromcurrency`, `marketcap`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuoteRecord {
    /// Ticker symbol the update belongs to.
    pub id: String,
    /// Last price.
    pub price: f32,
    /// Update time, milliseconds since the Unix epoch.
    pub time: i64,
    /// Quote currency.
    pub currency: String,
    /// Exchange code.
    pub exchange: String,
    /// Instrument classification.
    pub quote_type: QuoteType,
    /// Session the update was produced in.
    pub market_hours: MarketHours,
    /// Change since previous close, percent.
    pub change_percent: f32,
    /// Volume traded today.
    pub day_volume: i64,
    /// Session high.
    pub day_high: f32,
    /// Session low.
    pub day_low: f32,
    /// Absolute change since previous close.
    pub change: f32,
    /// Display name.
    pub short_name: String,
    /// Option expiry, seconds since the Unix epoch.
    pub expire_date: i64,
    /// Opening price.
    pub open_price: f32,
    /// Previous session close.
    pub previous_close: f32,
    /// Option strike.
    pub strike_price: f32,
    /// Underlying of a derivative.
    pub underlying_symbol: String,
    /// Option open interest.
    pub open_interest: i64,
    /// Option right.
    pub options_type: OptionType,
    /// Mini option flag/size as sent upstream.
    pub mini_option: i64,
    /// Size of the last trade.
    pub last_size: i64,
    /// Best bid.
    pub bid: f32,
    /// Size at best bid.
    pub bid_size: i64,
    /// Best ask.
    pub ask: f32,
    /// Size at best ask.
    pub ask_size: i64,
    /// Number of decimals to display.
    pub price_hint: i64,
    /// Rolling 24h volume (crypto).
    #[serde(rename = "vol24hr")]
    pub vol_24hr: i64,
    /// Volume across all currencies (crypto).
    pub vol_all_currencies: i64,
    /// Base currency of a pair (crypto).
    #[serde(rename = "fromcurrency")]
    pub from_currency: String,
    /// Market the last trade printed on (crypto).
    pub last_market: String,
    /// Circulating supply (crypto).
    pub circulating_supply: f64,
    /// Market capitalisation.
    #[serde(rename = "marketcap")]
    pub market_cap: f64,
}

impl QuoteRecord {
    /// Update time as a UTC timestamp, if `time` is in range.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }

    /// Option expiry as a UTC timestamp. `None` when unset or out of range.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        if self.expire_date == 0 {
            return None;
        }
        DateTime::from_timestamp(self.expire_date, 0)
    }

    /// Whether the update describes an option contract.
    #[must_use]
    pub fn is_option(&self) -> bool {
        self.quote_type == QuoteType::Option
    }

    /// Whether the update is a keep-alive rather than market data.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.quote_type == QuoteType::Heartbeat
    }

    /// Serialize to the labelled JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if a float field is not representable in JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the labelled JSON form. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object of this shape.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_option() -> QuoteRecord {
        QuoteRecord {
            id: "AAPL250620C00200000".to_string(),
            price: 12.5,
            time: 1_718_000_000_000,
            currency: "USD".to_string(),
            exchange: "OPR".to_string(),
            quote_type: QuoteType::Option,
            market_hours: MarketHours::RegularMarket,
            expire_date: 1_750_377_600,
            strike_price: 200.0,
            underlying_symbol: "AAPL".to_string(),
            open_interest: 1_520,
            options_type: OptionType::Call,
            ..QuoteRecord::default()
        }
    }

    #[test]
    fn defaults_are_empty_and_zero() {
        let record = QuoteRecord::default();
        assert!(record.id.is_empty());
        assert_eq!(record.time, 0);
        assert_eq!(record.quote_type, QuoteType::None);
        assert_eq!(record.market_hours, MarketHours::PreMarket);
        assert_eq!(record.options_type, OptionType::Call);
        assert!(record.expiry().is_none());
    }

    #[test]
    fn timestamp_helpers() {
        let record = sample_option();
        let ts = record.timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_718_000_000_000);

        let expiry = record.expiry().unwrap();
        assert_eq!(expiry.timestamp(), 1_750_377_600);
        assert!(record.is_option());
        assert!(!record.is_heartbeat());
    }

    #[test]
    fn json_uses_wire_names_and_labels() {
        let mut record = sample_option();
        record.vol_24hr = 10;
        record.from_currency = "BTC".to_string();
        record.market_cap = 1.5e12;

        let json = record.to_json().unwrap();
        assert!(json.contains(r#""quoteType":"OPTION""#));
        assert!(json.contains(r#""marketHours":"REGULAR_MARKET""#));
        assert!(json.contains(r#""optionsType":"CALL""#));
        assert!(json.contains(r#""vol24hr":10"#));
        assert!(json.contains(r#""fromcurrency":"BTC""#));
        assert!(json.contains(r#""marketcap":"#));
        assert!(json.contains(r#""underlyingSymbol":"AAPL""#));
    }

    #[test]
    fn json_round_trip_preserves_record() {
        let record = sample_option();
        let parsed = QuoteRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let parsed = QuoteRecord::from_json(r#"{"id":"MSFT","quoteType":8,"price":411.5}"#).unwrap();
        assert_eq!(parsed.id, "MSFT");
        assert_eq!(parsed.quote_type, QuoteType::Equity);
        assert!((parsed.price - 411.5).abs() < f32::EPSILON);
        assert_eq!(parsed.day_volume, 0);
        assert!(parsed.currency.is_empty());
    }

    #[test]
    fn unrecognized_enum_renders_unknown() {
        let record = QuoteRecord {
            quote_type: QuoteType::from_code(999),
            ..QuoteRecord::default()
        };
        let json = record.to_json().unwrap();
        assert!(json.contains(r#""quoteType":"UNKNOWN""#));
    }
}
