//! Quote Classification Enums
//!
//! Closed enumerations carried as `int32` codes on the wire. Codes the
//! client does not know decode to `Unrecognized(code)` and render as the
//! label `"UNKNOWN"`; they never fail a decode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Label used for codes outside the known table.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Error returned when parsing an enum from an unknown label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {label}")]
pub struct ParseLabelError {
    kind: &'static str,
    label: String,
}

/// Generates a wire enum with `from_code`/`code`/`as_str`, `FromStr`,
/// `Display` and label-based serde.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Code not present in the known table (raw code retained).
            Unrecognized(i32),
        }

        impl $name {
            /// Map a wire code to a variant. Unknown codes are kept as `Unrecognized`.
            #[must_use]
            pub const fn from_code(code: i32) -> Self {
                match code {
                    $( $code => Self::$variant, )+
                    other => Self::Unrecognized(other),
                }
            }

            /// The wire code of this variant.
            #[must_use]
            pub const fn code(self) -> i32 {
                match self {
                    $( Self::$variant => $code, )+
                    Self::Unrecognized(code) => code,
                }
            }

            /// Text label, `"UNKNOWN"` for unrecognized codes.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                    Self::Unrecognized(_) => UNKNOWN_LABEL,
                }
            }

            /// Whether the code was outside the known table.
            #[must_use]
            pub const fn is_unrecognized(self) -> bool {
                matches!(self, Self::Unrecognized(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::from_code(0)
            }
        }

        impl From<i32> for $name {
            fn from(code: i32) -> Self {
                Self::from_code(code)
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> Self {
                value.code()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $label => Ok(Self::$variant), )+
                    "UNRECOGNIZED" | UNKNOWN_LABEL => Ok(Self::Unrecognized(-1)),
                    other => Err(ParseLabelError {
                        kind: $kind,
                        label: other.to_string(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match LabelOrCode::deserialize(deserializer)? {
                    LabelOrCode::Code(code) => Ok(Self::from_code(code)),
                    // Labels outside the table follow the same rule as codes.
                    LabelOrCode::Label(label) => {
                        Ok(label.parse().unwrap_or(Self::Unrecognized(-1)))
                    }
                }
            }
        }
    };
}

/// JSON accepts either the numeric code or the label.
#[derive(Deserialize)]
#[serde(untagged)]
enum LabelOrCode {
    Code(i32),
    Label(String),
}

wire_enum! {
    /// Instrument classification of a quote.
    QuoteType, "quote type" {
        /// No classification.
        None = 0 => "NONE",
        /// Alternate symbol.
        AltSymbol = 5 => "ALTSYMBOL",
        /// Keep-alive quote with no market content.
        Heartbeat = 7 => "HEARTBEAT",
        /// Common stock.
        Equity = 8 => "EQUITY",
        /// Market index.
        Index = 9 => "INDEX",
        /// Mutual fund.
        MutualFund = 11 => "MUTUALFUND",
        /// Money market fund.
        MoneyMarket = 12 => "MONEYMARKET",
        /// Listed option.
        Option = 13 => "OPTION",
        /// Currency pair.
        Currency = 14 => "CURRENCY",
        /// Warrant.
        Warrant = 15 => "WARRANT",
        /// Bond.
        Bond = 17 => "BOND",
        /// Future.
        Future = 18 => "FUTURE",
        /// Exchange-traded fund.
        Etf = 20 => "ETF",
        /// Commodity.
        Commodity = 23 => "COMMODITY",
        /// ECN quote.
        EcnQuote = 28 => "ECNQUOTE",
        /// Cryptocurrency.
        Cryptocurrency = 41 => "CRYPTOCURRENCY",
        /// Indicator.
        Indicator = 42 => "INDICATOR",
        /// Industry aggregate.
        Industry = 1000 => "INDUSTRY",
    }
}

wire_enum! {
    /// Trading session a quote was produced in.
    MarketHours, "market hours" {
        /// Pre-market session.
        PreMarket = 0 => "PRE_MARKET",
        /// Regular session.
        RegularMarket = 1 => "REGULAR_MARKET",
        /// Post-market session.
        PostMarket = 2 => "POST_MARKET",
        /// Extended hours.
        ExtendedHoursMarket = 3 => "EXTENDED_HOURS_MARKET",
    }
}

wire_enum! {
    /// Option right.
    OptionType, "option type" {
        /// Call option.
        Call = 0 => "CALL",
        /// Put option.
        Put = 1 => "PUT",
    }
}
