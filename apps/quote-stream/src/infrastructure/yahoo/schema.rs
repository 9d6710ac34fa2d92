//! Pricing Message Schema
//!
//! The fixed field contract of the upstream `PricingData` message: which
//! field number carries which record attribute, and with which wire
//! encoding. The decoder dispatches through this table; it is validated
//! once, the first time a connection is made.
//!
//! ```text
//!  #  name               encoding      #  name                encoding
//!  1  id                 string       18  underlyingSymbol    string
//!  2  price              float        19  openInterest        sint64
//!  3  time               sint64       20  optionsType         int32 enum
//!  4  currency           string       21  miniOption          sint64
//!  5  exchange           string       22  lastSize            sint64
//!  6  quoteType          int32 enum   23  bid                 float
//!  7  marketHours        int32 enum   24  bidSize             sint64
//!  8  changePercent      float        25  ask                 float
//!  9  dayVolume          sint64       26  askSize             sint64
//! 10  dayHigh            float        27  priceHint           sint64
//! 11  dayLow             float        28  vol_24hr            sint64
//! 12  change             float        29  volAllCurrencies    sint64
//! 13  shortName          string       30  fromcurrency        string
//! 14  expireDate         sint64       31  lastMarket          string
//! 15  openPrice          float        32  circulatingSupply   double
//! 16  previousClose      float        33  marketcap           double
//! 17  strikePrice        float
//! ```

use std::collections::HashSet;
use std::sync::OnceLock;

use prost::encoding::WireType;

/// Largest field number the tagged-field encoding allows.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Value encoding of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8, length-prefixed.
    String,
    /// 32-bit IEEE float, little endian.
    Float,
    /// 64-bit IEEE double, little endian.
    Double,
    /// Zig-zag varint, 64-bit.
    SInt64,
    /// Plain varint, 32-bit, carrying an enum code.
    Enum,
}

impl FieldKind {
    /// Wire type this kind is encoded with.
    #[must_use]
    pub const fn wire_type(self) -> WireType {
        match self {
            Self::String => WireType::LengthDelimited,
            Self::Float => WireType::ThirtyTwoBit,
            Self::Double => WireType::SixtyFourBit,
            Self::SInt64 | Self::Enum => WireType::Varint,
        }
    }
}

/// Every attribute of a quote record, keyed by wire field number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum QuoteField {
    Id,
    Price,
    Time,
    Currency,
    Exchange,
    QuoteType,
    MarketHours,
    ChangePercent,
    DayVolume,
    DayHigh,
    DayLow,
    Change,
    ShortName,
    ExpireDate,
    OpenPrice,
    PreviousClose,
    StrikePrice,
    UnderlyingSymbol,
    OpenInterest,
    OptionsType,
    MiniOption,
    LastSize,
    Bid,
    BidSize,
    Ask,
    AskSize,
    PriceHint,
    Vol24hr,
    VolAllCurrencies,
    FromCurrency,
    LastMarket,
    CirculatingSupply,
    MarketCap,
}

impl QuoteField {
    /// All fields in wire-number order.
    pub const ALL: [Self; 33] = [
        Self::Id,
        Self::Price,
        Self::Time,
        Self::Currency,
        Self::Exchange,
        Self::QuoteType,
        Self::MarketHours,
        Self::ChangePercent,
        Self::DayVolume,
        Self::DayHigh,
        Self::DayLow,
        Self::Change,
        Self::ShortName,
        Self::ExpireDate,
        Self::OpenPrice,
        Self::PreviousClose,
        Self::StrikePrice,
        Self::UnderlyingSymbol,
        Self::OpenInterest,
        Self::OptionsType,
        Self::MiniOption,
        Self::LastSize,
        Self::Bid,
        Self::BidSize,
        Self::Ask,
        Self::AskSize,
        Self::PriceHint,
        Self::Vol24hr,
        Self::VolAllCurrencies,
        Self::FromCurrency,
        Self::LastMarket,
        Self::CirculatingSupply,
        Self::MarketCap,
    ];

    /// Wire field number.
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::Id => 1,
            Self::Price => 2,
            Self::Time => 3,
            Self::Currency => 4,
            Self::Exchange => 5,
            Self::QuoteType => 6,
            Self::MarketHours => 7,
            Self::ChangePercent => 8,
            Self::DayVolume => 9,
            Self::DayHigh => 10,
            Self::DayLow => 11,
            Self::Change => 12,
            Self::ShortName => 13,
            Self::ExpireDate => 14,
            Self::OpenPrice => 15,
            Self::PreviousClose => 16,
            Self::StrikePrice => 17,
            Self::UnderlyingSymbol => 18,
            Self::OpenInterest => 19,
            Self::OptionsType => 20,
            Self::MiniOption => 21,
            Self::LastSize => 22,
            Self::Bid => 23,
            Self::BidSize => 24,
            Self::Ask => 25,
            Self::AskSize => 26,
            Self::PriceHint => 27,
            Self::Vol24hr => 28,
            Self::VolAllCurrencies => 29,
            Self::FromCurrency => 30,
            Self::LastMarket => 31,
            Self::CirculatingSupply => 32,
            Self::MarketCap => 33,
        }
    }

    /// Upstream field name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Price => "price",
            Self::Time => "time",
            Self::Currency => "currency",
            Self::Exchange => "exchange",
            Self::QuoteType => "quoteType",
            Self::MarketHours => "marketHours",
            Self::ChangePercent => "changePercent",
            Self::DayVolume => "dayVolume",
            Self::DayHigh => "dayHigh",
            Self::DayLow => "dayLow",
            Self::Change => "change",
            Self::ShortName => "shortName",
            Self::ExpireDate => "expireDate",
            Self::OpenPrice => "openPrice",
            Self::PreviousClose => "previousClose",
            Self::StrikePrice => "strikePrice",
            Self::UnderlyingSymbol => "underlyingSymbol",
            Self::OpenInterest => "openInterest",
            Self::OptionsType => "optionsType",
            Self::MiniOption => "miniOption",
            Self::LastSize => "lastSize",
            Self::Bid => "bid",
            Self::BidSize => "bidSize",
            Self::Ask => "ask",
            Self::AskSize => "askSize",
            Self::PriceHint => "priceHint",
            Self::Vol24hr => "vol_24hr",
            Self::VolAllCurrencies => "volAllCurrencies",
            Self::FromCurrency => "fromcurrency",
            Self::LastMarket => "lastMarket",
            Self::CirculatingSupply => "circulatingSupply",
            Self::MarketCap => "marketcap",
        }
    }

    /// Value encoding.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Id
            | Self::Currency
            | Self::Exchange
            | Self::ShortName
            | Self::UnderlyingSymbol
            | Self::FromCurrency
            | Self::LastMarket => FieldKind::String,
            Self::Price
            | Self::ChangePercent
            | Self::DayHigh
            | Self::DayLow
            | Self::Change
            | Self::OpenPrice
            | Self::PreviousClose
            | Self::StrikePrice
            | Self::Bid
            | Self::Ask => FieldKind::Float,
            Self::CirculatingSupply | Self::MarketCap => FieldKind::Double,
            Self::QuoteType | Self::MarketHours | Self::OptionsType => FieldKind::Enum,
            Self::Time
            | Self::DayVolume
            | Self::ExpireDate
            | Self::OpenInterest
            | Self::MiniOption
            | Self::LastSize
            | Self::BidSize
            | Self::AskSize
            | Self::PriceHint
            | Self::Vol24hr
            | Self::VolAllCurrencies => FieldKind::SInt64,
        }
    }
}

/// Schema validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The field table is empty.
    #[error("schema has no fields")]
    Empty,

    /// Field number outside `1..=MAX_FIELD_NUMBER`.
    #[error("field {name} has invalid number {number}")]
    InvalidFieldNumber {
        /// Field name.
        name: &'static str,
        /// Offending number.
        number: u32,
    },

    /// Two fields share a number.
    #[error("field number {0} is assigned twice")]
    DuplicateFieldNumber(u32),

    /// Two fields share a name.
    #[error("field name {0} is assigned twice")]
    DuplicateFieldName(&'static str),
}

/// Validated field lookup, indexed by wire field number.
#[derive(Debug, Clone)]
pub struct Schema {
    by_number: Vec<Option<QuoteField>>,
}

static PRICING_DATA: OnceLock<Result<Schema, SchemaError>> = OnceLock::new();

impl Schema {
    /// The validated `PricingData` schema, built on first use.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the built-in table is inconsistent.
    /// The result is cached; a failure is reported on every call and never
    /// re-evaluated.
    pub fn load() -> Result<&'static Self, SchemaError> {
        PRICING_DATA
            .get_or_init(|| Self::from_fields(&QuoteField::ALL))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Validate a field table and build the lookup.
    ///
    /// # Errors
    ///
    /// Returns an error on an empty table, an out-of-range number, or a
    /// duplicated number or name.
    pub fn from_fields(fields: &[QuoteField]) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut names = HashSet::with_capacity(fields.len());
        let mut by_number: Vec<Option<QuoteField>> = Vec::new();

        for &field in fields {
            let number = field.number();
            if number == 0 || number > MAX_FIELD_NUMBER {
                return Err(SchemaError::InvalidFieldNumber {
                    name: field.name(),
                    number,
                });
            }
            if !names.insert(field.name()) {
                return Err(SchemaError::DuplicateFieldName(field.name()));
            }

            let index = number as usize;
            if by_number.len() <= index {
                by_number.resize(index + 1, None);
            }
            if by_number[index].is_some() {
                return Err(SchemaError::DuplicateFieldNumber(number));
            }
            by_number[index] = Some(field);
        }

        Ok(Self { by_number })
    }

    /// Field for a wire number, if the schema knows it.
    #[must_use]
    pub fn field(&self, number: u32) -> Option<QuoteField> {
        self.by_number.get(number as usize).copied().flatten()
    }

    /// Number of known fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_number.iter().flatten().count()
    }

    /// Whether the schema knows no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
