//! Quote Frame Codec
//!
//! Decodes streamed quote frames into [`QuoteRecord`]s.
//!
//! # Frame Format
//!
//! Each inbound WebSocket text frame carries one base64 string, either bare
//! or wrapped in a JSON envelope (`{"type":"pricing","message":"..."}`).
//! The decoded bytes are a tagged-field message: a sequence of
//! `key = field_number << 3 | wire_type` varints, each followed by a value
//! in the encoding the wire type names.
//!
//! Unknown field numbers, and known numbers arriving with an unexpected
//! wire type, are skipped. Absent fields keep their defaults. Decoding
//! fails only on malformed bytes or an integer outside the safe range.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use prost::bytes::{Buf, BufMut};
use prost::encoding::{DecodeContext, WireType, decode_varint, encode_key, encode_varint};

use super::messages::FrameEnvelope;
use super::schema::{MAX_FIELD_NUMBER, QuoteField, Schema, SchemaError};
use crate::domain::quote::{
    MAX_SAFE_INTEGER, MarketHours, OptionType, QuoteRecord, QuoteType,
};

/// Standard alphabet; padding optional on input, written on output.
const FRAME_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// =============================================================================
// Error Type
// =============================================================================

/// Frame decoding errors. Each malformation has its own kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// JSON envelope present but unusable.
    #[error("invalid frame envelope: {0}")]
    InvalidEnvelope(String),

    /// Payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Input ended inside a field key.
    #[error("truncated field tag at byte {offset}")]
    TruncatedTag {
        /// Byte offset of the key.
        offset: usize,
    },

    /// Key names a wire type that cannot appear here.
    #[error("invalid wire type {wire_type} at byte {offset}")]
    InvalidWireType {
        /// Raw wire type bits.
        wire_type: u64,
        /// Byte offset of the key.
        offset: usize,
    },

    /// Key names field number zero or one beyond the allowed range.
    #[error("invalid field number {number} at byte {offset}")]
    InvalidFieldNumber {
        /// Raw field number.
        number: u64,
        /// Byte offset of the key.
        offset: usize,
    },

    /// Input ended inside the length prefix of a length-delimited field.
    #[error("truncated length prefix for field {field} at byte {offset}")]
    TruncatedLength {
        /// Field number.
        field: u32,
        /// Byte offset of the prefix.
        offset: usize,
    },

    /// Input ended inside a field value.
    #[error("truncated value for field {field} at byte {offset}")]
    TruncatedValue {
        /// Field number.
        field: u32,
        /// Byte offset of the value.
        offset: usize,
    },

    /// String field is not UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field name.
        field: &'static str,
    },

    /// 64-bit integer outside `±MAX_SAFE_INTEGER`.
    #[error("field {field} value {value} exceeds the safe integer range")]
    IntegerOverflow {
        /// Field name.
        field: &'static str,
        /// Decoded value.
        value: i64,
    },
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope(_) => "invalid_envelope",
            Self::InvalidBase64(_) => "invalid_base64",
            Self::TruncatedTag { .. } => "truncated_tag",
            Self::InvalidWireType { .. } => "invalid_wire_type",
            Self::InvalidFieldNumber { .. } => "invalid_field_number",
            Self::TruncatedLength { .. } => "truncated_length",
            Self::TruncatedValue { .. } => "truncated_value",
            Self::InvalidUtf8 { .. } => "invalid_utf8",
            Self::IntegerOverflow { .. } => "integer_overflow",
        }
    }
}

// =============================================================================
// Field Reader
// =============================================================================

/// Cursor over a tagged-field payload that tracks byte offsets for errors.
struct FieldReader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> FieldReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    const fn offset(&self) -> usize {
        self.total - self.buf.len()
    }

    const fn has_remaining(&self) -> bool {
        !self.buf.is_empty()
    }

    fn key(&mut self) -> Result<(u32, WireType), DecodeError> {
        let offset = self.offset();
        let key =
            decode_varint(&mut self.buf).map_err(|_| DecodeError::TruncatedTag { offset })?;

        let wire_type = WireType::try_from(key & 0x07).map_err(|_| {
            DecodeError::InvalidWireType {
                wire_type: key & 0x07,
                offset,
            }
        })?;

        let number = key >> 3;
        match u32::try_from(number) {
            Ok(n) if n != 0 && n <= MAX_FIELD_NUMBER => Ok((n, wire_type)),
            _ => Err(DecodeError::InvalidFieldNumber { number, offset }),
        }
    }

    fn varint(&mut self, field: u32) -> Result<u64, DecodeError> {
        let offset = self.offset();
        decode_varint(&mut self.buf).map_err(|_| DecodeError::TruncatedValue { field, offset })
    }

    fn ensure(&self, field: u32, needed: usize) -> Result<(), DecodeError> {
        if self.buf.len() < needed {
            return Err(DecodeError::TruncatedValue {
                field,
                offset: self.offset(),
            });
        }
        Ok(())
    }

    fn float(&mut self, field: u32) -> Result<f32, DecodeError> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_f32_le())
    }

    fn double(&mut self, field: u32) -> Result<f64, DecodeError> {
        self.ensure(field, 8)?;
        Ok(self.buf.get_f64_le())
    }

    fn bytes(&mut self, field: u32) -> Result<&'a [u8], DecodeError> {
        let offset = self.offset();
        let len = decode_varint(&mut self.buf)
            .map_err(|_| DecodeError::TruncatedLength { field, offset })?;
        let len = usize::try_from(len).map_err(|_| DecodeError::TruncatedValue {
            field,
            offset: self.offset(),
        })?;
        self.ensure(field, len)?;

        let (value, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(value)
    }

    fn string(&mut self, field: QuoteField) -> Result<String, DecodeError> {
        let bytes = self.bytes(field.number())?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 {
            field: field.name(),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn int32(&mut self, field: QuoteField) -> Result<i32, DecodeError> {
        // Negative int32 values are sign-extended to ten bytes on the wire.
        Ok(self.varint(field.number())? as i32)
    }

    fn sint64(&mut self, field: QuoteField) -> Result<i64, DecodeError> {
        let value = zigzag_decode(self.varint(field.number())?);
        if value.unsigned_abs() > MAX_SAFE_INTEGER.unsigned_abs() {
            return Err(DecodeError::IntegerOverflow {
                field: field.name(),
                value,
            });
        }
        Ok(value)
    }

    fn skip(&mut self, field: u32, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => self.varint(field).map(drop),
            WireType::SixtyFourBit => self.double(field).map(drop),
            WireType::ThirtyTwoBit => self.float(field).map(drop),
            WireType::LengthDelimited => self.bytes(field).map(drop),
            WireType::StartGroup => {
                let offset = self.offset();
                prost::encoding::skip_field(
                    wire_type,
                    field,
                    &mut self.buf,
                    DecodeContext::default(),
                )
                .map_err(|_| DecodeError::TruncatedValue { field, offset })
            }
            WireType::EndGroup => Err(DecodeError::InvalidWireType {
                wire_type: WireType::EndGroup as u64,
                offset: self.offset(),
            }),
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[allow(clippy::cast_sign_loss)]
const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

// =============================================================================
// Decoder
// =============================================================================

/// Stateless decoder for quote frames, bound to a validated schema.
#[derive(Debug, Clone, Copy)]
pub struct QuoteDecoder {
    schema: &'static Schema,
}

impl QuoteDecoder {
    /// Create a decoder over `schema`.
    #[must_use]
    pub const fn new(schema: &'static Schema) -> Self {
        Self { schema }
    }

    /// Create a decoder over the built-in pricing schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema fails validation.
    pub fn pricing_data() -> Result<Self, SchemaError> {
        Schema::load().map(Self::new)
    }

    /// Decode one WebSocket text frame: bare base64 or a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope, base64 or tagged fields are malformed.
    pub fn decode_frame(&self, frame: &str) -> Result<QuoteRecord, DecodeError> {
        let trimmed = frame.trim();
        if trimmed.starts_with('{') {
            let envelope: FrameEnvelope = serde_json::from_str(trimmed)
                .map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))?;
            self.decode(envelope.message.as_bytes())
        } else {
            self.decode(trimmed.as_bytes())
        }
    }

    /// Decode base64 text into a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64 or the tagged fields are malformed.
    pub fn decode(&self, raw: &[u8]) -> Result<QuoteRecord, DecodeError> {
        let payload = FRAME_BASE64.decode(raw.trim_ascii())?;
        self.decode_payload(&payload)
    }

    /// Decode already-unwrapped tagged-field bytes into a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the tagged fields are malformed.
    pub fn decode_payload(&self, payload: &[u8]) -> Result<QuoteRecord, DecodeError> {
        let mut reader = FieldReader::new(payload);
        let mut record = QuoteRecord::default();

        while reader.has_remaining() {
            let (number, wire_type) = reader.key()?;
            match self.schema.field(number) {
                Some(field) if field.kind().wire_type() == wire_type => {
                    read_field(&mut reader, &mut record, field)?;
                }
                _ => reader.skip(number, wire_type)?,
            }
        }

        Ok(record)
    }
}

fn read_field(
    reader: &mut FieldReader<'_>,
    record: &mut QuoteRecord,
    field: QuoteField,
) -> Result<(), DecodeError> {
    let n = field.number();
    match field {
        QuoteField::Id => record.id = reader.string(field)?,
        QuoteField::Price => record.price = reader.float(n)?,
        QuoteField::Time => record.time = reader.sint64(field)?,
        QuoteField::Currency => record.currency = reader.string(field)?,
        QuoteField::Exchange => record.exchange = reader.string(field)?,
        QuoteField::QuoteType => record.quote_type = QuoteType::from_code(reader.int32(field)?),
        QuoteField::MarketHours => {
            record.market_hours = MarketHours::from_code(reader.int32(field)?);
        }
        QuoteField::ChangePercent => record.change_percent = reader.float(n)?,
        QuoteField::DayVolume => record.day_volume = reader.sint64(field)?,
        QuoteField::DayHigh => record.day_high = reader.float(n)?,
        QuoteField::DayLow => record.day_low = reader.float(n)?,
        QuoteField::Change => record.change = reader.float(n)?,
        QuoteField::ShortName => record.short_name = reader.string(field)?,
        QuoteField::ExpireDate => record.expire_date = reader.sint64(field)?,
        QuoteField::OpenPrice => record.open_price = reader.float(n)?,
        QuoteField::PreviousClose => record.previous_close = reader.float(n)?,
        QuoteField::StrikePrice => record.strike_price = reader.float(n)?,
        QuoteField::UnderlyingSymbol => record.underlying_symbol = reader.string(field)?,
        QuoteField::OpenInterest => record.open_interest = reader.sint64(field)?,
        QuoteField::OptionsType => {
            record.options_type = OptionType::from_code(reader.int32(field)?);
        }
        QuoteField::MiniOption => record.mini_option = reader.sint64(field)?,
        QuoteField::LastSize => record.last_size = reader.sint64(field)?,
        QuoteField::Bid => record.bid = reader.float(n)?,
        QuoteField::BidSize => record.bid_size = reader.sint64(field)?,
        QuoteField::Ask => record.ask = reader.float(n)?,
        QuoteField::AskSize => record.ask_size = reader.sint64(field)?,
        QuoteField::PriceHint => record.price_hint = reader.sint64(field)?,
        QuoteField::Vol24hr => record.vol_24hr = reader.sint64(field)?,
        QuoteField::VolAllCurrencies => record.vol_all_currencies = reader.sint64(field)?,
        QuoteField::FromCurrency => record.from_currency = reader.string(field)?,
        QuoteField::LastMarket => record.last_market = reader.string(field)?,
        QuoteField::CirculatingSupply => record.circulating_supply = reader.double(n)?,
        QuoteField::MarketCap => record.market_cap = reader.double(n)?,
    }
    Ok(())
}

// =============================================================================
// Encoder
// =============================================================================

/// Encode a record as tagged-field bytes. Default-valued fields are omitted.
#[must_use]
pub fn encode_quote(record: &QuoteRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);

    put_string(&mut buf, QuoteField::Id, &record.id);
    put_float(&mut buf, QuoteField::Price, record.price);
    put_sint64(&mut buf, QuoteField::Time, record.time);
    put_string(&mut buf, QuoteField::Currency, &record.currency);
    put_string(&mut buf, QuoteField::Exchange, &record.exchange);
    put_enum(&mut buf, QuoteField::QuoteType, record.quote_type.code());
    put_enum(&mut buf, QuoteField::MarketHours, record.market_hours.code());
    put_float(&mut buf, QuoteField::ChangePercent, record.change_percent);
    put_sint64(&mut buf, QuoteField::DayVolume, record.day_volume);
    put_float(&mut buf, QuoteField::DayHigh, record.day_high);
    put_float(&mut buf, QuoteField::DayLow, record.day_low);
    put_float(&mut buf, QuoteField::Change, record.change);
    put_string(&mut buf, QuoteField::ShortName, &record.short_name);
    put_sint64(&mut buf, QuoteField::ExpireDate, record.expire_date);
    put_float(&mut buf, QuoteField::OpenPrice, record.open_price);
    put_float(&mut buf, QuoteField::PreviousClose, record.previous_close);
    put_float(&mut buf, QuoteField::StrikePrice, record.strike_price);
    put_string(&mut buf, QuoteField::UnderlyingSymbol, &record.underlying_symbol);
    put_sint64(&mut buf, QuoteField::OpenInterest, record.open_interest);
    put_enum(&mut buf, QuoteField::OptionsType, record.options_type.code());
    put_sint64(&mut buf, QuoteField::MiniOption, record.mini_option);
    put_sint64(&mut buf, QuoteField::LastSize, record.last_size);
    put_float(&mut buf, QuoteField::Bid, record.bid);
    put_sint64(&mut buf, QuoteField::BidSize, record.bid_size);
    put_float(&mut buf, QuoteField::Ask, record.ask);
    put_sint64(&mut buf, QuoteField::AskSize, record.ask_size);
    put_sint64(&mut buf, QuoteField::PriceHint, record.price_hint);
    put_sint64(&mut buf, QuoteField::Vol24hr, record.vol_24hr);
    put_sint64(&mut buf, QuoteField::VolAllCurrencies, record.vol_all_currencies);
    put_string(&mut buf, QuoteField::FromCurrency, &record.from_currency);
    put_string(&mut buf, QuoteField::LastMarket, &record.last_market);
    put_double(&mut buf, QuoteField::CirculatingSupply, record.circulating_supply);
    put_double(&mut buf, QuoteField::MarketCap, record.market_cap);

    buf
}

/// Encode a record as a base64 text frame, the form the streamer sends.
#[must_use]
pub fn encode_frame(record: &QuoteRecord) -> String {
    FRAME_BASE64.encode(encode_quote(record))
}

fn put_key(buf: &mut Vec<u8>, field: QuoteField) {
    encode_key(field.number(), field.kind().wire_type(), buf);
}

fn put_string(buf: &mut Vec<u8>, field: QuoteField, value: &str) {
    if value.is_empty() {
        return;
    }
    put_key(buf, field);
    encode_varint(value.len() as u64, buf);
    buf.put_slice(value.as_bytes());
}

fn put_float(buf: &mut Vec<u8>, field: QuoteField, value: f32) {
    // Positive zero only; -0.0 is a distinct value.
    if value.to_bits() == 0 {
        return;
    }
    put_key(buf, field);
    buf.put_f32_le(value);
}

fn put_double(buf: &mut Vec<u8>, field: QuoteField, value: f64) {
    if value.to_bits() == 0 {
        return;
    }
    put_key(buf, field);
    buf.put_f64_le(value);
}

fn put_sint64(buf: &mut Vec<u8>, field: QuoteField, value: i64) {
    if value == 0 {
        return;
    }
    put_key(buf, field);
    encode_varint(zigzag_encode(value), buf);
}

#[allow(clippy::cast_sign_loss)]
fn put_enum(buf: &mut Vec<u8>, field: QuoteField, code: i32) {
    if code == 0 {
        return;
    }
    put_key(buf, field);
    encode_varint(i64::from(code) as u64, buf);
}

// =============================================================================
// Tests
// =============================================================================
