//! SQL value types for engine-neutral row transfer.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Type hint for NULL values so binary encoders know the column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Bits,
    Decimal,
    DateTime,
    Date,
    Time,
}

/// One decoded column value.
///
/// Uses `Cow` for string and byte data so rows can borrow from a source
/// buffer; values that cross a channel are `'static`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with type hint for correct wire format encoding.
    Null(SqlNullType),

    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    Text(Cow<'a, str>),

    Bytes(Cow<'a, [u8]>),

    /// Bit string as `0`/`1` characters, most significant bit first.
    Bits(Cow<'a, str>),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    Date(NaiveDate),

    Time(NaiveTime),
}

/// A row in column order.
pub type Row = Vec<SqlValue<'static>>;

impl<'a> SqlValue<'a> {
    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Create a bytes value from an owned Vec<u8>.
    #[must_use]
    pub fn bytes_owned(b: Vec<u8>) -> SqlValue<'static> {
        SqlValue::Bytes(Cow::Owned(b))
    }

    /// Render the low `width` bits of `bytes` (big-endian) as a bit string.
    #[must_use]
    pub fn bits_from_bytes(bytes: &[u8], width: u32) -> SqlValue<'static> {
        let mut all = String::with_capacity(bytes.len() * 8);
        for byte in bytes {
            all.push_str(&format!("{:08b}", byte));
        }
        let width = if width == 0 { all.len() } else { width as usize };
        let bits = if all.len() > width {
            all.split_off(all.len() - width)
        } else {
            format!("{}{}", "0".repeat(width - all.len()), all)
        };
        SqlValue::Bits(Cow::Owned(bits))
    }
}

/// A batch of rows moving from the reader task to the cursor.
#[derive(Debug, Default)]
pub struct Batch {
    pub rows: Vec<Row>,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}
