//! PostgreSQL binary COPY encoding.
//!
//! Layout: an 11-byte signature, a 32-bit flags word and a 32-bit header
//! extension length; then per row a 16-bit field count followed by
//! length-prefixed fields (-1 for NULL); then a 16-bit -1 trailer.

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

use crate::core::value::SqlValue;

const SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";

/// `NaiveDate::num_days_from_ce` of 2000-01-01, the PostgreSQL epoch.
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

const MICROS_PER_DAY: i64 = 86_400_000_000;

const NUMERIC_POS: i16 = 0x0000;
const NUMERIC_NEG: i16 = 0x4000;

pub(crate) fn put_header(buf: &mut BytesMut) {
    buf.put_slice(SIGNATURE);
    buf.put_i32(0); // flags
    buf.put_i32(0); // extension area length
}

pub(crate) fn put_trailer(buf: &mut BytesMut) {
    buf.put_i16(-1);
}

/// Append one row. On error the buffer is left as it was.
pub(crate) fn put_row(buf: &mut BytesMut, values: &[SqlValue<'_>]) -> Result<(), String> {
    let start = buf.len();
    buf.put_i16(values.len() as i16);
    for value in values {
        if let Err(e) = put_value(buf, value) {
            buf.truncate(start);
            return Err(e);
        }
    }
    Ok(())
}

fn put_value(buf: &mut BytesMut, value: &SqlValue<'_>) -> Result<(), String> {
    match value {
        SqlValue::Null(_) => buf.put_i32(-1),
        SqlValue::Bool(b) => {
            buf.put_i32(1);
            buf.put_u8(u8::from(*b));
        }
        SqlValue::I16(i) => {
            buf.put_i32(2);
            buf.put_i16(*i);
        }
        SqlValue::I32(i) => {
            buf.put_i32(4);
            buf.put_i32(*i);
        }
        SqlValue::I64(i) => {
            buf.put_i32(8);
            buf.put_i64(*i);
        }
        SqlValue::F32(f) => {
            buf.put_i32(4);
            buf.put_f32(*f);
        }
        SqlValue::F64(f) => {
            buf.put_i32(8);
            buf.put_f64(*f);
        }
        SqlValue::Text(s) => {
            if s.contains('\0') {
                put_bytes(buf, s.replace('\0', "").as_bytes())?;
            } else {
                put_bytes(buf, s.as_bytes())?;
            }
        }
        SqlValue::Bytes(b) => put_bytes(buf, b)?,
        SqlValue::Bits(bits) => put_bits(buf, bits),
        SqlValue::Decimal(d) => put_numeric(buf, d),
        SqlValue::Date(d) => {
            buf.put_i32(4);
            buf.put_i32(pg_days(d));
        }
        SqlValue::Time(t) => {
            buf.put_i32(8);
            buf.put_i64(micros_since_midnight(t));
        }
        SqlValue::DateTime(dt) => {
            buf.put_i32(8);
            buf.put_i64(pg_timestamp(dt));
        }
    }
    Ok(())
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) -> Result<(), String> {
    buf.put_i32(field_len(bytes.len())?);
    buf.put_slice(bytes);
    Ok(())
}

/// COPY field lengths are signed 32-bit.
fn field_len(len: usize) -> Result<i32, String> {
    i32::try_from(len).map_err(|_| {
        format!(
            "value of {} bytes exceeds the {} byte COPY field limit",
            len,
            i32::MAX
        )
    })
}

/// varbit: bit count, then the bits packed MSB-first, zero padded.
fn put_bits(buf: &mut BytesMut, bits: &str) {
    let packed: Vec<u8> = bits
        .as_bytes()
        .chunks(8)
        .map(|chunk| {
            let byte = chunk.iter().fold(0u8, |acc, b| (acc << 1) | u8::from(*b == b'1'));
            byte << (8 - chunk.len())
        })
        .collect();
    buf.put_i32(4 + packed.len() as i32);
    buf.put_i32(bits.len() as i32);
    buf.put_slice(&packed);
}

fn pg_days(d: &NaiveDate) -> i32 {
    d.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE
}

fn micros_since_midnight(t: &NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) * 1_000_000 + i64::from(t.nanosecond() / 1_000)
}

fn pg_timestamp(dt: &NaiveDateTime) -> i64 {
    i64::from(pg_days(&dt.date())) * MICROS_PER_DAY + micros_since_midnight(&dt.time())
}

/// NUMERIC: digit count, weight of the first base-10000 digit, sign,
/// display scale, then the base-10000 digits.
fn put_numeric(buf: &mut BytesMut, d: &Decimal) {
    let abs = d.abs().to_string();
    let (int_part, frac_part) = abs.split_once('.').unwrap_or((abs.as_str(), ""));
    let int_part = int_part.trim_start_matches('0');

    // Align both halves on the decimal point in groups of four.
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let aligned = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_part,
        frac_part,
        "0".repeat(frac_pad)
    );

    let mut digits: Vec<i16> = aligned
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0')))
        .collect();
    let mut weight = ((int_pad + int_part.len()) / 4) as i16 - 1;

    let leading = digits.iter().take_while(|&&g| g == 0).count();
    digits.drain(..leading);
    weight -= leading as i16;
    while digits.last() == Some(&0) {
        digits.pop();
    }

    let (weight, sign) = if digits.is_empty() {
        (0, NUMERIC_POS)
    } else if d.is_sign_negative() {
        (weight, NUMERIC_NEG)
    } else {
        (weight, NUMERIC_POS)
    };

    buf.put_i32(8 + 2 * digits.len() as i32);
    buf.put_i16(digits.len() as i16);
    buf.put_i16(weight);
    buf.put_i16(sign);
    buf.put_i16(d.scale() as i16);
    for digit in digits {
        buf.put_i16(digit);
    }
}
