//! SQL literal rendering for the row-wise INSERT path.
//!
//! Output assumes `standard_conforming_strings = on`: backslashes inside
//! quoted strings are literal and only `'` needs doubling.

use crate::core::types::Type;
use crate::core::value::SqlValue;

/// Render `value` as a PostgreSQL literal for a column of type `ty`.
///
/// Numbers are unquoted, text and temporal values are quoted and escaped,
/// NULL is explicit. The column type decides when the value's own shape
/// disagrees (an integer in a boolean column, a number in a text column).
pub fn to_literal(value: &SqlValue<'_>, ty: &Type) -> String {
    match (ty, value) {
        (_, SqlValue::Null(_)) => "NULL".to_string(),
        (Type::Bool, v) => match integer(v) {
            Some(i) => bool_literal(i != 0),
            None => render(v),
        },
        (Type::Text { .. } | Type::PaddedText { .. } | Type::Set | Type::Opaque(_), v) => {
            match v {
                SqlValue::Text(_) | SqlValue::Null(_) => render(v),
                SqlValue::Bytes(b) => quote(&String::from_utf8_lossy(b)),
                other => quote(&display(other)),
            }
        }
        (Type::Blob, SqlValue::Text(s)) => bytea(s.as_bytes()),
        (_, v) => render(v),
    }
}

/// Literal for a value based on its own shape.
fn render(value: &SqlValue<'_>) -> String {
    match value {
        SqlValue::Null(_) => "NULL".to_string(),
        SqlValue::Bool(b) => bool_literal(*b),
        SqlValue::F32(f) => float(f64::from(*f)),
        SqlValue::F64(f) => float(*f),
        SqlValue::Text(s) => quote(s),
        SqlValue::Bytes(b) => bytea(b),
        SqlValue::Bits(bits) => format!("B'{}'", bits),
        SqlValue::Date(_) | SqlValue::Time(_) | SqlValue::DateTime(_) => quote(&display(value)),
        SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) | SqlValue::Decimal(_) => {
            display(value)
        }
    }
}

/// Plain text form of a non-NULL value.
fn display(value: &SqlValue<'_>) -> String {
    match value {
        SqlValue::Null(_) => String::new(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::I16(i) => i.to_string(),
        SqlValue::I32(i) => i.to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F32(f) => f.to_string(),
        SqlValue::F64(f) => f.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::Text(s) => s.to_string(),
        SqlValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        SqlValue::Bits(bits) => bits.to_string(),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
    }
}

fn integer(value: &SqlValue<'_>) -> Option<i64> {
    match value {
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::I16(i) => Some(i64::from(*i)),
        SqlValue::I32(i) => Some(i64::from(*i)),
        SqlValue::I64(i) => Some(*i),
        _ => None,
    }
}

fn bool_literal(b: bool) -> String {
    if b { "TRUE" } else { "FALSE" }.to_string()
}

fn float(f: f64) -> String {
    if f.is_nan() {
        "'NaN'".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "'Infinity'" } else { "'-Infinity'" }.to_string()
    } else {
        f.to_string()
    }
}

/// Single-quoted string. NUL characters are dropped; PostgreSQL text cannot
/// hold them.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\0' => {}
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn bytea(bytes: &[u8]) -> String {
    format!("'\\x{}'", hex::encode(bytes))
}
