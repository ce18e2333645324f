//! MySQL row decoding into typed values.
//!
//! Each column is decoded according to its generic type, not the wire type,
//! so the destination encoders see one value shape per column.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{Row, ValueRef};
use tracing::warn;

use crate::core::schema::{Column, Table};
use crate::core::types::{IntSize, Type};
use crate::core::value::{Row as ValueRow, SqlValue};
use crate::error::{MigrateError, Result};

/// Convert a MySQL row to values in the table's column order.
pub(crate) fn row_to_values(row: &MySqlRow, table: &Table) -> Result<ValueRow> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| decode_value(row, i, col).map_err(|msg| column_error(table, col, msg)))
        .collect()
}

fn column_error(table: &Table, col: &Column, message: String) -> MigrateError {
    MigrateError::transfer(
        &table.name,
        format!("column `{}` ({}): {}", col.name, col.source_type, message),
    )
}

fn decode_value(
    row: &MySqlRow,
    i: usize,
    col: &Column,
) -> std::result::Result<SqlValue<'static>, String> {
    let raw = row.try_get_raw(i).map_err(|e| e.to_string())?;
    if raw.is_null() {
        return Ok(SqlValue::Null(col.ty.null_type()));
    }

    match &col.ty {
        Type::Bool => Ok(SqlValue::Bool(integer(row, i)? != 0)),
        Type::Int(IntSize::Small) => narrow(integer(row, i)?).map(SqlValue::I16),
        Type::Int(IntSize::Normal) => narrow(integer(row, i)?).map(SqlValue::I32),
        Type::Int(IntSize::Large) => narrow(integer(row, i)?).map(SqlValue::I64),
        Type::Int(IntSize::Huge) => {
            let v = integer(row, i)?;
            Decimal::try_from_i128_with_scale(v, 0)
                .map(SqlValue::Decimal)
                .map_err(|_| format!("{} does not fit a decimal", v))
        }
        Type::Float => row
            .try_get::<f32, _>(i)
            .or_else(|_| row.try_get::<f64, _>(i).map(|v| v as f32))
            .map(SqlValue::F32)
            .map_err(|e| e.to_string()),
        Type::Double => row
            .try_get::<f64, _>(i)
            .or_else(|_| row.try_get::<f32, _>(i).map(f64::from))
            .map(SqlValue::F64)
            .map_err(|e| e.to_string()),
        Type::Numeric { .. } => row
            .try_get::<Decimal, _>(i)
            .map(SqlValue::Decimal)
            .map_err(|e| e.to_string()),
        Type::Date => Ok(temporal(row.try_get::<NaiveDate, _>(i), col, SqlValue::Date)),
        Type::Time => Ok(temporal(row.try_get::<NaiveTime, _>(i), col, SqlValue::Time)),
        Type::Timestamp => Ok(temporal(
            row.try_get::<NaiveDateTime, _>(i),
            col,
            SqlValue::DateTime,
        )),
        Type::Blob => row
            .try_get::<Vec<u8>, _>(i)
            .or_else(|_| row.try_get::<String, _>(i).map(String::into_bytes))
            .map(SqlValue::bytes_owned)
            .map_err(|e| e.to_string()),
        Type::Bit { length } => bit_bytes(row, i).map(|b| SqlValue::bits_from_bytes(&b, *length)),
        Type::Text { .. } | Type::PaddedText { .. } | Type::Set | Type::Opaque(_) => row
            .try_get::<String, _>(i)
            .or_else(|_| {
                row.try_get_unchecked::<Vec<u8>, _>(i)
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
            })
            .map(SqlValue::text_owned)
            .map_err(|e| e.to_string()),
    }
}

/// Any MySQL integer (signed, unsigned, YEAR or BIT) widened to i128.
fn integer(row: &MySqlRow, i: usize) -> std::result::Result<i128, String> {
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return Ok(i128::from(v));
    }
    if let Ok(v) = row.try_get::<u64, _>(i) {
        return Ok(i128::from(v));
    }
    bit_bytes(row, i).map(|bytes| be_bytes_to_int(&bytes))
}

fn bit_bytes(row: &MySqlRow, i: usize) -> std::result::Result<Vec<u8>, String> {
    row.try_get_unchecked::<Vec<u8>, _>(i)
        .map_err(|e| e.to_string())
}

fn be_bytes_to_int(bytes: &[u8]) -> i128 {
    let start = bytes.len().saturating_sub(16);
    bytes[start..]
        .iter()
        .fold(0i128, |acc, b| (acc << 8) | i128::from(*b))
}

fn narrow<T: TryFrom<i128>>(v: i128) -> std::result::Result<T, String> {
    T::try_from(v).map_err(|_| format!("value {} is out of range", v))
}

/// MySQL zero dates and out-of-range TIME values have no PostgreSQL
/// equivalent and are written as NULL.
fn temporal<T>(
    decoded: std::result::Result<T, sqlx::Error>,
    col: &Column,
    wrap: fn(T) -> SqlValue<'static>,
) -> SqlValue<'static> {
    match decoded {
        Ok(v) => wrap(v),
        Err(e) => {
            warn!(
                "column `{}`: {} value not representable ({}), writing NULL",
                col.name, col.source_type, e
            );
            SqlValue::Null(col.ty.null_type())
        }
    }
}
