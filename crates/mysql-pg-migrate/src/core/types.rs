//! Engine-neutral column types.
//!
//! Every source column type is normalized into a [`Type`] before any
//! destination DDL or value encoding happens. Drivers own the two mappings:
//! source string to [`Type`], and [`Type`] to destination column type.

use std::fmt;

use super::value::SqlNullType;

/// Width class of an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntSize {
    /// 16-bit signed.
    Small,
    /// 32-bit signed.
    Normal,
    /// 64-bit signed.
    Large,
    /// Unsigned 64-bit; does not fit any signed destination integer.
    Huge,
}

/// Generic column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int(IntSize),
    Float,
    Double,
    /// Precision 0 means unconstrained.
    Numeric { precision: u32, scale: u32 },
    Date,
    Time,
    Timestamp,
    Blob,
    /// Variable-length text; `max` 0 means unbounded.
    Text { max: u32 },
    /// Blank-padded text; `max` 0 means unbounded.
    PaddedText { max: u32 },
    /// Fixed-width bit string; `length` 0 means varying.
    Bit { length: u32 },
    Set,
    /// Unrecognized source type, carried verbatim.
    Opaque(String),
}

impl Type {
    /// Values of this type render as unquoted SQL literals.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int(_) | Type::Float | Type::Double | Type::Numeric { .. }
        )
    }

    /// Type hint carried by NULLs of this column.
    pub fn null_type(&self) -> SqlNullType {
        match self {
            Type::Bool => SqlNullType::Bool,
            Type::Int(IntSize::Small) => SqlNullType::I16,
            Type::Int(IntSize::Normal) => SqlNullType::I32,
            Type::Int(IntSize::Large) => SqlNullType::I64,
            Type::Int(IntSize::Huge) | Type::Numeric { .. } => SqlNullType::Decimal,
            Type::Float => SqlNullType::F32,
            Type::Double => SqlNullType::F64,
            Type::Date => SqlNullType::Date,
            Type::Time => SqlNullType::Time,
            Type::Timestamp => SqlNullType::DateTime,
            Type::Blob => SqlNullType::Bytes,
            Type::Bit { .. } => SqlNullType::Bits,
            Type::Text { .. } | Type::PaddedText { .. } | Type::Set | Type::Opaque(_) => {
                SqlNullType::String
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::Int(size) => write!(f, "Int({:?})", size),
            Type::Float => write!(f, "Float"),
            Type::Double => write!(f, "Double"),
            Type::Numeric { precision, scale } => write!(f, "Numeric({},{})", precision, scale),
            Type::Date => write!(f, "Date"),
            Type::Time => write!(f, "Time"),
            Type::Timestamp => write!(f, "Timestamp"),
            Type::Blob => write!(f, "Blob"),
            Type::Text { max } => write!(f, "Text({})", max),
            Type::PaddedText { max } => write!(f, "PaddedText({})", max),
            Type::Bit { length } => write!(f, "Bit({})", length),
            Type::Set => write!(f, "Set"),
            Type::Opaque(raw) => write!(f, "Opaque({})", raw),
        }
    }
}
