//! Generic types to PostgreSQL column types.

use crate::core::types::{IntSize, Type};

/// Renders generic types as PostgreSQL DDL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypeMapper {
    /// Emit `timestamp with time zone` for timestamps.
    pub timezone: bool,
}

impl PostgresTypeMapper {
    pub fn new(timezone: bool) -> Self {
        Self { timezone }
    }

    /// Column type for `ty`. Total: every generic type has a rendering.
    pub fn column_type(&self, ty: &Type) -> String {
        match ty {
            Type::Bool => "boolean".to_string(),
            Type::Int(IntSize::Small) => "smallint".to_string(),
            Type::Int(IntSize::Normal) => "integer".to_string(),
            Type::Int(IntSize::Large) => "bigint".to_string(),
            Type::Int(IntSize::Huge) => "numeric(20)".to_string(),
            Type::Float => "real".to_string(),
            Type::Double => "double precision".to_string(),
            Type::Numeric { precision, scale } if *precision > 0 => {
                format!("numeric({},{})", precision, scale)
            }
            Type::Numeric { .. } => "numeric".to_string(),
            Type::Date => "date".to_string(),
            Type::Time => "time".to_string(),
            Type::Timestamp if self.timezone => "timestamp with time zone".to_string(),
            Type::Timestamp => "timestamp".to_string(),
            Type::Blob => "bytea".to_string(),
            Type::Text { max } if *max > 0 => format!("varchar({})", max),
            Type::PaddedText { max } if *max > 0 => format!("char({})", max),
            Type::Text { .. } | Type::PaddedText { .. } | Type::Set => "text".to_string(),
            Type::Bit { length } if *length > 0 => format!("bit({})", length),
            Type::Bit { .. } => "bit varying".to_string(),
            Type::Opaque(raw) if raw.trim().eq_ignore_ascii_case("json") => "json".to_string(),
            Type::Opaque(_) => "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widths() {
        let m = PostgresTypeMapper::default();
        assert_eq!(m.column_type(&Type::Int(IntSize::Small)), "smallint");
        assert_eq!(m.column_type(&Type::Int(IntSize::Normal)), "integer");
        assert_eq!(m.column_type(&Type::Int(IntSize::Large)), "bigint");
        assert_eq!(m.column_type(&Type::Int(IntSize::Huge)), "numeric(20)");
    }

    #[test]
    fn test_parameterized_types() {
        let m = PostgresTypeMapper::default();
        assert_eq!(
            m.column_type(&Type::Numeric { precision: 10, scale: 2 }),
            "numeric(10,2)"
        );
        assert_eq!(m.column_type(&Type::Numeric { precision: 0, scale: 0 }), "numeric");
        assert_eq!(m.column_type(&Type::Text { max: 255 }), "varchar(255)");
        assert_eq!(m.column_type(&Type::Text { max: 0 }), "text");
        assert_eq!(m.column_type(&Type::PaddedText { max: 2 }), "char(2)");
        assert_eq!(m.column_type(&Type::PaddedText { max: 0 }), "text");
        assert_eq!(m.column_type(&Type::Bit { length: 8 }), "bit(8)");
        assert_eq!(m.column_type(&Type::Bit { length: 0 }), "bit varying");
    }

    #[test]
    fn test_timestamp_follows_timezone_flag() {
        assert_eq!(
            PostgresTypeMapper::new(false).column_type(&Type::Timestamp),
            "timestamp"
        );
        assert_eq!(
            PostgresTypeMapper::new(true).column_type(&Type::Timestamp),
            "timestamp with time zone"
        );
    }

    #[test]
    fn test_opaque_types() {
        let m = PostgresTypeMapper::default();
        assert_eq!(m.column_type(&Type::Opaque("json".into())), "json");
        assert_eq!(m.column_type(&Type::Opaque("geometry".into())), "text");
        assert_eq!(m.column_type(&Type::Set), "text");
        assert_eq!(m.column_type(&Type::Blob), "bytea");
        assert_eq!(m.column_type(&Type::Bool), "boolean");
    }
}
