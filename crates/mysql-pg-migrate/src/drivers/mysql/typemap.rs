//! MySQL column type strings to generic types.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::core::types::{IntSize, Type};

static LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+\((\d+)\)").expect("valid length regex"));

static PRECISION_SCALE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+\(\s*(\d+)\s*,\s*(\d+)\s*\)").expect("valid precision regex")
});

/// Map a MySQL column type (as found in `COLUMN_TYPE`) to a generic type.
///
/// Rules are tried in order; the first match wins. Unknown types become
/// [`Type::Opaque`] carrying the original string.
pub fn to_generic(mysql_type: &str) -> Type {
    let rt = mysql_type.trim().to_ascii_lowercase();
    let rt = rt.as_str();

    match rt {
        "set" => return Type::Set,
        "date" => return Type::Date,
        "time" => return Type::Time,
        "datetime" | "timestamp" => return Type::Timestamp,
        _ => {}
    }

    if rt.contains("float") {
        Type::Float
    } else if rt.contains("double") {
        Type::Double
    } else if rt.contains("numeric") || rt.contains("decimal") {
        let (precision, scale) = extract_precision_and_scale(rt);
        Type::Numeric { precision, scale }
    } else if rt.contains("tinyint") {
        Type::Bool
    } else if rt == "smallint" || rt == "year" {
        Type::Int(IntSize::Small)
    } else if rt == "bigint" || rt == "int unsigned" {
        Type::Int(IntSize::Large)
    } else if rt == "bigint unsigned" {
        Type::Int(IntSize::Huge)
    } else if rt.contains("int") || rt == "smallint unsigned" {
        Type::Int(IntSize::Normal)
    } else if rt.contains("blob") || rt.contains("binary") {
        Type::Blob
    } else if rt.starts_with("char") {
        Type::PaddedText {
            max: extract_length(rt),
        }
    } else if rt.contains("varchar") || rt.contains("text") {
        Type::Text {
            max: extract_length(rt),
        }
    } else if rt.starts_with("bit") && rt != "bit" {
        Type::Bit {
            length: extract_length(rt),
        }
    } else if matches!(rt, "bit" | "bit(1)" | "tinyint(1)" | "tinyint(1) unsigned") {
        Type::Bool
    } else {
        warn!("mysql: unknown column type '{}', passing it through as text", mysql_type);
        Type::Opaque(mysql_type.to_string())
    }
}

/// Length from `name(N)`, 0 when absent or unparseable.
pub fn extract_length(mysql_type: &str) -> u32 {
    LENGTH
        .captures(mysql_type)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// `(precision, scale)` from `name(P,S)`, `(0, 0)` when absent.
///
/// A parameter list that does not have both parts (e.g. `decimal(10)`) also
/// yields `(0, 0)` with a warning.
pub fn extract_precision_and_scale(mysql_type: &str) -> (u32, u32) {
    let parsed = PRECISION_SCALE.captures(mysql_type).and_then(|caps| {
        let precision = caps.get(1)?.as_str().parse().ok()?;
        let scale = caps.get(2)?.as_str().parse().ok()?;
        Some((precision, scale))
    });

    match parsed {
        Some(ps) => ps,
        None => {
            if mysql_type.contains('(') {
                warn!(
                    "mysql: could not understand precision/scale of '{}', using unconstrained numeric",
                    mysql_type
                );
            }
            (0, 0)
        }
    }
}

/// Pick the type string the mapping rules should see.
///
/// `COLUMN_TYPE` is used because it carries lengths and `unsigned`. For types
/// whose parameters are a member list or fractional-seconds precision,
/// `DATA_TYPE` is used instead so the exact-match rules apply.
///
/// Integer display widths (`bigint(20)`, `int(10) unsigned` on MySQL 5.7 and
/// MariaDB) and `zerofill` are dropped, so every server version yields the
/// same descriptor. `tinyint(1)` keeps its width.
pub fn source_type_descriptor(data_type: &str, column_type: &str) -> String {
    let data_type = data_type.trim().to_ascii_lowercase();
    let column_type = column_type.trim().to_ascii_lowercase();
    match data_type.as_str() {
        "set" | "enum" | "date" | "time" | "datetime" | "timestamp" | "year" | "json" => {
            data_type
        }
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
            let mut descriptor = if column_type.starts_with("tinyint(1)") {
                "tinyint(1)".to_string()
            } else {
                data_type
            };
            if column_type.split_whitespace().any(|word| word == "unsigned") {
                descriptor.push_str(" unsigned");
            }
            descriptor
        }
        _ => column_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_length() {
        assert_eq!(extract_length("varchar(255)"), 255);
        assert_eq!(extract_length("text"), 0);
        assert_eq!(extract_length("char(3)"), 3);
        assert_eq!(extract_length("int(11) unsigned"), 11);
    }

    #[test]
    fn test_extract_precision_and_scale() {
        assert_eq!(extract_precision_and_scale("decimal(10,2)"), (10, 2));
        assert_eq!(extract_precision_and_scale("decimal( 12 , 4 )"), (12, 4));
        assert_eq!(extract_precision_and_scale("decimal"), (0, 0));
        assert_eq!(extract_precision_and_scale("decimal(10)"), (0, 0));
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(to_generic("smallint"), Type::Int(IntSize::Small));
        assert_eq!(to_generic("year"), Type::Int(IntSize::Small));
        assert_eq!(to_generic("int"), Type::Int(IntSize::Normal));
        assert_eq!(to_generic("mediumint"), Type::Int(IntSize::Normal));
        assert_eq!(to_generic("smallint unsigned"), Type::Int(IntSize::Normal));
        assert_eq!(to_generic("bigint"), Type::Int(IntSize::Large));
        assert_eq!(to_generic("int unsigned"), Type::Int(IntSize::Large));
        assert_eq!(to_generic("bigint unsigned"), Type::Int(IntSize::Huge));
    }

    #[test]
    fn test_booleans() {
        assert_eq!(to_generic("tinyint"), Type::Bool);
        assert_eq!(to_generic("tinyint(1)"), Type::Bool);
        assert_eq!(to_generic("tinyint unsigned"), Type::Bool);
        assert_eq!(to_generic("bit"), Type::Bool);
    }

    #[test]
    fn test_bit_strings() {
        assert_eq!(to_generic("bit(8)"), Type::Bit { length: 8 });
        // The prefix rule is tried before the single-bit boolean rule.
        assert_eq!(to_generic("bit(1)"), Type::Bit { length: 1 });
    }

    #[test]
    fn test_floating_and_numeric() {
        assert_eq!(to_generic("float"), Type::Float);
        assert_eq!(to_generic("double"), Type::Double);
        assert_eq!(to_generic("double precision"), Type::Double);
        assert_eq!(
            to_generic("decimal(10,2)"),
            Type::Numeric { precision: 10, scale: 2 }
        );
        assert_eq!(
            to_generic("decimal(10,2) unsigned"),
            Type::Numeric { precision: 10, scale: 2 }
        );
        assert_eq!(to_generic("numeric"), Type::Numeric { precision: 0, scale: 0 });
    }

    #[test]
    fn test_temporal_exact_matches() {
        assert_eq!(to_generic("date"), Type::Date);
        assert_eq!(to_generic("time"), Type::Time);
        assert_eq!(to_generic("datetime"), Type::Timestamp);
        assert_eq!(to_generic("timestamp"), Type::Timestamp);
    }

    #[test]
    fn test_text_and_binary() {
        assert_eq!(to_generic("varchar(255)"), Type::Text { max: 255 });
        assert_eq!(to_generic("longtext"), Type::Text { max: 0 });
        assert_eq!(to_generic("char(2)"), Type::PaddedText { max: 2 });
        assert_eq!(to_generic("mediumblob"), Type::Blob);
        assert_eq!(to_generic("varbinary(16)"), Type::Blob);
        assert_eq!(to_generic("set"), Type::Set);
    }

    #[test]
    fn test_unknown_is_opaque() {
        assert_eq!(to_generic("json"), Type::Opaque("json".to_string()));
        assert_eq!(to_generic("geometry"), Type::Opaque("geometry".to_string()));
        assert_eq!(to_generic("enum"), Type::Opaque("enum".to_string()));
    }

    #[test]
    fn test_mapping_is_pure() {
        for t in ["int", "varchar(10)", "decimal(5,1)", "weird"] {
            assert_eq!(to_generic(t), to_generic(t));
        }
    }

    #[test]
    fn test_source_type_descriptor() {
        assert_eq!(source_type_descriptor("set", "set('a','b')"), "set");
        assert_eq!(source_type_descriptor("datetime", "datetime(6)"), "datetime");
        assert_eq!(source_type_descriptor("int", "int unsigned"), "int unsigned");
        assert_eq!(source_type_descriptor("VARCHAR", "VARCHAR(32)"), "varchar(32)");
    }

    #[test]
    fn test_integer_display_widths_are_dropped() {
        let generic = |data_type: &str, column_type: &str| {
            to_generic(&source_type_descriptor(data_type, column_type))
        };
        assert_eq!(generic("bigint", "bigint(20)"), Type::Int(IntSize::Large));
        assert_eq!(generic("int", "int(10) unsigned"), Type::Int(IntSize::Large));
        assert_eq!(
            generic("bigint", "bigint(20) unsigned"),
            Type::Int(IntSize::Huge)
        );
        assert_eq!(generic("int", "int(11)"), Type::Int(IntSize::Normal));
        assert_eq!(generic("smallint", "smallint(6)"), Type::Int(IntSize::Small));
        assert_eq!(
            generic("int", "int(10) unsigned zerofill"),
            Type::Int(IntSize::Large)
        );
        assert_eq!(generic("tinyint", "tinyint(1)"), Type::Bool);
        assert_eq!(source_type_descriptor("tinyint", "tinyint(4)"), "tinyint");
        assert_eq!(
            source_type_descriptor("tinyint", "tinyint(1) unsigned"),
            "tinyint(1) unsigned"
        );
        // MySQL 8 reports no widths; the descriptor is the same.
        assert_eq!(
            source_type_descriptor("bigint", "bigint unsigned"),
            source_type_descriptor("bigint", "bigint(20) unsigned")
        );
    }
}
