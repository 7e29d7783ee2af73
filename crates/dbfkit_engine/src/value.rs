//! Field definitions and field values.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a field name in a DBF header.
pub const FIELD_NAME_LEN: usize = 10;

/// The storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Fixed-width text (`C`).
    Character,
    /// Fixed-width decimal number (`N`).
    Numeric,
    /// Fixed-width floating number (`F`).
    Float,
    /// Single-byte logical (`L`).
    Logical,
    /// Eight-byte `CCYYMMDD` date (`D`).
    Date,
}

impl FieldType {
    /// Parses a DBF field type byte.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code.to_ascii_uppercase() {
            b'C' => Some(Self::Character),
            b'N' => Some(Self::Numeric),
            b'F' => Some(Self::Float),
            b'L' => Some(Self::Logical),
            b'D' => Some(Self::Date),
            _ => None,
        }
    }

    /// Returns the DBF field type byte.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Character => b'C',
            Self::Numeric => b'N',
            Self::Float => b'F',
            Self::Logical => b'L',
            Self::Date => b'D',
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Upper-cased field name, at most ten bytes.
    pub name: String,
    /// Storage type.
    pub field_type: FieldType,
    /// Width in bytes.
    pub length: u8,
    /// Digits after the decimal point (numeric fields only).
    pub decimals: u8,
}

impl FieldDef {
    /// Creates a character field.
    pub fn character(name: &str, length: u8) -> Self {
        Self::new(name, FieldType::Character, length, 0)
    }

    /// Creates a numeric field.
    pub fn numeric(name: &str, length: u8, decimals: u8) -> Self {
        Self::new(name, FieldType::Numeric, length, decimals)
    }

    /// Creates a logical field.
    pub fn logical(name: &str) -> Self {
        Self::new(name, FieldType::Logical, 1, 0)
    }

    /// Creates a date field.
    pub fn date(name: &str) -> Self {
        Self::new(name, FieldType::Date, 8, 0)
    }

    fn new(name: &str, field_type: FieldType, length: u8, decimals: u8) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            field_type,
            length,
            decimals,
        }
    }

    /// Checks that the definition can be written to a DBF header.
    pub fn validate(&self) -> EngineResult<()> {
        if self.name.is_empty() || self.name.len() > FIELD_NAME_LEN {
            return Err(EngineError::format(format!(
                "field name '{}' must be 1..={FIELD_NAME_LEN} bytes",
                self.name
            )));
        }
        if !self
            .name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(EngineError::format(format!(
                "field name '{}' contains illegal characters",
                self.name
            )));
        }
        let fixed = match self.field_type {
            FieldType::Logical => Some(1),
            FieldType::Date => Some(8),
            _ => None,
        };
        if self.length == 0 || fixed.is_some_and(|len| len != self.length) {
            return Err(EngineError::format(format!(
                "field {} has invalid length {}",
                self.name, self.length
            )));
        }
        Ok(())
    }

    /// Encodes a value into the field's fixed-width representation.
    pub fn encode(&self, value: &Value) -> EngineResult<Vec<u8>> {
        let width = usize::from(self.length);
        let text = match (self.field_type, value) {
            (FieldType::Character, Value::Char(s)) => {
                let mut bytes: Vec<u8> = s.bytes().take(width).collect();
                bytes.resize(width, b' ');
                return Ok(bytes);
            }
            (FieldType::Numeric | FieldType::Float, Value::Number(n)) => {
                let s = format!(
                    "{:>width$.prec$}",
                    n,
                    width = width,
                    prec = usize::from(self.decimals)
                );
                if s.len() > width {
                    return Err(EngineError::entry(format!(
                        "value {n} does not fit field {} ({width} bytes)",
                        self.name
                    )));
                }
                s
            }
            (FieldType::Logical, Value::Logical(b)) => String::from(if *b { "T" } else { "F" }),
            (FieldType::Date, Value::Date(d)) => {
                if !d.is_empty() && (d.len() != 8 || !d.bytes().all(|b| b.is_ascii_digit())) {
                    return Err(EngineError::entry(format!(
                        "'{d}' is not a CCYYMMDD date for field {}",
                        self.name
                    )));
                }
                format!("{d:<8}")
            }
            (_, other) => {
                return Err(EngineError::entry(format!(
                    "field {} cannot hold a {} value",
                    self.name,
                    other.type_name()
                )))
            }
        };
        Ok(text.into_bytes())
    }

    /// Decodes the field's raw bytes.
    #[must_use]
    pub fn decode(&self, raw: &[u8]) -> Value {
        let text = String::from_utf8_lossy(raw);
        match self.field_type {
            FieldType::Character => Value::Char(text.into_owned()),
            FieldType::Numeric | FieldType::Float => {
                Value::Number(text.trim().parse::<f64>().unwrap_or(0.0))
            }
            FieldType::Logical => Value::Logical(matches!(
                text.trim(),
                "T" | "t" | "Y" | "y"
            )),
            FieldType::Date => Value::Date(text.trim().to_string()),
        }
    }

    /// Returns the blank value for this field.
    #[must_use]
    pub fn blank(&self) -> Value {
        match self.field_type {
            FieldType::Character => Value::Char(" ".repeat(usize::from(self.length))),
            FieldType::Numeric | FieldType::Float => Value::Number(0.0),
            FieldType::Logical => Value::Logical(false),
            FieldType::Date => Value::Date(String::new()),
        }
    }
}

/// A value read from or written to a field, or produced by an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Character data, including trailing padding.
    Char(String),
    /// Numeric data.
    Number(f64),
    /// Logical data.
    Logical(bool),
    /// A `CCYYMMDD` date, empty when blank.
    Date(String),
}

impl Value {
    /// Returns the dBASE type name of the value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Char(_) => "character",
            Self::Number(_) => "numeric",
            Self::Logical(_) => "logical",
            Self::Date(_) => "date",
        }
    }

    /// Returns the logical value, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(s) => write!(f, "{}", s.trim_end()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Logical(b) => write!(f, "{}", if *b { ".T." } else { ".F." }),
            Self::Date(d) => write!(f, "{d}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_pads_and_truncates() {
        let field = FieldDef::character("name", 5);
        assert_eq!(field.name, "NAME");
        assert_eq!(field.encode(&Value::Char("ab".into())).unwrap(), b"ab   ");
        assert_eq!(
            field.encode(&Value::Char("abcdefg".into())).unwrap(),
            b"abcde"
        );
    }

    #[test]
    fn numeric_right_aligns_and_rejects_overflow() {
        let field = FieldDef::numeric("BALANCE", 8, 2);
        assert_eq!(field.encode(&Value::Number(12.5)).unwrap(), b"   12.50");
        assert!(matches!(
            field.encode(&Value::Number(1_000_000.0)),
            Err(EngineError::Entry { .. })
        ));
        assert_eq!(field.decode(b"   12.50"), Value::Number(12.5));
        assert_eq!(field.decode(b"        "), Value::Number(0.0));
    }

    #[test]
    fn type_mismatch_is_entry_error() {
        let field = FieldDef::logical("ACTIVE");
        assert!(matches!(
            field.encode(&Value::Number(1.0)),
            Err(EngineError::Entry { .. })
        ));
        assert_eq!(field.encode(&Value::Logical(true)).unwrap(), b"T");
        assert_eq!(field.decode(b"y"), Value::Logical(true));
    }

    #[test]
    fn date_validation() {
        let field = FieldDef::date("JOINED");
        assert_eq!(field.encode(&Value::Date("20240131".into())).unwrap(), b"20240131");
        assert_eq!(field.encode(&Value::Date(String::new())).unwrap(), b"        ");
        assert!(field.encode(&Value::Date("2024-01-31".into())).is_err());
    }

    #[test]
    fn validate_rejects_bad_names() {
        assert!(FieldDef::character("", 4).validate().is_err());
        assert!(FieldDef::character("TOO_LONG_NAME", 4).validate().is_err());
        assert!(FieldDef::character("A-B", 4).validate().is_err());
        assert!(FieldDef::character("OK_1", 4).validate().is_ok());
    }
}
