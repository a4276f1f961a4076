//! Typed data-point values
//!
//! Every data point carries one of eleven closed value types. The variants
//! are matched exhaustively in the codec and the feedback converter; there
//! are no dynamic type checks at the protocol boundary.

use serde::{Deserialize, Serialize};

/// Modbus data area a point can be mapped into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataArea {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

impl DataArea {
    /// Bit areas hold single-bit values that bypass the word codec
    pub fn is_bit(&self) -> bool {
        matches!(self, DataArea::Coil | DataArea::DiscreteInput)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataArea::Coil => "coil",
            DataArea::DiscreteInput => "discrete_input",
            DataArea::InputRegister => "input_register",
            DataArea::HoldingRegister => "holding_register",
        }
    }
}

/// Access mode of a data point, checked at dispatch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
    WriteOnly,
}

impl AccessMode {
    pub fn readable(&self) -> bool {
        !matches!(self, AccessMode::WriteOnly)
    }

    pub fn writable(&self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

/// Data type of a point value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Ascii,
}

impl DataType {
    /// Number of 16-bit registers the type occupies in a register area.
    ///
    /// `length` is the character count of an ASCII point and is ignored for
    /// every other type.
    pub fn register_span(&self, length: Option<u16>) -> u16 {
        match self {
            DataType::Bool | DataType::Byte | DataType::Int16 | DataType::UInt16 => 1,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 2,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 4,
            DataType::Ascii => length.unwrap_or(0).div_ceil(2),
        }
    }

    /// Numeric types can carry a simulation range
    pub fn is_numeric(&self) -> bool {
        !matches!(self, DataType::Bool | DataType::Ascii)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Bool
                | DataType::Byte
                | DataType::Int16
                | DataType::UInt16
                | DataType::Int32
                | DataType::UInt32
                | DataType::Int64
                | DataType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Byte => "byte",
            DataType::Int16 => "int16",
            DataType::UInt16 => "uint16",
            DataType::Int32 => "int32",
            DataType::UInt32 => "uint32",
            DataType::Int64 => "int64",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Ascii => "ascii",
        }
    }

    /// Seed value used when a point declares no explicit default
    pub fn zero_value(&self) -> DataValue {
        match self {
            DataType::Bool => DataValue::Bool(false),
            DataType::Byte => DataValue::Byte(0),
            DataType::Int16 => DataValue::Int16(0),
            DataType::UInt16 => DataValue::UInt16(0),
            DataType::Int32 => DataValue::Int32(0),
            DataType::UInt32 => DataValue::UInt32(0),
            DataType::Int64 => DataValue::Int64(0),
            DataType::UInt64 => DataValue::UInt64(0),
            DataType::Float32 => DataValue::Float32(0.0),
            DataType::Float64 => DataValue::Float64(0.0),
            DataType::Ascii => DataValue::Ascii(String::new()),
        }
    }

    /// Parse a JSON configuration value into a typed value.
    ///
    /// 64-bit integers are read as native JSON integers, never strings.
    pub fn parse_value(&self, raw: &serde_json::Value) -> std::result::Result<DataValue, String> {
        let type_name = self.as_str();
        let err = |raw: &serde_json::Value| format!("value {raw} does not match type {type_name}");

        match self {
            DataType::Bool => raw.as_bool().map(DataValue::Bool).ok_or_else(|| err(raw)),
            DataType::Byte => raw
                .as_u64()
                .filter(|v| *v <= u8::MAX as u64)
                .map(|v| DataValue::Byte(v as u8))
                .ok_or_else(|| err(raw)),
            DataType::Int16 => raw
                .as_i64()
                .filter(|v| i16::try_from(*v).is_ok())
                .map(|v| DataValue::Int16(v as i16))
                .ok_or_else(|| err(raw)),
            DataType::UInt16 => raw
                .as_u64()
                .filter(|v| u16::try_from(*v).is_ok())
                .map(|v| DataValue::UInt16(v as u16))
                .ok_or_else(|| err(raw)),
            DataType::Int32 => raw
                .as_i64()
                .filter(|v| i32::try_from(*v).is_ok())
                .map(|v| DataValue::Int32(v as i32))
                .ok_or_else(|| err(raw)),
            DataType::UInt32 => raw
                .as_u64()
                .filter(|v| u32::try_from(*v).is_ok())
                .map(|v| DataValue::UInt32(v as u32))
                .ok_or_else(|| err(raw)),
            DataType::Int64 => raw.as_i64().map(DataValue::Int64).ok_or_else(|| err(raw)),
            DataType::UInt64 => raw.as_u64().map(DataValue::UInt64).ok_or_else(|| err(raw)),
            DataType::Float32 => raw
                .as_f64()
                .map(|v| DataValue::Float32(v as f32))
                .ok_or_else(|| err(raw)),
            DataType::Float64 => raw.as_f64().map(DataValue::Float64).ok_or_else(|| err(raw)),
            DataType::Ascii => match raw.as_str() {
                Some(s) if s.is_ascii() => Ok(DataValue::Ascii(s.to_string())),
                Some(_) => Err(format!("ascii value contains non-ASCII characters: {raw}")),
                None => Err(err(raw)),
            },
        }
    }

    /// Build a value from a float draw, clamped to the type's representable
    /// range and rounded for integer types. Used by the simulation engine.
    pub fn value_from_f64(&self, v: f64) -> DataValue {
        match self {
            DataType::Bool => DataValue::Bool(v != 0.0),
            DataType::Byte => DataValue::Byte(v.round().clamp(0.0, u8::MAX as f64) as u8),
            DataType::Int16 => {
                DataValue::Int16(v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
            },
            DataType::UInt16 => DataValue::UInt16(v.round().clamp(0.0, u16::MAX as f64) as u16),
            DataType::Int32 => {
                DataValue::Int32(v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
            },
            DataType::UInt32 => DataValue::UInt32(v.round().clamp(0.0, u32::MAX as f64) as u32),
            DataType::Int64 => {
                DataValue::Int64(v.round().clamp(i64::MIN as f64, i64::MAX as f64) as i64)
            },
            DataType::UInt64 => DataValue::UInt64(v.round().clamp(0.0, u64::MAX as f64) as u64),
            DataType::Float32 => {
                DataValue::Float32(v.clamp(f32::MIN as f64, f32::MAX as f64) as f32)
            },
            DataType::Float64 => DataValue::Float64(v),
            DataType::Ascii => DataValue::Ascii(String::new()),
        }
    }
}

/// A typed point value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Ascii(String),
}

impl DataValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::Bool(_) => DataType::Bool,
            DataValue::Byte(_) => DataType::Byte,
            DataValue::Int16(_) => DataType::Int16,
            DataValue::UInt16(_) => DataType::UInt16,
            DataValue::Int32(_) => DataType::Int32,
            DataValue::UInt32(_) => DataType::UInt32,
            DataValue::Int64(_) => DataType::Int64,
            DataValue::UInt64(_) => DataType::UInt64,
            DataValue::Float32(_) => DataType::Float32,
            DataValue::Float64(_) => DataType::Float64,
            DataValue::Ascii(_) => DataType::Ascii,
        }
    }

    /// Truthiness used when a value feeds a coil or Bool target
    pub fn truthy(&self) -> bool {
        match self {
            DataValue::Bool(b) => *b,
            DataValue::Byte(v) => *v != 0,
            DataValue::Int16(v) => *v != 0,
            DataValue::UInt16(v) => *v != 0,
            DataValue::Int32(v) => *v != 0,
            DataValue::UInt32(v) => *v != 0,
            DataValue::Int64(v) => *v != 0,
            DataValue::UInt64(v) => *v != 0,
            DataValue::Float32(v) => *v != 0.0,
            DataValue::Float64(v) => *v != 0.0,
            DataValue::Ascii(s) => !s.is_empty(),
        }
    }

    /// Render as a JSON value. 64-bit integers stay native integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataValue::Bool(b) => serde_json::Value::Bool(*b),
            DataValue::Byte(v) => serde_json::json!(*v),
            DataValue::Int16(v) => serde_json::json!(*v),
            DataValue::UInt16(v) => serde_json::json!(*v),
            DataValue::Int32(v) => serde_json::json!(*v),
            DataValue::UInt32(v) => serde_json::json!(*v),
            DataValue::Int64(v) => serde_json::json!(*v),
            DataValue::UInt64(v) => serde_json::json!(*v),
            DataValue::Float32(v) => serde_json::json!(*v),
            DataValue::Float64(v) => serde_json::json!(*v),
            DataValue::Ascii(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            DataValue::Bool(b) => Some(i128::from(*b)),
            DataValue::Byte(v) => Some(i128::from(*v)),
            DataValue::Int16(v) => Some(i128::from(*v)),
            DataValue::UInt16(v) => Some(i128::from(*v)),
            DataValue::Int32(v) => Some(i128::from(*v)),
            DataValue::UInt32(v) => Some(i128::from(*v)),
            DataValue::Int64(v) => Some(i128::from(*v)),
            DataValue::UInt64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Convert for feedback propagation.
    ///
    /// Integer-family values (Bool, Byte, Int*, UInt*) convert among
    /// themselves with clamping; Float32 and Float64 convert between each
    /// other. Every other pairing is rejected at configuration time, so a
    /// `None` here never occurs for a validated configuration.
    pub fn convert_to(&self, target: DataType) -> Option<DataValue> {
        if self.data_type() == target {
            return Some(self.clone());
        }

        if self.data_type().is_integer() && target.is_integer() {
            let raw = self.as_i128()?;
            return Some(match target {
                DataType::Bool => DataValue::Bool(raw != 0),
                DataType::Byte => DataValue::Byte(raw.clamp(0, u8::MAX as i128) as u8),
                DataType::Int16 => {
                    DataValue::Int16(raw.clamp(i16::MIN as i128, i16::MAX as i128) as i16)
                },
                DataType::UInt16 => DataValue::UInt16(raw.clamp(0, u16::MAX as i128) as u16),
                DataType::Int32 => {
                    DataValue::Int32(raw.clamp(i32::MIN as i128, i32::MAX as i128) as i32)
                },
                DataType::UInt32 => DataValue::UInt32(raw.clamp(0, u32::MAX as i128) as u32),
                DataType::Int64 => {
                    DataValue::Int64(raw.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
                },
                DataType::UInt64 => DataValue::UInt64(raw.clamp(0, u64::MAX as i128) as u64),
                _ => return None,
            });
        }

        if self.data_type().is_float() && target.is_float() {
            let raw = match self {
                DataValue::Float32(v) => f64::from(*v),
                DataValue::Float64(v) => *v,
                _ => return None,
            };
            return Some(match target {
                DataType::Float32 => DataValue::Float32(raw as f32),
                DataType::Float64 => DataValue::Float64(raw),
                _ => return None,
            });
        }

        None
    }
}

/// Whether a value of `source` type may feed a point of `target` type
pub fn feedback_compatible(source: DataType, target: DataType) -> bool {
    source == target
        || (source.is_integer() && target.is_integer())
        || (source.is_float() && target.is_float())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_span_per_type() {
        assert_eq!(DataType::Bool.register_span(None), 1);
        assert_eq!(DataType::UInt16.register_span(None), 1);
        assert_eq!(DataType::Float32.register_span(None), 2);
        assert_eq!(DataType::UInt64.register_span(None), 4);
        assert_eq!(DataType::Ascii.register_span(Some(7)), 4);
        assert_eq!(DataType::Ascii.register_span(Some(8)), 4);
    }

    #[test]
    fn test_parse_value_range_checked() {
        assert_eq!(
            DataType::Byte.parse_value(&json!(200)).unwrap(),
            DataValue::Byte(200)
        );
        assert!(DataType::Byte.parse_value(&json!(256)).is_err());
        assert!(DataType::Int16.parse_value(&json!(40000)).is_err());
        assert!(DataType::UInt16.parse_value(&json!(-1)).is_err());
        assert!(DataType::Bool.parse_value(&json!(1)).is_err());
    }

    #[test]
    fn test_parse_value_wide_integers_native() {
        assert_eq!(
            DataType::UInt64.parse_value(&json!(u64::MAX)).unwrap(),
            DataValue::UInt64(u64::MAX)
        );
        assert_eq!(
            DataType::Int64.parse_value(&json!(i64::MIN)).unwrap(),
            DataValue::Int64(i64::MIN)
        );
        // string-encoded integers are rejected, not coerced
        assert!(DataType::UInt64.parse_value(&json!("42")).is_err());
    }

    #[test]
    fn test_parse_value_ascii() {
        assert_eq!(
            DataType::Ascii.parse_value(&json!("PUMP")).unwrap(),
            DataValue::Ascii("PUMP".to_string())
        );
        assert!(DataType::Ascii.parse_value(&json!("héllo")).is_err());
    }

    #[test]
    fn test_convert_bool_to_integer() {
        assert_eq!(
            DataValue::Bool(true).convert_to(DataType::UInt16),
            Some(DataValue::UInt16(1))
        );
        assert_eq!(
            DataValue::Bool(false).convert_to(DataType::Int64),
            Some(DataValue::Int64(0))
        );
    }

    #[test]
    fn test_convert_integer_clamps() {
        assert_eq!(
            DataValue::Int32(70000).convert_to(DataType::UInt16),
            Some(DataValue::UInt16(u16::MAX))
        );
        assert_eq!(
            DataValue::Int16(-5).convert_to(DataType::Byte),
            Some(DataValue::Byte(0))
        );
    }

    #[test]
    fn test_convert_cross_family_rejected() {
        assert_eq!(DataValue::Bool(true).convert_to(DataType::Float64), None);
        assert_eq!(
            DataValue::Ascii("x".into()).convert_to(DataType::UInt16),
            None
        );
        assert!(!feedback_compatible(DataType::Bool, DataType::Float64));
        assert!(feedback_compatible(DataType::Bool, DataType::UInt16));
        assert!(feedback_compatible(DataType::Float32, DataType::Float64));
    }

    #[test]
    fn test_value_from_f64_clamps_to_range() {
        assert_eq!(
            DataType::Int16.value_from_f64(1e9),
            DataValue::Int16(i16::MAX)
        );
        assert_eq!(DataType::Byte.value_from_f64(-3.0), DataValue::Byte(0));
        assert_eq!(DataType::Int16.value_from_f64(2.4), DataValue::Int16(2));
    }
}
