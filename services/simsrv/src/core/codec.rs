//! Register word codec
//!
//! Pure encoding/decoding between typed values and sequences of 16-bit
//! register words, parameterized by byte order (within each word) and word
//! order (across the word sequence). Bit-area values are single bits and
//! never pass through here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::{DataType, DataValue};

/// Byte order within each 16-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Word order across the words of a multi-register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    #[default]
    Big,
    Little,
}

/// Device-wide endianness configuration.
///
/// The common industrial notations map as follows for a 32-bit value
/// `0x12345678`:
///
/// | notation | byte order | word order | registers          |
/// |----------|------------|------------|--------------------|
/// | ABCD     | big        | big        | `[0x1234, 0x5678]` |
/// | CDAB     | big        | little     | `[0x5678, 0x1234]` |
/// | BADC     | little     | big        | `[0x3412, 0x7856]` |
/// | DCBA     | little     | little     | `[0x7856, 0x3412]` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Endianness {
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub word_order: WordOrder,
}

impl Endianness {
    pub fn new(byte_order: ByteOrder, word_order: WordOrder) -> Self {
        Self {
            byte_order,
            word_order,
        }
    }
}

/// Codec failure for a single operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer words supplied than the type occupies
    #[error("{type_name} needs {expected} registers, got {actual}")]
    ShortInput {
        type_name: &'static str,
        expected: u16,
        actual: usize,
    },

    /// A register pattern that no value of the type maps onto
    #[error("register value 0x{value:04X} out of range for {type_name}")]
    OutOfRange { type_name: &'static str, value: u16 },
}

/// Reorder words per the endianness configuration.
///
/// Word reversal and per-word byte swap commute, so this function is its own
/// inverse and is shared by both directions. ASCII values never reorder
/// words (`word_reorder = false`): reversing the word sequence would
/// scramble the character string.
fn apply_order(mut words: Vec<u16>, endian: Endianness, word_reorder: bool) -> Vec<u16> {
    if word_reorder && endian.word_order == WordOrder::Little {
        words.reverse();
    }
    if endian.byte_order == ByteOrder::Little {
        for w in &mut words {
            *w = w.swap_bytes();
        }
    }
    words
}

fn pack_be_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect()
}

fn unpack_be_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Encode a value into register words.
///
/// `length` is the configured character count of an ASCII point; other
/// types ignore it.
pub fn encode(value: &DataValue, length: Option<u16>, endian: Endianness) -> Vec<u16> {
    let words = match value {
        DataValue::Bool(b) => vec![u16::from(*b)],
        DataValue::Byte(v) => vec![u16::from(*v)],
        DataValue::Int16(v) => vec![*v as u16],
        DataValue::UInt16(v) => vec![*v],
        DataValue::Int32(v) => pack_be_bytes(&v.to_be_bytes()),
        DataValue::UInt32(v) => pack_be_bytes(&v.to_be_bytes()),
        DataValue::Int64(v) => pack_be_bytes(&v.to_be_bytes()),
        DataValue::UInt64(v) => pack_be_bytes(&v.to_be_bytes()),
        DataValue::Float32(v) => pack_be_bytes(&v.to_be_bytes()),
        DataValue::Float64(v) => pack_be_bytes(&v.to_be_bytes()),
        DataValue::Ascii(s) => {
            // two characters per word, null padding up to the configured span
            let len = length.unwrap_or(s.len() as u16) as usize;
            let mut bytes = s.as_bytes().to_vec();
            bytes.truncate(len);
            bytes.resize(len.div_ceil(2) * 2, 0);
            return apply_order(pack_be_bytes(&bytes), endian, false);
        },
    };
    apply_order(words, endian, true)
}

/// Decode register words into a value of the given type.
///
/// Fails with [`CodecError::ShortInput`] when fewer words are supplied than
/// the type occupies, and with [`CodecError::OutOfRange`] when the register
/// pattern does not map onto the type (Bool other than 0/1, Byte above
/// 0xFF).
pub fn decode(
    data_type: DataType,
    length: Option<u16>,
    words: &[u16],
    endian: Endianness,
) -> Result<DataValue, CodecError> {
    let span = data_type.register_span(length) as usize;
    if words.len() < span {
        return Err(CodecError::ShortInput {
            type_name: data_type.as_str(),
            expected: span as u16,
            actual: words.len(),
        });
    }

    let ordered = apply_order(
        words[..span].to_vec(),
        endian,
        data_type != DataType::Ascii,
    );

    let value = match data_type {
        DataType::Bool => match ordered[0] {
            0 => DataValue::Bool(false),
            1 => DataValue::Bool(true),
            v => {
                return Err(CodecError::OutOfRange {
                    type_name: data_type.as_str(),
                    value: v,
                })
            },
        },
        DataType::Byte => {
            if ordered[0] > u16::from(u8::MAX) {
                return Err(CodecError::OutOfRange {
                    type_name: data_type.as_str(),
                    value: ordered[0],
                });
            }
            DataValue::Byte(ordered[0] as u8)
        },
        DataType::Int16 => DataValue::Int16(ordered[0] as i16),
        DataType::UInt16 => DataValue::UInt16(ordered[0]),
        DataType::Int32 => {
            let b = unpack_be_bytes(&ordered);
            DataValue::Int32(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        },
        DataType::UInt32 => {
            let b = unpack_be_bytes(&ordered);
            DataValue::UInt32(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        },
        DataType::Float32 => {
            let b = unpack_be_bytes(&ordered);
            DataValue::Float32(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        },
        DataType::Int64 => {
            let b = unpack_be_bytes(&ordered);
            DataValue::Int64(i64::from_be_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        },
        DataType::UInt64 => {
            let b = unpack_be_bytes(&ordered);
            DataValue::UInt64(u64::from_be_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        },
        DataType::Float64 => {
            let b = unpack_be_bytes(&ordered);
            DataValue::Float64(f64::from_be_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        },
        DataType::Ascii => {
            let mut bytes = unpack_be_bytes(&ordered);
            bytes.truncate(length.unwrap_or(0) as usize);
            while bytes.last() == Some(&0) {
                bytes.pop();
            }
            DataValue::Ascii(String::from_utf8_lossy(&bytes).into_owned())
        },
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_endianness() -> Vec<Endianness> {
        let mut combos = Vec::new();
        for byte_order in [ByteOrder::Big, ByteOrder::Little] {
            for word_order in [WordOrder::Big, WordOrder::Little] {
                combos.push(Endianness::new(byte_order, word_order));
            }
        }
        combos
    }

    #[test]
    fn test_roundtrip_all_types_all_orders() {
        let samples = vec![
            DataValue::Bool(true),
            DataValue::Bool(false),
            DataValue::Byte(0xAB),
            DataValue::Int16(-12345),
            DataValue::UInt16(0xBEEF),
            DataValue::Int32(-123456789),
            DataValue::UInt32(0xDEADBEEF),
            DataValue::Int64(i64::MIN + 1),
            DataValue::UInt64(u64::MAX - 7),
            DataValue::Float32(123.456),
            DataValue::Float64(-9876.54321),
        ];

        for endian in all_endianness() {
            for value in &samples {
                let words = encode(value, None, endian);
                assert_eq!(
                    words.len() as u16,
                    value.data_type().register_span(None),
                    "span mismatch for {value:?}"
                );
                let back = decode(value.data_type(), None, &words, endian).unwrap();
                assert_eq!(&back, value, "roundtrip failed for {value:?} with {endian:?}");
            }
        }
    }

    #[test]
    fn test_roundtrip_ascii_all_orders() {
        for endian in all_endianness() {
            for text in ["PUMP-01", "AB", ""] {
                let length = Some(8);
                let words = encode(&DataValue::Ascii(text.to_string()), length, endian);
                assert_eq!(words.len(), 4);
                let back = decode(DataType::Ascii, length, &words, endian).unwrap();
                assert_eq!(back, DataValue::Ascii(text.to_string()));
            }
        }
    }

    #[test]
    fn test_ascii_odd_length_null_padded() {
        let endian = Endianness::default();
        let words = encode(&DataValue::Ascii("ABC".to_string()), Some(3), endian);
        assert_eq!(words, vec![0x4142, 0x4300]);
    }

    #[test]
    fn test_float32_big_big_known_words() {
        // IEEE-754 bit pattern of 3.14f32 is 0x4048F5C3
        let endian = Endianness::default();
        let words = encode(&DataValue::Float32(3.14), None, endian);
        assert_eq!(words, vec![0x4048, 0xF5C3]);

        let back = decode(DataType::Float32, None, &words, endian).unwrap();
        match back {
            DataValue::Float32(f) => assert!((f - 3.14).abs() < 1e-6),
            other => panic!("expected float32, got {other:?}"),
        }
    }

    #[test]
    fn test_uint32_word_and_byte_orders() {
        let v = DataValue::UInt32(0x12345678);

        let abcd = encode(&v, None, Endianness::new(ByteOrder::Big, WordOrder::Big));
        assert_eq!(abcd, vec![0x1234, 0x5678]);

        let cdab = encode(&v, None, Endianness::new(ByteOrder::Big, WordOrder::Little));
        assert_eq!(cdab, vec![0x5678, 0x1234]);

        let badc = encode(&v, None, Endianness::new(ByteOrder::Little, WordOrder::Big));
        assert_eq!(badc, vec![0x3412, 0x7856]);

        let dcba = encode(
            &v,
            None,
            Endianness::new(ByteOrder::Little, WordOrder::Little),
        );
        assert_eq!(dcba, vec![0x7856, 0x3412]);
    }

    #[test]
    fn test_decode_short_input_fails() {
        let endian = Endianness::default();
        let err = decode(DataType::Float32, None, &[0x4048], endian).unwrap_err();
        assert!(matches!(err, CodecError::ShortInput { expected: 2, .. }));

        let err = decode(DataType::UInt64, None, &[0, 0, 0], endian).unwrap_err();
        assert!(matches!(err, CodecError::ShortInput { expected: 4, .. }));
    }

    #[test]
    fn test_decode_out_of_range_patterns() {
        let endian = Endianness::default();
        let err = decode(DataType::Bool, None, &[2], endian).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { .. }));

        let err = decode(DataType::Byte, None, &[0x0100], endian).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { .. }));

        assert_eq!(
            decode(DataType::Byte, None, &[0x00FF], endian).unwrap(),
            DataValue::Byte(0xFF)
        );
    }
}
