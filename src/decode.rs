//! Register decoder.
//!
//! Pure transformation from raw 16-bit register arrays to typed tag values.
//! Multi-word types combine registers in big-endian word order: the high 16
//! bits come from the lower register address.

use crate::types::{DataType, TagValue};
use crate::{LoggerError, Result};

/// Decodes a register array into a typed value.
pub fn decode(regs: &[u16], data_type: DataType) -> Result<TagValue> {
    if regs.is_empty() {
        return Err(LoggerError::EmptyInput);
    }

    match data_type {
        DataType::Bool => Ok(TagValue::Bool(regs[0] != 0)),
        DataType::UInt16 => Ok(TagValue::U16(regs[0])),
        DataType::Int16 => Ok(TagValue::I16(regs[0] as i16)),
        DataType::UInt32 => Ok(TagValue::U32(combine_words(regs)?)),
        DataType::Int32 => Ok(TagValue::I32(combine_words(regs)? as i32)),
        DataType::Float32 => Ok(TagValue::F32(f32::from_bits(combine_words(regs)?))),
    }
}

/// Combines the first two registers into a 32-bit pattern, high word first.
fn combine_words(regs: &[u16]) -> Result<u32> {
    if regs.len() < 2 {
        return Err(LoggerError::InsufficientRegisters {
            need: 2,
            got: regs.len(),
        });
    }
    Ok((u32::from(regs[0]) << 16) | u32::from(regs[1]))
}

/// Splits a 32-bit pattern into big-endian register order.
pub fn split_words(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, (value & 0xFFFF) as u16]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_int32_big_endian() {
        let value = decode(&[0x1234, 0x5678], DataType::Int32).unwrap();
        assert_eq!(value, TagValue::I32(0x12345678));
    }

    #[test]
    fn test_int32_negative() {
        let value = decode(&[0xFFFF, 0xFFFF], DataType::Int32).unwrap();
        assert_eq!(value, TagValue::I32(-1));
    }

    #[test]
    fn test_float32_one() {
        let value = decode(&[0x3F80, 0x0000], DataType::Float32).unwrap();
        assert_eq!(value, TagValue::F32(1.0));
    }

    #[test]
    fn test_int16_signed_reinterpretation() {
        let value = decode(&[0xFFFE], DataType::Int16).unwrap();
        assert_eq!(value, TagValue::I16(-2));
    }

    #[test]
    fn test_bool_from_register() {
        assert_eq!(decode(&[0], DataType::Bool).unwrap(), TagValue::Bool(false));
        assert_eq!(decode(&[1], DataType::Bool).unwrap(), TagValue::Bool(true));
        assert_eq!(decode(&[0xABCD], DataType::Bool).unwrap(), TagValue::Bool(true));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            decode(&[], DataType::UInt16),
            Err(LoggerError::EmptyInput)
        ));
    }

    #[test]
    fn test_insufficient_registers() {
        for dt in [DataType::Int32, DataType::UInt32, DataType::Float32] {
            assert!(matches!(
                decode(&[0x1234], dt),
                Err(LoggerError::InsufficientRegisters { need: 2, got: 1 })
            ));
        }
    }

    #[test]
    fn test_extra_registers_ignored() {
        let value = decode(&[0x0001, 0x0002, 0xDEAD], DataType::UInt32).unwrap();
        assert_eq!(value, TagValue::U32(0x00010002));
    }

    proptest! {
        #[test]
        fn prop_u32_round_trip(v: u32) {
            let decoded = decode(&split_words(v), DataType::UInt32).unwrap();
            prop_assert_eq!(decoded, TagValue::U32(v));
        }

        #[test]
        fn prop_i32_round_trip(v: i32) {
            let decoded = decode(&split_words(v as u32), DataType::Int32).unwrap();
            prop_assert_eq!(decoded, TagValue::I32(v));
        }

        #[test]
        fn prop_f32_round_trip_bits(bits: u32) {
            // Bit equality, so NaN payloads survive too
            let decoded = decode(&split_words(bits), DataType::Float32).unwrap();
            match decoded {
                TagValue::F32(f) => prop_assert_eq!(f.to_bits(), bits),
                other => prop_assert!(false, "unexpected value {:?}", other),
            }
        }

        #[test]
        fn prop_u16_identity(v: u16) {
            prop_assert_eq!(decode(&[v], DataType::UInt16).unwrap(), TagValue::U16(v));
            prop_assert_eq!(decode(&[v], DataType::Int16).unwrap(), TagValue::I16(v as i16));
        }
    }
}
