//! Fixed-width binary codec for the primitive settings types.
//!
//! Values are encoded at their native width, little-endian, with no type
//! tag. Compact, but it means a read must request the same type the write
//! used; decoding checks length exactly and rejects mismatches.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected value length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("stored string is not valid utf-8")]
    Utf8,
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    vec![u8::from(value)]
}

/// Any non-zero byte decodes as `true`.
pub fn decode_bool(buf: &[u8]) -> Result<bool, CodecError> {
    check_len(buf, 1)?;
    Ok(buf[0] != 0)
}

pub fn encode_i32(value: i32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_i32(buf: &[u8]) -> Result<i32, CodecError> {
    check_len(buf, 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(buf);
    Ok(i32::from_le_bytes(bytes))
}

pub fn encode_f32(value: f32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_f32(buf: &[u8]) -> Result<f32, CodecError> {
    check_len(buf, 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(buf);
    Ok(f32::from_le_bytes(bytes))
}

pub fn encode_f64(value: f64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_f64(buf: &[u8]) -> Result<f64, CodecError> {
    check_len(buf, 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(buf);
    Ok(f64::from_le_bytes(bytes))
}

/// Empty strings are valid values: a zero-length payload, not absence.
pub fn encode_str(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

pub fn decode_str(buf: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(buf.to_vec()).map_err(|_| CodecError::Utf8)
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), CodecError> {
    if buf.len() != expected {
        return Err(CodecError::Length {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_round_trip() {
        assert!(decode_bool(&encode_bool(true)).expect("decode"));
        assert!(!decode_bool(&encode_bool(false)).expect("decode"));
        assert_eq!(encode_bool(true), vec![1]);
    }

    #[test]
    fn i32_round_trip_boundaries() {
        for value in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(decode_i32(&encode_i32(value)).expect("decode"), value);
        }
    }

    #[test]
    fn f32_round_trip_boundaries() {
        for value in [f32::MIN, -1.32232f32, -0.0, 0.0, 1.231, f32::MAX] {
            let decoded = decode_f32(&encode_f32(value)).expect("decode");
            assert_eq!(decoded.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn f64_round_trip_boundaries() {
        for value in [f64::MIN, -1.32232f64, -0.0, 0.0, 3.144_567_89, f64::MAX] {
            let decoded = decode_f64(&encode_f64(value)).expect("decode");
            assert_eq!(decoded.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn string_round_trip_multibyte() {
        for value in ["", "Sample english text", "Việt Nam", "농업생산성의 제고와 농지의"] {
            assert_eq!(decode_str(&encode_str(value)).expect("decode"), value);
        }
    }

    #[test]
    fn empty_string_is_zero_length_payload() {
        assert!(encode_str("").is_empty());
        assert_eq!(decode_str(&[]).expect("decode"), "");
    }

    #[test]
    fn length_mismatch_rejected() {
        let four = encode_i32(7);
        assert_eq!(
            decode_f64(&four),
            Err(CodecError::Length {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(
            decode_bool(&four),
            Err(CodecError::Length {
                expected: 1,
                actual: 4
            })
        );
        assert!(decode_i32(&[0u8; 3]).is_err());
    }

    #[test]
    fn same_width_reinterprets_bits() {
        // 4-byte int read back as f32 succeeds but yields different semantics.
        let raw = encode_i32(1);
        let reinterpreted = decode_f32(&raw).expect("decode");
        assert_ne!(reinterpreted, 1.0);
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(decode_str(&[0xff, 0xfe]), Err(CodecError::Utf8));
    }
}
