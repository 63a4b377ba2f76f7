//! Two's-complement sample codec.
//!
//! Samples are big-endian signed integers, 16 bits wide in normal resolution
//! and 24 bits wide in high resolution. This is the only place raw sample
//! bytes are interpreted as signed values.

use crate::error::DecodeError;
use byteorder::{BigEndian, ByteOrder};
use std::ops::RangeInclusive;

/// Check that `width` is a supported sample width
pub fn check_width(width: usize) -> Result<(), DecodeError> {
    match width {
        2 | 3 => Ok(()),
        other => Err(DecodeError::UnsupportedWidth(other)),
    }
}

/// Range of values representable in a sample of `width` bytes
pub fn sample_range(width: usize) -> Result<RangeInclusive<i32>, DecodeError> {
    match width {
        2 => Ok(i16::MIN as i32..=i16::MAX as i32),
        3 => Ok(-(1 << 23)..=(1 << 23) - 1),
        other => Err(DecodeError::UnsupportedWidth(other)),
    }
}

/// Decode one big-endian two's-complement sample.
///
/// Width 2 yields `b0*256 + b1`, minus 65536 when the result is at least 32768.
/// Width 3 yields `b0*65536 + b1*256 + b2`, minus 16777216 when the result is
/// at least 8388608.
pub fn decode_sample(bytes: &[u8], width: usize) -> Result<i32, DecodeError> {
    check_width(width)?;
    if bytes.len() != width {
        return Err(DecodeError::SampleLength {
            expected: width,
            actual: bytes.len(),
        });
    }

    let value = match width {
        2 => BigEndian::read_i16(bytes) as i32,
        _ => BigEndian::read_i24(bytes),
    };
    Ok(value)
}

/// Encode one sample into its big-endian two's-complement bytes
pub fn encode_sample(value: i32, width: usize) -> Result<Vec<u8>, DecodeError> {
    if !sample_range(width)?.contains(&value) {
        return Err(DecodeError::OutOfRange { value, width });
    }

    let mut buf = vec![0u8; width];
    match width {
        2 => BigEndian::write_i16(&mut buf, value as i16),
        _ => BigEndian::write_i24(&mut buf, value),
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_matches_arithmetic_definition() {
        // Compare against the plain arithmetic over every 16-bit pattern
        for raw in 0..=u16::MAX {
            let bytes = raw.to_be_bytes();
            let mut expected = bytes[0] as i32 * 256 + bytes[1] as i32;
            if expected >= 32768 {
                expected -= 65536;
            }
            assert_eq!(decode_sample(&bytes, 2).unwrap(), expected);
        }
    }

    #[test]
    fn test_decode_24_bit_boundaries() {
        assert_eq!(decode_sample(&[0x7F, 0xFF, 0xFF], 3).unwrap(), 8_388_607);
        assert_eq!(decode_sample(&[0x80, 0x00, 0x00], 3).unwrap(), -8_388_608);
        assert_eq!(decode_sample(&[0xFF, 0xFF, 0xFF], 3).unwrap(), -1);
        assert_eq!(decode_sample(&[0x00, 0x01, 0x00], 3).unwrap(), 256);
    }

    #[test]
    fn test_width_must_match_bytes() {
        assert_eq!(
            decode_sample(&[0x00, 0x01, 0x02], 2),
            Err(DecodeError::SampleLength { expected: 2, actual: 3 })
        );
        assert_eq!(decode_sample(&[0x00], 1), Err(DecodeError::UnsupportedWidth(1)));
        assert_eq!(decode_sample(&[0; 4], 4), Err(DecodeError::UnsupportedWidth(4)));
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        assert_eq!(
            encode_sample(32768, 2),
            Err(DecodeError::OutOfRange { value: 32768, width: 2 })
        );
        assert_eq!(
            encode_sample(-8_388_609, 3),
            Err(DecodeError::OutOfRange { value: -8_388_609, width: 3 })
        );
        assert_eq!(encode_sample(-1, 3).unwrap(), vec![0xFF, 0xFF, 0xFF]);
    }
}
