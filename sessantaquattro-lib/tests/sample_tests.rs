//! Tests for two's-complement sample decoding

mod common;

use common::*;

#[test]
fn test_known_samples() {
    assert_eq!(decode_sample(&[0xFF, 0xFF], 2).unwrap(), -1);
    assert_eq!(decode_sample(&[0x80, 0x00, 0x00], 3).unwrap(), -8_388_608);
    assert_eq!(decode_sample(&[0x7F, 0xFF], 2).unwrap(), 32767);
    assert_eq!(decode_sample(&[0x80, 0x00], 2).unwrap(), -32768);
    assert_eq!(decode_sample(&[0x00, 0x00, 0x00], 3).unwrap(), 0);
}

#[test]
fn test_unsupported_width() {
    let result = decode_sample(&[0x00, 0x00, 0x00, 0x00], 4);
    match result {
        Err(DecodeError::UnsupportedWidth(4)) => {}
        other => panic!("Expected UnsupportedWidth, got {:?}", other),
    }
    let err = decode_sample(&[0x00], 1).unwrap_err();
    assert!(err.to_string().contains("unsupported sample width"));
}

#[test]
fn test_round_trip_16_bit() {
    for value in i16::MIN as i32..=i16::MAX as i32 {
        let bytes = encode_sample(value, 2).unwrap();
        assert_eq!(decode_sample(&bytes, 2).unwrap(), value);
    }
}

#[test]
fn test_round_trip_24_bit() {
    let min = -(1 << 23);
    let max = (1 << 23) - 1;
    // Every 97th value plus the extremes keeps this fast while crossing every byte boundary
    let values = (min..=max).step_by(97).chain([min, min + 1, -1, 0, 1, max - 1, max]);
    for value in values {
        let bytes = encode_sample(value, 3).unwrap();
        assert_eq!(bytes.len(), 3);
        assert_eq!(decode_sample(&bytes, 3).unwrap(), value, "value {}", value);
    }
}
