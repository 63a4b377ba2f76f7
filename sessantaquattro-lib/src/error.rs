use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionState;

/// Invalid device configuration. Raised before any socket is opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Wrong value for nch: got {0}, expected 0..=3")]
    InvalidChannelSelection(u8),

    #[error("Wrong value for fsamp: got {0}, expected 0..=3")]
    InvalidSamplingRate(u8),

    #[error("Wrong value for mode: got {0}, expected 0..=3")]
    InvalidMode(u8),

    #[error("Could not resolve {0}")]
    Unresolved(&'static str),
}

/// A single sample or frame could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported sample width: got {0}, expected 2 or 3")]
    UnsupportedWidth(usize),

    #[error("sample length mismatch: expected {expected} bytes, got {actual}")]
    SampleLength { expected: usize, actual: usize },

    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("sample value {value} does not fit in {width} bytes")]
    OutOfRange { value: i32, width: usize },
}

/// The device connection failed or was lost. Always terminates the session.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Device disconnected")]
    PeerDisconnected,

    #[error("Connection reset: {0}")]
    Reset(#[source] io::Error),

    #[error("No data from device for {0:?}")]
    ReadTimeout(Duration),

    #[error("No device connected within {0:?}")]
    AcceptTimeout(Duration),

    #[error("Stream corrupted: {consecutive} consecutive frames failed to decode")]
    StreamCorrupted { consecutive: u32 },
}

/// The primary error type for the `sessantaquattro-lib` library.
#[derive(Error, Debug)]
pub enum SqError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid session state: expected {expected}, got {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
}
