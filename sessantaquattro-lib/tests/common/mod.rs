//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use sessantaquattro_lib::config::{ControlWord, DeviceConfiguration, FormatTriple};
#[allow(unused_imports)]
pub use sessantaquattro_lib::error::{ConfigurationError, ConnectionError, DecodeError, SqError};
#[allow(unused_imports)]
pub use sessantaquattro_lib::frame::{ChannelValue, DecodedFrame, demux_frame};
#[allow(unused_imports)]
pub use sessantaquattro_lib::sample::{decode_sample, encode_sample};
#[allow(unused_imports)]
pub use sessantaquattro_lib::session::{DeviceSession, SessionSettings, SessionState, StopReason};

use std::net::SocketAddr;
use std::time::Duration;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Vec<u8> {
    hex::decode(hex_data).expect("Failed to decode hex")
}

/// Settings for a loopback session on an ephemeral port
#[allow(dead_code)]
pub fn loopback_settings() -> SessionSettings {
    SessionSettings {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        read_timeout: Some(Duration::from_secs(5)),
        accept_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

/// Three 12-channel frames of 16-bit samples, start=1 and everything else 0.
/// Frame 1 counts up, frame 2 holds sign boundaries, frame 3 small negatives.
#[allow(dead_code)]
pub const THREE_FRAMES_12CH: &str = concat!(
    "000100020003000400050006000700080009000a000b000c",
    "7fff80000000ffff0100ff00123480017ffe00010002fffe",
    "fffffffefffdfffcfffbfffafff9fff8fff7fff6fff5fff4",
);

/// Expected decoded values of [`THREE_FRAMES_12CH`]
#[allow(dead_code)]
pub fn three_frames_expected() -> Vec<Vec<i32>> {
    vec![
        (1..=12).collect(),
        vec![32767, -32768, 0, -1, 256, -256, 4660, -32767, 32766, 1, 2, -2],
        (1..=12).map(|v| -v).collect(),
    ]
}

/// Raw counts of a frame; panics on scaled values
#[allow(dead_code)]
pub fn counts(frame: &DecodedFrame) -> Vec<i32> {
    frame
        .values
        .iter()
        .map(|v| match v {
            ChannelValue::Counts(c) => *c,
            ChannelValue::Millivolts(_) => panic!("unexpected scaled value in frame {}", frame.sequence),
        })
        .collect()
}

/// Route library logs through the test harness; `RUST_LOG` picks the level
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
