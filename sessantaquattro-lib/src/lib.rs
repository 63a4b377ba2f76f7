pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod sample;
pub mod session;
pub mod sink;


// Re-export the main types for easy access
pub use config::{ControlWord, DeviceConfiguration, FormatTriple};
pub use frame::{ChannelValue, DecodedFrame};
pub use session::{DeviceSession, SessionSettings, SessionState};
