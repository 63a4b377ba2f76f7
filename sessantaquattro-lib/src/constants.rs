// Protocol constants for the Sessantaquattro

/// Default TCP port the device connects to
pub const DEFAULT_PORT: u16 = 45454;

/// Size of a control word on the wire (big-endian u16)
pub const CONTROL_WORD_SIZE: usize = 2;

/// Millivolts per ADC count for bio-measurement channels
pub const CONVERSION_FACTOR_MV: f64 = 0.000286;

/// Number of trailing auxiliary/accessory channels in every frame
pub const AUX_CHANNEL_COUNT: usize = 4;

/// Bytes per sample in normal resolution mode
pub const LOW_RES_SAMPLE_WIDTH: usize = 2;

/// Bytes per sample when `hres` is set
pub const HIGH_RES_SAMPLE_WIDTH: usize = 3;

/// Control word field weights
pub const WEIGHT_START: u16 = 1;
pub const WEIGHT_REC: u16 = 2;
pub const WEIGHT_TRIG: u16 = 4;
pub const WEIGHT_EXT: u16 = 16;
pub const WEIGHT_HPF: u16 = 64;
pub const WEIGHT_HRES: u16 = 128;
pub const WEIGHT_MODE: u16 = 256;
pub const WEIGHT_NCH: u16 = 2048;
pub const WEIGHT_FSAMP: u16 = 8192;
pub const WEIGHT_GETSET: u16 = 32768;

/// Display refresh rate the live monitor decimates frames down to
pub const DISPLAY_REFRESH_HZ: u32 = 10;

/// Points kept per channel by the live monitor
pub const HISTORY_POINTS: usize = 25;

/// Vertical spacing between stacked channel tracks
pub const TRACK_SPACING: f64 = 25.0;
