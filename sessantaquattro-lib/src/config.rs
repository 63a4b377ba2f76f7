//! # Device configuration and control word
//!
//! The Sessantaquattro is configured by a single 16-bit control word sent
//! big-endian over the socket. The same ten fields that make up the word also
//! decide the shape of the sample stream the device answers with: how many
//! channels each frame carries, the sampling frequency, and whether samples
//! are 16 or 24 bits wide.
//!
//! ```text
//!  15     13 12  11 10  9    8   7    6   5   4   3   2    1    0
//! +------+-----+-----+--+------+----+---+--+---+--+----+---+-----+
//! |getset|fsamp| nch |  | mode |hres|hpf|  |ext|  |trig|rec|start|
//! +------+-----+-----+--+------+----+---+--+---+--+----+---+-----+
//! ```

use crate::constants::{HIGH_RES_SAMPLE_WIDTH, LOW_RES_SAMPLE_WIDTH, AUX_CHANNEL_COUNT};
use crate::error::ConfigurationError;
use modular_bitfield::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bit-packed control word. Field order is LSB first.
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord {
    pub start: bool,
    pub rec: bool,
    pub trig: bool,
    #[skip]
    unused_3: bool,
    pub ext: bool,
    #[skip]
    unused_5: bool,
    pub hpf: bool,
    pub hres: bool,
    pub mode: B2,
    #[skip]
    unused_10: bool,
    pub nch: B2,
    pub fsamp: B2,
    pub getset: bool,
}

impl ControlWord {
    /// Numeric value of the word (the weighted sum of all fields)
    pub fn value(&self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }

    /// Build a word from its numeric value
    pub fn from_value(value: u16) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }

    /// Big-endian wire representation
    pub fn to_wire(&self) -> [u8; 2] {
        self.value().to_be_bytes()
    }

    /// Parse the big-endian wire representation
    pub fn from_wire(bytes: [u8; 2]) -> Self {
        Self::from_value(u16::from_be_bytes(bytes))
    }

    /// The same word with the start bit cleared
    pub fn stop_word(&self) -> Self {
        self.with_start(false)
    }
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} ({})", self.value(), self.value())
    }
}

/// Channel set selected by the `nch` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ChannelSelection {
    #[strum(to_string = "12 channels")]
    Ch12 = 0,
    #[strum(to_string = "20 channels")]
    Ch20 = 1,
    #[strum(to_string = "36 channels")]
    Ch36 = 2,
    #[strum(to_string = "68 channels")]
    Ch68 = 3,
}

impl ChannelSelection {
    /// Channels per frame, including the auxiliary ones. Mode 1 uses a reduced set.
    pub fn channel_count(&self, mode: u8) -> usize {
        let reduced = mode == 1;
        match (self, reduced) {
            (ChannelSelection::Ch12, false) => 12,
            (ChannelSelection::Ch12, true) => 8,
            (ChannelSelection::Ch20, false) => 20,
            (ChannelSelection::Ch20, true) => 12,
            (ChannelSelection::Ch36, false) => 36,
            (ChannelSelection::Ch36, true) => 20,
            (ChannelSelection::Ch68, false) => 68,
            (ChannelSelection::Ch68, true) => 36,
        }
    }
}

/// Sampling rate selected by the `fsamp` field. Names give the base rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SamplingRate {
    #[strum(to_string = "500 Hz")]
    Hz500 = 0,
    #[strum(to_string = "1 kHz")]
    Hz1000 = 1,
    #[strum(to_string = "2 kHz")]
    Hz2000 = 2,
    #[strum(to_string = "4 kHz")]
    Hz4000 = 3,
}

impl SamplingRate {
    /// Sampling frequency in Hz. Mode 3 runs four times faster.
    pub fn as_hz(&self, mode: u8) -> u32 {
        let base = match self {
            SamplingRate::Hz500 => 500,
            SamplingRate::Hz1000 => 1000,
            SamplingRate::Hz2000 => 2000,
            SamplingRate::Hz4000 => 4000,
        };
        if mode == 3 { base * 4 } else { base }
    }
}

/// Wire format derived from a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FormatTriple {
    pub number_of_channels: usize,
    pub sample_frequency_hz: u32,
    pub bytes_per_sample: usize,
}

impl FormatTriple {
    /// Create a format, rejecting any zero component
    pub fn new(
        number_of_channels: usize,
        sample_frequency_hz: u32,
        bytes_per_sample: usize,
    ) -> Result<Self, ConfigurationError> {
        if number_of_channels == 0 {
            return Err(ConfigurationError::Unresolved("number_of_channels"));
        }
        if sample_frequency_hz == 0 {
            return Err(ConfigurationError::Unresolved("sample_frequency"));
        }
        if bytes_per_sample == 0 {
            return Err(ConfigurationError::Unresolved("bytes_in_sample"));
        }
        Ok(Self {
            number_of_channels,
            sample_frequency_hz,
            bytes_per_sample,
        })
    }

    /// Size in bytes of one frame on the wire
    pub fn frame_len(&self) -> usize {
        self.number_of_channels * self.bytes_per_sample
    }

    /// Channels subject to millivolt scaling
    pub fn bio_channel_count(&self) -> usize {
        self.number_of_channels.saturating_sub(AUX_CHANNEL_COUNT)
    }
}

impl fmt::Display for FormatTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channels @ {} Hz, {} bytes/sample",
            self.number_of_channels, self.sample_frequency_hz, self.bytes_per_sample
        )
    }
}

/// The ten user-facing configuration fields.
///
/// `mode`, `nch` and `fsamp` are kept as raw values so that an out-of-range
/// setting is reported by [`DeviceConfiguration::resolve`] instead of being
/// silently truncated into the bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct DeviceConfiguration {
    pub start: bool,
    pub rec: bool,
    pub trig: bool,
    pub ext: bool,
    pub hpf: bool,
    pub hres: bool,
    pub mode: u8,
    pub nch: u8,
    pub fsamp: u8,
    pub getset: bool,
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        Self {
            start: true,
            rec: false,
            trig: false,
            ext: false,
            hpf: false,
            hres: false,
            mode: 0,
            nch: 0,
            fsamp: 0,
            getset: false,
        }
    }
}

impl DeviceConfiguration {
    /// Validate the configuration and derive the control word and wire format.
    pub fn resolve(&self) -> Result<(ControlWord, FormatTriple), ConfigurationError> {
        let format = self.format()?;
        let word = self.control_word()?;
        Ok((word, format))
    }

    /// Derive only the wire format
    pub fn format(&self) -> Result<FormatTriple, ConfigurationError> {
        let mode = self.checked_mode()?;
        let channels = ChannelSelection::try_from(self.nch)
            .map_err(|_| ConfigurationError::InvalidChannelSelection(self.nch))?;
        let rate = SamplingRate::try_from(self.fsamp)
            .map_err(|_| ConfigurationError::InvalidSamplingRate(self.fsamp))?;
        let bytes_per_sample = if self.hres {
            HIGH_RES_SAMPLE_WIDTH
        } else {
            LOW_RES_SAMPLE_WIDTH
        };

        FormatTriple::new(channels.channel_count(mode), rate.as_hz(mode), bytes_per_sample)
    }

    /// Derive only the control word
    pub fn control_word(&self) -> Result<ControlWord, ConfigurationError> {
        let mode = self.checked_mode()?;
        let nch: u8 = ChannelSelection::try_from(self.nch)
            .map_err(|_| ConfigurationError::InvalidChannelSelection(self.nch))?
            .into();
        let fsamp: u8 = SamplingRate::try_from(self.fsamp)
            .map_err(|_| ConfigurationError::InvalidSamplingRate(self.fsamp))?
            .into();

        Ok(ControlWord::new()
            .with_start(self.start)
            .with_rec(self.rec)
            .with_trig(self.trig)
            .with_ext(self.ext)
            .with_hpf(self.hpf)
            .with_hres(self.hres)
            .with_mode(mode)
            .with_nch(nch)
            .with_fsamp(fsamp)
            .with_getset(self.getset))
    }

    fn checked_mode(&self) -> Result<u8, ConfigurationError> {
        if self.mode <= 3 {
            Ok(self.mode)
        } else {
            Err(ConfigurationError::InvalidMode(self.mode))
        }
    }
}

impl From<ControlWord> for DeviceConfiguration {
    fn from(word: ControlWord) -> Self {
        Self {
            start: word.start(),
            rec: word.rec(),
            trig: word.trig(),
            ext: word.ext(),
            hpf: word.hpf(),
            hres: word.hres(),
            mode: word.mode(),
            nch: word.nch(),
            fsamp: word.fsamp(),
            getset: word.getset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[test]
    fn test_bit_positions_match_weights() {
        let single = |word: ControlWord| word.value();
        assert_eq!(single(ControlWord::new().with_start(true)), WEIGHT_START);
        assert_eq!(single(ControlWord::new().with_rec(true)), WEIGHT_REC);
        assert_eq!(single(ControlWord::new().with_trig(true)), WEIGHT_TRIG);
        assert_eq!(single(ControlWord::new().with_ext(true)), WEIGHT_EXT);
        assert_eq!(single(ControlWord::new().with_hpf(true)), WEIGHT_HPF);
        assert_eq!(single(ControlWord::new().with_hres(true)), WEIGHT_HRES);
        assert_eq!(single(ControlWord::new().with_mode(1)), WEIGHT_MODE);
        assert_eq!(single(ControlWord::new().with_nch(1)), WEIGHT_NCH);
        assert_eq!(single(ControlWord::new().with_fsamp(1)), WEIGHT_FSAMP);
        assert_eq!(single(ControlWord::new().with_getset(true)), WEIGHT_GETSET);
    }

    #[test]
    fn test_control_word_is_weighted_sum() {
        let config = DeviceConfiguration {
            start: true,
            rec: true,
            trig: false,
            ext: true,
            hpf: false,
            hres: true,
            mode: 3,
            nch: 2,
            fsamp: 1,
            getset: true,
        };
        let expected = 1 + 2 + 16 + 128 + 3 * 256 + 2 * 2048 + 8192 + 32768;
        assert_eq!(config.control_word().unwrap().value(), expected);
    }

    #[test]
    fn test_wire_is_big_endian() {
        let word = ControlWord::from_value(0x1234);
        assert_eq!(word.to_wire(), [0x12, 0x34]);
        assert_eq!(ControlWord::from_wire([0x12, 0x34]), word);
    }

    #[test]
    fn test_stop_word_only_clears_start() {
        let word = ControlWord::from_value(193);
        assert_eq!(word.stop_word().value(), 192);
        assert_eq!(word.stop_word().stop_word().value(), 192);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let config = DeviceConfiguration {
            mode: 4,
            ..Default::default()
        };
        assert_eq!(config.resolve(), Err(ConfigurationError::InvalidMode(4)));
    }

    #[test]
    fn test_zero_format_component_rejected() {
        assert_eq!(
            FormatTriple::new(0, 500, 2),
            Err(ConfigurationError::Unresolved("number_of_channels"))
        );
        assert_eq!(
            FormatTriple::new(12, 0, 2),
            Err(ConfigurationError::Unresolved("sample_frequency"))
        );
        assert_eq!(
            FormatTriple::new(12, 500, 0),
            Err(ConfigurationError::Unresolved("bytes_in_sample"))
        );
    }

    #[test]
    fn test_format_helpers() {
        let format = FormatTriple::new(36, 2000, 3).unwrap();
        assert_eq!(format.frame_len(), 108);
        assert_eq!(format.bio_channel_count(), 32);
        assert_eq!(format.to_string(), "36 channels @ 2000 Hz, 3 bytes/sample");
    }
}
