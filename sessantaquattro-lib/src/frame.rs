use crate::config::FormatTriple;
use crate::constants::{AUX_CHANNEL_COUNT, CONVERSION_FACTOR_MV};
use crate::error::DecodeError;
use crate::sample::{check_width, decode_sample};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One decoded channel reading
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelValue {
    /// Raw ADC counts (auxiliary channels, or scaling disabled)
    Counts(i32),
    /// Bio-measurement reading in millivolts
    Millivolts(f64),
}

impl ChannelValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ChannelValue::Counts(c) => *c as f64,
            ChannelValue::Millivolts(mv) => *mv,
        }
    }

    pub fn is_scaled(&self) -> bool {
        matches!(self, ChannelValue::Millivolts(_))
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Counts(c) => write!(f, "{}", c),
            ChannelValue::Millivolts(mv) => write!(f, "{:.4} mV", mv),
        }
    }
}

/// All channels of one frame, in wire order
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodedFrame {
    /// Position of the frame in the stream, starting at 0
    pub sequence: u64,
    pub values: Vec<ChannelValue>,
}

impl DecodedFrame {
    /// Bio-measurement channels (everything but the trailing auxiliary ones)
    pub fn bio_channels(&self) -> &[ChannelValue] {
        let end = self.values.len().saturating_sub(AUX_CHANNEL_COUNT);
        &self.values[..end]
    }

    /// The trailing auxiliary/accessory channels
    pub fn aux_channels(&self) -> &[ChannelValue] {
        let start = self.values.len().saturating_sub(AUX_CHANNEL_COUNT);
        &self.values[start..]
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [", self.sequence)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

/// Split a raw frame into per-channel values.
///
/// When `scale_to_millivolts` is set, every channel except the trailing
/// [`AUX_CHANNEL_COUNT`] is multiplied by [`CONVERSION_FACTOR_MV`].
pub fn demux_frame(
    bytes: &[u8],
    number_of_channels: usize,
    bytes_per_sample: usize,
    scale_to_millivolts: bool,
) -> Result<Vec<ChannelValue>, DecodeError> {
    check_width(bytes_per_sample)?;
    let expected = number_of_channels * bytes_per_sample;
    if bytes.len() != expected {
        return Err(DecodeError::TruncatedFrame {
            expected,
            actual: bytes.len(),
        });
    }

    let scaled_channels = number_of_channels.saturating_sub(AUX_CHANNEL_COUNT);
    bytes
        .chunks_exact(bytes_per_sample)
        .enumerate()
        .map(|(channel_index, sample)| -> Result<ChannelValue, DecodeError> {
            let counts = decode_sample(sample, bytes_per_sample)?;
            if scale_to_millivolts && channel_index < scaled_channels {
                Ok(ChannelValue::Millivolts(counts as f64 * CONVERSION_FACTOR_MV))
            } else {
                Ok(ChannelValue::Counts(counts))
            }
        })
        .collect()
}

/// Frame decoder bound to a fixed wire format
#[derive(Debug, Clone, Copy)]
pub struct FrameDemux {
    format: FormatTriple,
    scale_to_millivolts: bool,
}

impl FrameDemux {
    pub fn new(format: FormatTriple, scale_to_millivolts: bool) -> Result<Self, DecodeError> {
        check_width(format.bytes_per_sample)?;
        Ok(Self {
            format,
            scale_to_millivolts,
        })
    }

    pub fn format(&self) -> FormatTriple {
        self.format
    }

    pub fn decode(&self, sequence: u64, bytes: &[u8]) -> Result<DecodedFrame, DecodeError> {
        let values = demux_frame(
            bytes,
            self.format.number_of_channels,
            self.format.bytes_per_sample,
            self.scale_to_millivolts,
        )?;
        Ok(DecodedFrame { sequence, values })
    }
}

/// Tracks consecutive decode failures and decides when to give up on a stream.
#[derive(Debug, Clone, Copy)]
pub struct DecodeErrorBudget {
    limit: u32,
    consecutive: u32,
}

impl DecodeErrorBudget {
    /// `limit` consecutive failures exhaust the budget. A limit of 0 is treated as 1.
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failure; returns true once the budget is exhausted
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive >= self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order_is_wire_order() {
        let bytes = [0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05];
        let values = demux_frame(&bytes, 5, 2, false).unwrap();
        let counts: Vec<f64> = values.iter().map(ChannelValue::as_f64).collect();
        assert_eq!(counts, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_fewer_channels_than_aux_window_never_scaled() {
        let bytes = [0x00, 0x10, 0x00, 0x20];
        let values = demux_frame(&bytes, 2, 2, true).unwrap();
        assert!(values.iter().all(|v| !v.is_scaled()));
    }

    #[test]
    fn test_bad_width_rejected_before_length() {
        assert_eq!(
            demux_frame(&[0; 8], 2, 4, false),
            Err(DecodeError::UnsupportedWidth(4))
        );
    }

    #[test]
    fn test_budget_resets_on_success() {
        let mut budget = DecodeErrorBudget::new(3);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        budget.record_success();
        assert_eq!(budget.consecutive(), 0);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        assert!(budget.record_failure());
    }

    #[test]
    fn test_frame_split_helpers() {
        let bytes: Vec<u8> = (0..6u8).flat_map(|i| [0x00, i]).collect();
        let demux = FrameDemux::new(FormatTriple::new(6, 500, 2).unwrap(), false).unwrap();
        let frame = demux.decode(7, &bytes).unwrap();
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.bio_channels().len(), 2);
        assert_eq!(frame.aux_channels().len(), 4);
        assert_eq!(frame.to_string(), "#7 [0, 1, 2, 3, 4, 5]");
    }
}
