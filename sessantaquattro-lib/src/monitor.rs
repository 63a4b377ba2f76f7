//! Renderer-free helpers for live displays of the decoded stream.
//!
//! A display cannot keep up with thousands of frames per second, so frames
//! are decimated to roughly [`DISPLAY_REFRESH_HZ`] and only the last few points
//! of every bio-measurement channel are kept.

use crate::constants::{DISPLAY_REFRESH_HZ, HISTORY_POINTS, TRACK_SPACING};
use crate::frame::DecodedFrame;
use std::collections::VecDeque;
use std::time::Instant;

/// Passes one frame out of every `sample_frequency / refresh_hz`
#[derive(Debug, Clone)]
pub struct FrameDecimator {
    every: u64,
    seen: u64,
}

impl FrameDecimator {
    pub fn new(sample_frequency_hz: u32, refresh_hz: u32) -> Self {
        let every = (sample_frequency_hz / refresh_hz.max(1)).max(1) as u64;
        Self { every, seen: 0 }
    }

    pub fn for_display(sample_frequency_hz: u32) -> Self {
        Self::new(sample_frequency_hz, DISPLAY_REFRESH_HZ)
    }

    pub fn every(&self) -> u64 {
        self.every
    }

    /// Count a frame; true when it should be displayed
    pub fn accept(&mut self) -> bool {
        self.seen += 1;
        if self.seen >= self.every {
            self.seen = 0;
            true
        } else {
            false
        }
    }
}

/// Recent values of every bio-measurement channel, stacked with a vertical
/// offset so the tracks do not overlap when drawn on one axis.
#[derive(Debug, Clone)]
pub struct ChannelHistory {
    tracks: Vec<VecDeque<f64>>,
    capacity: usize,
    spacing: f64,
}

impl ChannelHistory {
    pub fn new(channels: usize, capacity: usize, spacing: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            tracks: (0..channels)
                .map(|_| std::iter::repeat_n(0.0, capacity).collect())
                .collect(),
            capacity,
            spacing,
        }
    }

    pub fn with_defaults(channels: usize) -> Self {
        Self::new(channels, HISTORY_POINTS, TRACK_SPACING)
    }

    pub fn channels(&self) -> usize {
        self.tracks.len()
    }

    /// Vertical offset of a track
    pub fn offset(&self, channel: usize) -> f64 {
        channel as f64 * self.spacing
    }

    /// Append the bio channels of a frame. Extra channels are ignored.
    pub fn push(&mut self, frame: &DecodedFrame) {
        let offsets: Vec<f64> = (0..self.tracks.len()).map(|i| self.offset(i)).collect();
        for ((track, value), offset) in self
            .tracks
            .iter_mut()
            .zip(frame.bio_channels())
            .zip(offsets)
        {
            if track.len() == self.capacity {
                track.pop_front();
            }
            track.push_back(value.as_f64() - offset);
        }
    }

    /// Points of one track, oldest first
    pub fn track(&self, channel: usize) -> Option<&VecDeque<f64>> {
        self.tracks.get(channel)
    }
}

/// Measures how often frames reach the display
#[derive(Debug, Clone)]
pub struct RateMeter {
    last: Option<Instant>,
}

impl RateMeter {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Register an update; returns updates per second since the previous one
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        let rate = self.last.and_then(|last| {
            let elapsed = now.duration_since(last).as_secs_f64();
            (elapsed > 0.0).then(|| 1.0 / elapsed)
        });
        self.last = Some(now);
        rate
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}
