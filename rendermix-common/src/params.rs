//! Audio format description
//!
//! `AudioParameters` is the format an input produces at or a sink consumes:
//! sample rate, channel layout and the number of frames exchanged per
//! render callback. Values are validated once at construction so the render
//! path never has to re-check them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lowest sample rate accepted for inputs and outputs
pub const MIN_SAMPLE_RATE: u32 = 3_000;

/// Highest sample rate accepted for inputs and outputs
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Upper bound on channels per stream
pub const MAX_CHANNELS: usize = 32;

/// Upper bound on frames exchanged per render callback
pub const MAX_FRAMES_PER_BUFFER: usize = 16_384;

/// Speaker arrangement of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Quad,
    Surround51,
    Surround71,
    /// Channels without positional meaning
    Discrete(u16),
}

impl ChannelLayout {
    /// Number of interleaved/planar channels carried by this layout
    pub fn channel_count(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Quad => 4,
            ChannelLayout::Surround51 => 6,
            ChannelLayout::Surround71 => 8,
            ChannelLayout::Discrete(n) => *n as usize,
        }
    }

    /// Pick the conventional layout for a bare channel count
    pub fn from_channel_count(channels: usize) -> Self {
        match channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            4 => ChannelLayout::Quad,
            6 => ChannelLayout::Surround51,
            8 => ChannelLayout::Surround71,
            n => ChannelLayout::Discrete(n.min(u16::MAX as usize) as u16),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => write!(f, "mono"),
            ChannelLayout::Stereo => write!(f, "stereo"),
            ChannelLayout::Quad => write!(f, "quad"),
            ChannelLayout::Surround51 => write!(f, "5.1"),
            ChannelLayout::Surround71 => write!(f, "7.1"),
            ChannelLayout::Discrete(n) => write!(f, "discrete({})", n),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = Error;

    /// Accepts layout names (`mono`, `stereo`, `quad`, `5.1`, `7.1`) or a
    /// bare channel count.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mono" => Ok(ChannelLayout::Mono),
            "stereo" => Ok(ChannelLayout::Stereo),
            "quad" => Ok(ChannelLayout::Quad),
            "5.1" | "surround51" => Ok(ChannelLayout::Surround51),
            "7.1" | "surround71" => Ok(ChannelLayout::Surround71),
            other => other
                .parse::<usize>()
                .map(ChannelLayout::from_channel_count)
                .map_err(|_| Error::InvalidParameters(format!("Unknown channel layout: {}", s))),
        }
    }
}

/// Format of one audio stream
///
/// # Examples
///
/// ```rust
/// use rendermix_common::{AudioParameters, ChannelLayout};
///
/// let params = AudioParameters::new(48_000, ChannelLayout::Stereo, 480).unwrap();
/// assert_eq!(params.channels(), 2);
/// assert_eq!(params.buffer_duration().as_millis(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioParameters {
    sample_rate: u32,
    channel_layout: ChannelLayout,
    frames_per_buffer: usize,
}

impl AudioParameters {
    /// Create validated audio parameters
    ///
    /// # Errors
    /// `Error::InvalidParameters` when the sample rate, channel count or
    /// buffer size falls outside the supported range.
    pub fn new(
        sample_rate: u32,
        channel_layout: ChannelLayout,
        frames_per_buffer: usize,
    ) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(Error::InvalidParameters(format!(
                "sample rate {} outside {}..={}",
                sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }

        let channels = channel_layout.channel_count();
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::InvalidParameters(format!(
                "channel count {} outside 1..={}",
                channels, MAX_CHANNELS
            )));
        }

        if frames_per_buffer == 0 || frames_per_buffer > MAX_FRAMES_PER_BUFFER {
            return Err(Error::InvalidParameters(format!(
                "frames per buffer {} outside 1..={}",
                frames_per_buffer, MAX_FRAMES_PER_BUFFER
            )));
        }

        Ok(Self {
            sample_rate,
            channel_layout,
            frames_per_buffer,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    pub fn channels(&self) -> usize {
        self.channel_layout.channel_count()
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    /// Wall-clock length of one buffer at this sample rate
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate as f64)
    }

    /// Same layout and buffer size at another sample rate
    pub fn with_sample_rate(&self, sample_rate: u32) -> Result<Self> {
        Self::new(sample_rate, self.channel_layout, self.frames_per_buffer)
    }
}

impl fmt::Display for AudioParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {} x{} frames",
            self.sample_rate, self.channel_layout, self.frames_per_buffer
        )
    }
}
