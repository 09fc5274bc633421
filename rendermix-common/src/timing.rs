//! Time ↔ frame conversions for the render path
//!
//! The sink reports playout delay as a signed `TimeDelta` (a late or
//! misbehaving driver can report a negative value). Inputs consume delay as
//! an unsigned frame count at their own sample rate. These helpers do the
//! conversion without allocating so they are safe to call from the audio
//! thread.
//!
//! # Examples
//!
//! ```rust
//! use chrono::TimeDelta;
//! use rendermix_common::timing::*;
//!
//! // 10ms at 48kHz
//! assert_eq!(time_to_frames(TimeDelta::milliseconds(10), 48_000), 480);
//!
//! // Negative delay is physically meaningless and maps to zero frames
//! assert_eq!(time_to_frames(TimeDelta::milliseconds(-5), 48_000), 0);
//!
//! // 480 frames at 48kHz correspond to 441 frames at 44.1kHz
//! assert_eq!(scale_frames(480, 48_000, 44_100), 441);
//! ```

use chrono::TimeDelta;
use std::time::Duration;

/// Clamp a reported delay to zero when negative
pub fn clamp_delay(delay: TimeDelta) -> TimeDelta {
    if delay < TimeDelta::zero() {
        TimeDelta::zero()
    } else {
        delay
    }
}

/// Convert a delay to a frame count at `sample_rate`
///
/// Rounds to the nearest frame. Negative delays yield 0; delays too large
/// for a `u32` frame count saturate.
pub fn time_to_frames(delay: TimeDelta, sample_rate: u32) -> u32 {
    let delay = clamp_delay(delay);
    let micros = delay.num_microseconds().unwrap_or(i64::MAX);
    let frames = (micros as f64 / 1_000_000.0 * sample_rate as f64).round();
    if frames >= u32::MAX as f64 {
        u32::MAX
    } else {
        frames as u32
    }
}

/// Duration spanned by `frames` at `sample_rate`
pub fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}

/// Re-express a frame count measured at `from_rate` at `to_rate`
///
/// Used to translate an output-rate delay into the source rate of a
/// resampling stage. Rounds to the nearest frame and saturates at `u32::MAX`.
pub fn scale_frames(frames: u32, from_rate: u32, to_rate: u32) -> u32 {
    if from_rate == to_rate {
        return frames;
    }
    if from_rate == 0 {
        return 0;
    }
    let scaled = (frames as f64 * to_rate as f64 / from_rate as f64).round();
    if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}
