//! Audio sink abstraction
//!
//! A sink owns an output device (real or simulated) and drives the mixer by
//! calling [`RenderCallback::render`] on its own thread once per buffer
//! period.
//!
//! **Lifecycle:** `initialize` → `start` (rendering begins) → any number of
//! `pause`/`play` → `stop` (terminal).
//!
//! The sink only ever holds a `Weak` reference to its callback. The mixer
//! owns the sink, so a strong reference back would leak both.

pub mod fake_worker;
pub mod null;

#[cfg(feature = "cpal-output")]
pub mod cpal_output;

pub use fake_worker::{FakeRenderWorker, PendingStop};
pub use null::{NullAudioSink, SinkMetrics};

#[cfg(feature = "cpal-output")]
pub use cpal_output::CpalSink;

use crate::audio::AudioBus;
use chrono::TimeDelta;
use rendermix_common::AudioParameters;
use std::sync::Weak;
use std::time::Instant;

/// Producer of mixed audio, invoked by a sink on its rendering thread
///
/// Implementations run on a real-time thread. They must not block for an
/// unbounded time, allocate in steady state, or log.
pub trait RenderCallback: Send + Sync {
    /// Fill `dest` with the next buffer of audio.
    ///
    /// # Arguments
    /// - `delay`: Estimated time until the first frame of `dest` is audible.
    ///   May be negative if the device reports nonsense
    /// - `delay_timestamp`: When `delay` was measured
    /// - `prior_frames_skipped`: Frames the device dropped since the last call
    /// - `dest`: Buffer to fill, sized by the sink
    ///
    /// # Returns
    /// Number of frames written (normally `dest.frames()`)
    fn render(
        &self,
        delay: TimeDelta,
        delay_timestamp: Instant,
        prior_frames_skipped: u32,
        dest: &mut AudioBus,
    ) -> usize;

    /// The sink hit a fatal rendering error
    fn on_render_error(&self);
}

/// Output device consumed by the mixer
pub trait AudioRendererSink: Send + Sync {
    /// Bind the output format and the callback that will produce audio
    fn initialize(&self, params: &AudioParameters, callback: Weak<dyn RenderCallback>);

    /// Begin rendering (auto-play)
    fn start(&self);

    /// Resume rendering after `pause`
    fn play(&self);

    /// Stop calling the render callback until `play`
    fn pause(&self);

    /// Stop rendering for good. No render call starts after this returns
    /// unless `stop` is called from the rendering thread itself.
    fn stop(&self);

    /// True when called from the thread that invokes the render callback
    fn current_thread_is_rendering_thread(&self) -> bool;
}
