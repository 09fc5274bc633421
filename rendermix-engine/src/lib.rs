//! # rendermix engine
//!
//! Real-time mixing of many independently produced audio streams into one
//! output sink.
//!
//! **Architecture:** inputs at the sink's sample rate are summed directly by
//! the master combiner; inputs at any other rate are grouped into one
//! rubato-backed resampling stage per rate, and each stage is itself an input
//! of the master combiner. The sink drives everything by calling
//! [`Mixer::render`](sink::RenderCallback::render) on its own thread.
//!
//! ```text
//!  input@48k ─────────────────────────┐
//!  input@48k ─────────────────────────┤
//!  input@44.1k ─┐                     ├─► master combiner ─► sink
//!  input@44.1k ─┴─► stage(44.1k→48k) ─┤
//!  input@22.05k ──► stage(22.05k→48k) ┘
//! ```

pub mod audio;
pub mod error;
pub mod mixer;
pub mod sink;

pub use audio::AudioBus;
pub use error::{Error, Result};
pub use mixer::{Mixer, MixerInput, RenderErrorListener, SharedInput, SilentSinkSuspender};
pub use sink::{AudioRendererSink, NullAudioSink, RenderCallback};

pub use rendermix_common::{AudioParameters, ChannelLayout, Clock, ManualClock, MixerConfig, SystemClock};
