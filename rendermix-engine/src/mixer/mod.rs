//! Mixing graph
//!
//! - `input`: what the mixer pulls from and who hears about errors
//! - `combiner`: summing of same-rate inputs
//! - `stage`: one resampling stage per non-native rate
//! - `core`: the [`Mixer`] itself
//! - `suspender`: swaps the sink for a fake one during sustained silence

pub(crate) mod combiner;
mod core;
pub mod input;
pub mod stage;
pub mod suspender;

pub use self::core::Mixer;
pub use input::{MixerInput, RenderErrorListener, SharedInput};
pub use stage::ResamplingStage;
pub use suspender::SilentSinkSuspender;
