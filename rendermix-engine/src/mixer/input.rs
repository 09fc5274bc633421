//! Mixer input and error-listener interfaces

use crate::audio::AudioBus;
use std::sync::{Arc, Mutex, Weak};

/// Producer of audio pulled by a combiner
///
/// Called on the rendering thread with the combiner's lock held. Must not
/// block, allocate in steady state, or call back into the mixer.
pub trait MixerInput: Send {
    /// Fill `dest` with the next `dest.frames()` frames.
    ///
    /// # Arguments
    /// - `dest`: Silent buffer at the input's declared channel count
    /// - `frames_delayed`: Frames (at the input's own rate) that will play
    ///   before the first frame of `dest` is audible
    ///
    /// # Returns
    /// Volume to apply when summing (0.0 skips the input)
    fn provide_input(&mut self, dest: &mut AudioBus, frames_delayed: u32) -> f32;
}

/// Handle through which inputs are registered
///
/// The mixer keeps only a `Weak` to it; the caller owns the input and must
/// remove it before dropping its last `Arc`.
pub type SharedInput = Arc<Mutex<dyn MixerInput>>;

pub(crate) type WeakInput = Weak<Mutex<dyn MixerInput>>;

/// Party interested in fatal sink errors
pub trait RenderErrorListener: Send + Sync {
    /// Called once per sink error, on the rendering thread. Must not call
    /// back into the mixer.
    fn on_render_error(&self);
}

/// Identity of a registered input (its allocation address)
///
/// Compares the data pointer only, so the same allocation seen through
/// different trait objects maps to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct InputKey(usize);

impl InputKey {
    pub(crate) fn of<T: ?Sized>(input: &Arc<T>) -> Self {
        Self(Arc::as_ptr(input) as *const () as usize)
    }

    pub(crate) fn of_weak<T: ?Sized>(input: &Weak<T>) -> Self {
        Self(Weak::as_ptr(input) as *const () as usize)
    }
}
