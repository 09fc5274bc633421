//! Summing of same-rate inputs into one bus
//!
//! A `Combiner` pulls every registered input into its own scratch bus and
//! accumulates the result, with channel mapping, into the destination. It
//! holds inputs weakly: an input dropped without being removed is skipped.

use super::input::{InputKey, SharedInput, WeakInput};
use crate::audio::AudioBus;
use std::sync::{Arc, PoisonError};

struct InputSlot {
    key: InputKey,
    input: WeakInput,
    /// Pull buffer at the input's channel count
    scratch: AudioBus,
}

/// Sums a set of inputs that share one sample rate
pub struct Combiner {
    frames_per_buffer: usize,
    slots: Vec<InputSlot>,
}

impl Combiner {
    /// Create an empty combiner.
    ///
    /// `frames_per_buffer` sizes the scratch bus of each input at
    /// registration, so rendering at or below that size never allocates.
    pub fn new(frames_per_buffer: usize) -> Self {
        Self {
            frames_per_buffer,
            slots: Vec::new(),
        }
    }

    /// Register `input`, which produces `channels` channels.
    ///
    /// Returns `false` (and changes nothing) if it is already registered.
    pub fn add_input(&mut self, input: &SharedInput, channels: usize) -> bool {
        let key = InputKey::of(input);
        if self.contains(key) {
            return false;
        }
        self.slots.push(InputSlot {
            key,
            input: Arc::downgrade(input),
            scratch: AudioBus::new(channels, self.frames_per_buffer),
        });
        true
    }

    /// Unregister the input with `key`. Returns `false` if it was not present.
    pub(crate) fn remove_input(&mut self, key: InputKey) -> bool {
        match self.slots.iter().position(|slot| slot.key == key) {
            Some(index) => {
                self.slots.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, key: InputKey) -> bool {
        self.slots.iter().any(|slot| slot.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of registered inputs (including any whose owner has dropped them)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Overwrite `dest` with the sum of all inputs.
    ///
    /// Each input is asked for `dest.frames()` frames with `frames_delayed`
    /// passed through unchanged. Inputs returning a volume of zero or less
    /// are not mixed.
    pub fn convert_with_delay(&mut self, frames_delayed: u32, dest: &mut AudioBus) {
        dest.zero();

        for slot in self.slots.iter_mut() {
            let Some(input) = slot.input.upgrade() else {
                continue;
            };

            slot.scratch.set_frames(dest.frames());
            slot.scratch.zero();

            let volume = {
                let mut input = input.lock().unwrap_or_else(PoisonError::into_inner);
                input.provide_input(&mut slot.scratch, frames_delayed)
            };

            if volume > 0.0 {
                dest.accumulate_from(&slot.scratch, volume);
            }
        }
    }
}

impl std::fmt::Debug for Combiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Combiner")
            .field("frames_per_buffer", &self.frames_per_buffer)
            .field("inputs", &self.slots.len())
            .finish()
    }
}
