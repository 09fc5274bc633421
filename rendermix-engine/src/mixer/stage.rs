//! Per-sample-rate resampling stage
//!
//! Every input at a given non-native rate is summed by the stage's own
//! combiner at that rate, then converted once to the output rate. The stage
//! is itself a [`MixerInput`], registered with the master combiner for its
//! whole lifetime.

use super::combiner::Combiner;
use super::input::{InputKey, MixerInput, SharedInput};
use crate::audio::{AudioBus, RateConverter};
use crate::error::Result;
use rendermix_common::timing::scale_frames;
use rendermix_common::AudioParameters;

/// Combiner at one source rate feeding a rate converter
pub struct ResamplingStage {
    id: u64,
    input_rate: u32,
    output_rate: u32,
    combiner: Combiner,
    converter: RateConverter,
}

impl ResamplingStage {
    /// Create an empty stage converting `input_params`' rate to
    /// `output_params`' rate.
    ///
    /// The stage works at the output channel count; inputs are channel-mapped
    /// into it before conversion.
    ///
    /// # Errors
    /// `Error::Resampler` if the converter rejects the rate pair.
    pub fn new(id: u64, input_params: &AudioParameters, output_params: &AudioParameters) -> Result<Self> {
        let converter = RateConverter::new(
            input_params.sample_rate(),
            output_params.sample_rate(),
            output_params.channels(),
            output_params.frames_per_buffer(),
        )?;

        Ok(Self {
            id,
            input_rate: input_params.sample_rate(),
            output_rate: output_params.sample_rate(),
            combiner: Combiner::new(converter.max_input_frames()),
            converter,
        })
    }

    /// Creation-order id assigned by the owning mixer
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Register an input. Returns `false` if it is already registered.
    pub fn add_input(&mut self, input: &SharedInput, channels: usize) -> bool {
        self.combiner.add_input(input, channels)
    }

    pub(crate) fn remove_input(&mut self, key: InputKey) -> bool {
        self.combiner.remove_input(key)
    }

    pub fn input_count(&self) -> usize {
        self.combiner.len()
    }

    /// Buffers (or parts of buffers) replaced by silence because the
    /// converter failed
    pub fn conversion_failures(&self) -> u64 {
        self.converter.failures()
    }
    pub fn is_empty(&self) -> bool {
        self.combiner.is_empty()
    }
}

impl MixerInput for ResamplingStage {
    fn provide_input(&mut self, dest: &mut AudioBus, frames_delayed: u32) -> f32 {
        let (input_rate, output_rate) = (self.input_rate, self.output_rate);
        let combiner = &mut self.combiner;

        let converted = self.converter.convert(dest, |source, queued| {
            let queued = u32::try_from(queued).unwrap_or(u32::MAX);
            let delay = scale_frames(frames_delayed.saturating_add(queued), output_rate, input_rate);
            combiner.convert_with_delay(delay, source);
        });

        // Failures are counted by the converter, which also silenced the
        // unwritten tail
        debug_assert!(converted.is_ok() || self.converter.failures() > 0);
        1.0
    }
}

impl std::fmt::Debug for ResamplingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResamplingStage")
            .field("id", &self.id)
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("inputs", &self.combiner.len())
            .field("conversion_failures", &self.conversion_failures())
            .finish()
    }
}
