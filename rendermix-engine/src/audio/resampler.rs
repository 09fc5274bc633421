//! Streaming sample-rate conversion using rubato
//!
//! A resampling stage pulls audio at its source rate and must hand the mixer
//! exactly one output buffer per render call. `RateConverter` wraps rubato's
//! `FastFixedOut`, which produces a fixed number of output frames per chunk
//! and tells us up front how many input frames it needs for the next one.
//!
//! All buffers are allocated at construction. `convert` only reuses them, so
//! it may run on the audio thread.

use crate::audio::AudioBus;
use crate::error::{Error, Result};
use rubato::{FastFixedOut, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Pull-driven sample-rate converter with a fixed output chunk
pub struct RateConverter {
    resampler: FastFixedOut<f32>,
    input_rate: u32,
    output_rate: u32,

    /// Source audio for the next chunk, capacity `input_frames_max`
    input: AudioBus,

    /// Converted audio, one `output_frames_max` plane per channel
    output: Vec<Vec<f32>>,

    /// Valid frames in `output`
    output_len: usize,

    /// Frames of `output` already handed out
    output_pos: usize,

    /// Resampler passes that returned an error
    failures: u64,
}

impl RateConverter {
    /// Create a converter.
    ///
    /// # Arguments
    /// - `input_rate`: Sample rate the inputs produce
    /// - `output_rate`: Sample rate the caller consumes
    /// - `channels`: Channel count on both sides
    /// - `chunk_frames`: Output frames produced per resampler pass
    ///   (normally the sink's frames per buffer)
    ///
    /// # Errors
    /// `Error::Resampler` if rubato rejects the ratio or chunk size.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let ratio = output_rate as f64 / input_rate as f64;

        let resampler = FastFixedOut::<f32>::new(
            ratio,
            1.0, // max_relative_ratio (no runtime changes)
            PolynomialDegree::Septic, // High quality polynomial
            chunk_frames,
            channels,
        )
        .map_err(|e| {
            Error::Resampler(format!(
                "Failed to create resampler {}Hz -> {}Hz: {}",
                input_rate, output_rate, e
            ))
        })?;

        let input_max = resampler.input_frames_max();
        let output_max = resampler.output_frames_max();

        let mut input = AudioBus::new(channels, input_max);
        input.set_frames(resampler.input_frames_next());

        debug!(
            "Created rate converter {}Hz -> {}Hz ({} channels, {} frame chunks)",
            input_rate, output_rate, channels, chunk_frames
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            input,
            output: vec![vec![0.0; output_max]; channels],
            output_len: 0,
            output_pos: 0,
            failures: 0,
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn channels(&self) -> usize {
        self.output.len()
    }

    /// Largest input request `convert` will ever make
    pub fn max_input_frames(&self) -> usize {
        self.resampler.input_frames_max()
    }

    /// Number of `convert` calls that failed since construction
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Converted frames waiting to be handed out
    pub fn buffered_frames(&self) -> usize {
        self.output_len - self.output_pos
    }

    /// Fill `dest` completely with converted audio.
    ///
    /// Whenever the converted backlog runs dry, `provide` is called with a
    /// silent bus of exactly the size the resampler needs next, plus the
    /// number of output-rate frames that will play before that audio
    /// (frames already written to `dest` in this call).
    ///
    /// # Errors
    /// `Error::Resampler` if rubato fails; the unwritten tail of `dest` is
    /// silenced before returning.
    pub fn convert<F>(&mut self, dest: &mut AudioBus, mut provide: F) -> Result<()>
    where
        F: FnMut(&mut AudioBus, usize),
    {
        debug_assert_eq!(dest.channels(), self.channels());

        let wanted = dest.frames();
        let mut written = 0;

        while written < wanted {
            if self.output_pos == self.output_len {
                let queued = written;
                if let Err(e) = self.refill(queued, &mut provide) {
                    self.failures += 1;
                    self.output_len = 0;
                    self.output_pos = 0;
                    dest.zero_frames_from(written);
                    return Err(e);
                }
                if self.output_len == 0 {
                    dest.zero_frames_from(written);
                    return Ok(());
                }
            }

            let count = (self.output_len - self.output_pos).min(wanted - written);
            dest.copy_frames_from(&self.output, self.output_pos, written, count);
            self.output_pos += count;
            written += count;
        }

        Ok(())
    }

    fn refill<F>(&mut self, queued: usize, provide: &mut F) -> Result<()>
    where
        F: FnMut(&mut AudioBus, usize),
    {
        self.input.set_frames(self.resampler.input_frames_next());
        self.input.zero();
        provide(&mut self.input, queued);

        let (_, produced) = self
            .resampler
            .process_into_buffer(self.input.planes(), &mut self.output, None)
            .map_err(|e| Error::Resampler(format!("Resampling failed: {}", e)))?;

        self.output_len = produced;
        self.output_pos = 0;
        Ok(())
    }
}

impl std::fmt::Debug for RateConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateConverter")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("channels", &self.channels())
            .field("buffered_frames", &self.buffered_frames())
            .field("failures", &self.failures)
            .finish()
    }
}
