//! Planar audio buffer exchanged between sinks, combiners and inputs
//!
//! **Format:**
//! - Samples are f32 (floating point -1.0 to 1.0)
//! - One `Vec<f32>` per channel (planar), all of equal length
//! - Planar layout matches what rubato consumes, so resampling stages
//!   can hand the planes straight to the converter

use rendermix_common::AudioParameters;

/// Planar multi-channel audio buffer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBus {
    planes: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBus {
    /// Create a silent bus
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            planes: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    /// Create a silent bus sized for one buffer of `params`
    pub fn for_params(params: &AudioParameters) -> Self {
        Self::new(params.channels(), params.frames_per_buffer())
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.planes[channel]
    }

    /// All channel planes, each exactly `frames()` long
    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }

    /// Change the frame count, zero-filling any new frames
    ///
    /// Does not allocate when shrinking or when growing within the capacity
    /// the bus already had.
    pub fn set_frames(&mut self, frames: usize) {
        if frames == self.frames {
            return;
        }
        for plane in self.planes.iter_mut() {
            plane.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    /// Silence every frame
    pub fn zero(&mut self) {
        for plane in self.planes.iter_mut() {
            plane.fill(0.0);
        }
    }

    /// Silence frames `start..frames()`
    pub fn zero_frames_from(&mut self, start: usize) {
        let start = start.min(self.frames);
        for plane in self.planes.iter_mut() {
            plane[start..].fill(0.0);
        }
    }

    /// Set every sample to `value`
    pub fn fill(&mut self, value: f32) {
        for plane in self.planes.iter_mut() {
            plane.fill(value);
        }
    }

    /// True when every sample is exactly zero
    pub fn are_frames_zero(&self) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.iter().all(|&s| s == 0.0))
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.planes
            .iter()
            .flat_map(|plane| plane.iter())
            .fold(0.0f32, |peak, &s| peak.max(s.abs()))
    }

    /// Multiply every sample by `volume`
    pub fn scale(&mut self, volume: f32) {
        for plane in self.planes.iter_mut() {
            for sample in plane.iter_mut() {
                *sample *= volume;
            }
        }
    }

    /// Sum `source * volume` into this bus, mapping channels
    ///
    /// Channel mapping:
    /// - equal channel counts: channel by channel
    /// - mono source: duplicated into every destination channel
    /// - mono destination: average of all source channels
    /// - otherwise: the first `min(src, dest)` channels, extra destination
    ///   channels are left untouched
    ///
    /// Only the first `min(self.frames(), source.frames())` frames are mixed.
    pub fn accumulate_from(&mut self, source: &AudioBus, volume: f32) {
        let frames = self.frames.min(source.frames);
        let src_channels = source.channels();
        let dest_channels = self.channels();
        if frames == 0 || src_channels == 0 || dest_channels == 0 {
            return;
        }

        if src_channels == dest_channels {
            for (dest, src) in self.planes.iter_mut().zip(source.planes.iter()) {
                mix_plane(&mut dest[..frames], &src[..frames], volume);
            }
        } else if src_channels == 1 {
            let src = &source.planes[0][..frames];
            for dest in self.planes.iter_mut() {
                mix_plane(&mut dest[..frames], src, volume);
            }
        } else if dest_channels == 1 {
            let gain = volume / src_channels as f32;
            for src in source.planes.iter() {
                mix_plane(&mut self.planes[0][..frames], &src[..frames], gain);
            }
        } else {
            for (dest, src) in self.planes.iter_mut().zip(source.planes.iter()) {
                mix_plane(&mut dest[..frames], &src[..frames], volume);
            }
        }
    }

    /// Copy `count` frames from `source` planes, starting at `src_offset`,
    /// into this bus starting at `dest_offset`
    ///
    /// `source` must have the same channel count as this bus.
    pub fn copy_frames_from(
        &mut self,
        source: &[Vec<f32>],
        src_offset: usize,
        dest_offset: usize,
        count: usize,
    ) {
        debug_assert_eq!(source.len(), self.channels());
        for (dest, src) in self.planes.iter_mut().zip(source.iter()) {
            dest[dest_offset..dest_offset + count]
                .copy_from_slice(&src[src_offset..src_offset + count]);
        }
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    ///
    /// Trailing samples that do not form a whole frame are dropped.
    pub fn from_interleaved(samples: &[f32], channels: usize) -> Self {
        if channels == 0 {
            return Self::new(0, 0);
        }

        let frames = samples.len() / channels;
        let mut bus = Self::new(channels, frames);

        for (frame_idx, frame) in samples.chunks_exact(channels).enumerate() {
            for (ch_idx, &sample) in frame.iter().enumerate() {
                bus.planes[ch_idx][frame_idx] = sample;
            }
        }

        bus
    }

    /// Convert planar samples to interleaved format.
    ///
    /// Input:  [[L, L, L, ...], [R, R, R, ...]]
    /// Output: [L, R, L, R, L, R, ...]
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = vec![0.0; self.frames * self.channels()];
        self.write_interleaved(&mut interleaved);
        interleaved
    }

    /// Interleave into a caller-provided slice without allocating
    ///
    /// Writes `min(out.len() / channels, frames())` frames.
    pub fn write_interleaved(&self, out: &mut [f32]) {
        let channels = self.channels();
        if channels == 0 {
            return;
        }

        for (frame_idx, frame) in out.chunks_exact_mut(channels).take(self.frames).enumerate() {
            for (ch_idx, sample) in frame.iter_mut().enumerate() {
                *sample = self.planes[ch_idx][frame_idx];
            }
        }
    }
}

fn mix_plane(dest: &mut [f32], src: &[f32], volume: f32) {
    if volume == 1.0 {
        for (d, s) in dest.iter_mut().zip(src.iter()) {
            *d += *s;
        }
    } else {
        for (d, s) in dest.iter_mut().zip(src.iter()) {
            *d += *s * volume;
        }
    }
}
