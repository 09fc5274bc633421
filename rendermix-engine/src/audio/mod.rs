//! Audio data containers and the sample-rate conversion primitive

pub mod bus;
pub mod resampler;

pub use bus::AudioBus;
pub use resampler::RateConverter;
