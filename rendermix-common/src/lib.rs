//! # rendermix common library
//!
//! Shared code for the rendermix workspace:
//! - Audio format description (`AudioParameters`, `ChannelLayout`)
//! - Time and frame conversions used by the render path
//! - Monotonic clock abstraction (real and manually advanced)
//! - Mixer configuration loading
//! - Common error type

pub mod clock;
pub mod config;
pub mod error;
pub mod params;
pub mod timing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MixerConfig;
pub use error::{Error, Result};
pub use params::{AudioParameters, ChannelLayout};
