//! Mixer configuration loading
//!
//! Configuration file resolution follows this priority order:
//! 1. Explicit path supplied by the caller (e.g. a `--config` argument)
//! 2. `RENDERMIX_CONFIG` environment variable
//! 3. `<config dir>/rendermix/config.toml` (platform config directory)
//! 4. Compiled defaults
//!
//! After the file is loaded, `RENDERMIX_PAUSE_DELAY_MS` overrides the pause
//! delay when set.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "RENDERMIX_CONFIG";

/// Environment variable overriding `pause_delay_ms`
pub const PAUSE_DELAY_ENV: &str = "RENDERMIX_PAUSE_DELAY_MS";

/// Idle time before the mixer pauses its sink
pub const DEFAULT_PAUSE_DELAY_MS: u64 = 10_000;

/// Extra silence, beyond the pause delay, before the muted-audio suspender
/// switches to the fake sink
pub const DEFAULT_SUSPEND_MARGIN_MS: u64 = 500;

/// Mixer tuning loaded from TOML
///
/// ```toml
/// pause_delay_ms = 10000
/// suspend_muted_audio = true
/// suspend_margin_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MixerConfig {
    /// Idle time with zero inputs before the sink is paused
    pub pause_delay_ms: u64,

    /// Suspend the physical sink during sustained silence
    pub suspend_muted_audio: bool,

    /// Added to `pause_delay_ms` to form the silence timeout, so an explicit
    /// pause always fires before silence-based suspension
    pub suspend_margin_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            pause_delay_ms: DEFAULT_PAUSE_DELAY_MS,
            suspend_muted_audio: false,
            suspend_margin_ms: DEFAULT_SUSPEND_MARGIN_MS,
        }
    }
}

impl MixerConfig {
    /// Resolve and load the configuration
    ///
    /// # Errors
    /// - An explicit or env-named file that cannot be read or parsed
    /// - A malformed file at the platform default location
    /// - A non-numeric `RENDERMIX_PAUSE_DELAY_MS`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No mixer config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded mixer config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str::<MixerConfig>(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(PAUSE_DELAY_ENV) {
            let ms = value.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{} must be a number of milliseconds, got '{}'", PAUSE_DELAY_ENV, value))
            })?;
            debug!("Pause delay overridden by {}: {}ms", PAUSE_DELAY_ENV, ms);
            self.pause_delay_ms = ms;
        }
        Ok(())
    }

    pub fn pause_delay(&self) -> Duration {
        Duration::from_millis(self.pause_delay_ms)
    }

    /// Silence required before the suspender swaps to the fake sink
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.pause_delay_ms.saturating_add(self.suspend_margin_ms))
    }
}

/// Pick the configuration file to load, if any
fn resolve_config_path(explicit_path: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: caller-supplied path
    if let Some(path) = explicit_path {
        return Ok(Some(path.to_path_buf()));
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(Some(PathBuf::from(path)));
    }

    // Priority 3: platform config directory
    match default_config_file() {
        Some(path) if path.exists() => Ok(Some(path)),
        Some(_) => Ok(None),
        None => {
            warn!("Could not determine platform config directory");
            Ok(None)
        }
    }
}

/// `<config dir>/rendermix/config.toml` for the current platform
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rendermix").join("config.toml"))
}
