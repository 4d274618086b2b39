//! Session configuration, loaded once at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vx_ir::Presets;

/// Which output the audio thread opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Cpal,
    /// No device; slots are consumed as soon as they are committed.
    Null,
}

/// Immutable per-session settings.
///
/// ```toml
/// backend = "cpal"
/// slot_count = 4
/// bpm = 120.0
///
/// [presets]
/// pcm_channels = 2
/// samplerate = 48000
/// buffer_size = 256
/// format = "float"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: BackendKind,
    pub presets: Presets,
    pub slot_count: usize,
    pub bpm: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            presets: Presets::default(),
            slot_count: 4,
            bpm: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Config file could not be read
    Io(String),
    /// Not valid TOML for a session
    Parse(String),
    /// Parsed, but a value is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config read error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.presets;
        if p.pcm_channels == 0 {
            return Err(ConfigError::Invalid("pcm_channels must be at least 1".into()));
        }
        if p.samplerate == 0 {
            return Err(ConfigError::Invalid("samplerate must be positive".into()));
        }
        if p.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be positive".into()));
        }
        if !(2..=8).contains(&self.slot_count) {
            return Err(ConfigError::Invalid(format!(
                "slot_count {} outside 2..=8",
                self.slot_count
            )));
        }
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(ConfigError::Invalid(format!("bpm {} must be positive", self.bpm)));
        }
        Ok(())
    }
}
