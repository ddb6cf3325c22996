//! Engine Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Crossfade behavior for device switches
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossfadeConfig {
    /// Fade length in seconds
    pub duration_secs: f64,

    /// How long the secondary path may take to warm up before the switch
    /// is abandoned and the current device keeps playing
    pub warmup_timeout_ms: u64,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            duration_secs: 0.5,
            warmup_timeout_ms: 2000,
        }
    }
}

impl CrossfadeConfig {
    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_millis(self.warmup_timeout_ms)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(0.05..=10.0).contains(&self.duration_secs) {
            return Err(EngineError::InvalidConfiguration(format!(
                "crossfade duration out of range: {}s",
                self.duration_secs
            )));
        }
        if self.warmup_timeout_ms < 100 {
            return Err(EngineError::InvalidConfiguration(format!(
                "warmup timeout too short: {}ms",
                self.warmup_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz the EQ is designed at (e.g., 44100, 48000, 96000)
    pub sample_rate: f64,

    /// Crossfade behavior
    pub crossfade: CrossfadeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            crossfade: CrossfadeConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(8000.0..=192000.0).contains(&self.sample_rate) {
            return Err(EngineError::InvalidConfiguration(format!(
                "invalid sample rate: {}",
                self.sample_rate
            )));
        }
        self.crossfade.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.crossfade.duration_secs, 0.5);
        assert_eq!(config.crossfade.warmup_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.sample_rate = 100.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.crossfade.duration_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.crossfade.warmup_timeout_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.sample_rate, back.sample_rate);
        assert_eq!(config.crossfade.warmup_timeout_ms, back.crossfade.warmup_timeout_ms);
    }
}
