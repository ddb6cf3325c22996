//! Dynamics Compressor Parameter Surface
//!
//! Validated parameter set for the downstream compressor stage. Only the
//! parameters live here; the gain computer runs outside this crate.

use serde::{Deserialize, Serialize};

use crate::error::{DspError, DspResult};

/// Compressor parameters in engineering units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Level above which gain reduction engages, in dBFS
    pub threshold_db: f32,

    /// Input-to-output slope above threshold (4.0 means 4:1)
    pub ratio: f32,

    /// Attack time constant in milliseconds
    pub attack_ms: f32,

    /// Release time constant in milliseconds
    pub release_ms: f32,

    /// Static gain applied after reduction, in dB
    pub makeup_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_db: 0.0,
        }
    }
}

impl CompressorParams {
    pub fn validate(&self) -> DspResult<()> {
        if !(-60.0..=0.0).contains(&self.threshold_db) {
            return Err(DspError::InvalidParameter {
                name: "threshold_db",
                value: self.threshold_db,
            });
        }
        if !(1.0..=20.0).contains(&self.ratio) {
            return Err(DspError::InvalidParameter {
                name: "ratio",
                value: self.ratio,
            });
        }
        if !(0.1..=500.0).contains(&self.attack_ms) {
            return Err(DspError::InvalidParameter {
                name: "attack_ms",
                value: self.attack_ms,
            });
        }
        if !(1.0..=5000.0).contains(&self.release_ms) {
            return Err(DspError::InvalidParameter {
                name: "release_ms",
                value: self.release_ms,
            });
        }
        if !(-12.0..=24.0).contains(&self.makeup_db) {
            return Err(DspError::InvalidParameter {
                name: "makeup_db",
                value: self.makeup_db,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CompressorParams::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_parameters_rejected() {
        let bad_ratio = CompressorParams {
            ratio: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            bad_ratio.validate(),
            Err(DspError::InvalidParameter { name: "ratio", .. })
        ));

        let bad_threshold = CompressorParams {
            threshold_db: 6.0,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let bad_attack = CompressorParams {
            attack_ms: 0.0,
            ..Default::default()
        };
        assert!(bad_attack.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let params = CompressorParams {
            threshold_db: -18.0,
            ratio: 3.0,
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: CompressorParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
