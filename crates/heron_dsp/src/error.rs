//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Invalid band index: {0} (must be 0-9)")]
    InvalidBandIndex(usize),

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("Coefficient update queue is full")]
    UpdateQueueFull,
}

/// Result alias for DSP operations
pub type DspResult<T> = Result<T, DspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DspError::InvalidBandIndex(15);
        assert!(err.to_string().contains("15"));

        let err = DspError::InvalidParameter {
            name: "ratio",
            value: 0.5,
        };
        assert!(err.to_string().contains("ratio"));
        assert!(err.to_string().contains("0.5"));

        let err = DspError::InvalidSampleRate(-1.0);
        assert!(err.to_string().contains("-1"));
    }
}
