//! Engine Error Types

use thiserror::Error;

use heron_dsp::DspError;
use heron_platform::PlatformError;

/// Errors from the audio engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to spawn engine thread: {0}")]
    ThreadSpawnFailed(String),

    #[error("Engine control channel is closed")]
    ChannelClosed,

    #[error("Device switch failed: {0}")]
    SwitchFailed(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::UnknownPreset("Mega Bass".into());
        assert!(err.to_string().contains("Mega Bass"));

        let err: EngineError = DspError::InvalidBandIndex(12).into();
        assert!(matches!(err, EngineError::Dsp(_)));
        assert!(err.to_string().contains("12"));

        let err: EngineError = PlatformError::ProcessNotFound(55).into();
        assert!(matches!(err, EngineError::Platform(_)));
    }
}
