//! Platform Error Types

use thiserror::Error;

/// Errors from platform-specific operations
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Feature not available on this platform: {0}")]
    FeatureNotAvailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Process {0} not found or not playing audio")]
    ProcessNotFound(u32),

    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to create process tap: {0}")]
    TapCreationFailed(String),

    #[error("Failed to create aggregate device: {0}")]
    AggregateCreationFailed(String),

    #[error("IO proc operation failed: {0}")]
    IoProcFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::ProcessNotFound(4242);
        assert!(err.to_string().contains("4242"));

        let err = PlatformError::DeviceNotFound("BuiltInSpeakerDevice".into());
        assert!(err.to_string().contains("BuiltInSpeakerDevice"));
    }
}
