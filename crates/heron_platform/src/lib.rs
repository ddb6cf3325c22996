//! Heron Platform - OS Audio Boundary
//!
//! Native handle lifecycle for per-process audio capture:
//! - [`TapHost`]: the trait seam over tap / aggregate device / IO proc calls
//! - [`DeviceResourceManager`]: ordered create and teardown of one path
//! - [`MockTapHost`]: recording fake for lifecycle and engine tests
//! - `CoreAudioTapHost`: the real macOS 14.4+ Process Tap implementation

mod error;
mod host;
pub mod mock;
mod resources;

#[cfg(target_os = "macos")]
mod macos;

pub use error::PlatformError;
pub use host::{
    AggregateId, DeviceTarget, IoCallback, IoProcId, TapDescriptor, TapHost, TapId,
};
pub use mock::{MockFailures, MockOp, MockTapHost};
pub use resources::{DeviceResourceManager, TapResourceSet};

#[cfg(target_os = "macos")]
pub use macos::CoreAudioTapHost;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let host = MockTapHost::new();
        let _manager = DeviceResourceManager::new(host);
        let _set = TapResourceSet::empty();
        assert!(!TapId::INVALID.is_valid());
    }
}
