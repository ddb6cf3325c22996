//! OS Audio Boundary
//!
//! The [`TapHost`] trait is the only seam through which the rest of the
//! engine touches native audio objects. Everything above it works with the
//! opaque handles defined here, so the resource lifecycle and the switch
//! logic can run against [`crate::mock::MockTapHost`] in tests.

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Handle to a process tap. Zero is never a valid tap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TapId(pub u32);

impl TapId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Handle to an aggregate device. Zero is never a valid device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AggregateId(pub u32);

impl AggregateId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Opaque token for a registered IO callback, minted by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoProcId(pub u64);

/// Description read back from a created tap.
///
/// The UID is assigned by the system, not by us, and is what the aggregate
/// device's tap list must reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapDescriptor {
    pub uid: String,
}

/// Output device a capture path plays through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTarget {
    /// Follow the system default output
    SystemDefault,
    /// A specific output device by UID
    Uid(String),
}

/// Audio delivered by the host: an interleaved stereo buffer to process in
/// place, plus the device's current sample rate in Hz.
pub type IoCallback = Box<dyn FnMut(&mut [f32], f64) + Send>;

/// The native audio boundary: tap, aggregate device, and IO proc lifecycle.
///
/// Implementations must tolerate destroy calls for handles that are already
/// gone by returning an error; callers treat teardown errors as non-fatal.
pub trait TapHost: Send + Sync {
    /// Create a tap on one process's audio and read back its descriptor.
    fn create_process_tap(&self, pid: u32) -> Result<(TapId, TapDescriptor), PlatformError>;

    fn destroy_process_tap(&self, tap: TapId) -> Result<(), PlatformError>;

    /// Create an aggregate device binding the tap to the target output.
    fn create_aggregate_device(
        &self,
        descriptor: &TapDescriptor,
        target: &DeviceTarget,
        name: &str,
    ) -> Result<AggregateId, PlatformError>;

    fn destroy_aggregate_device(&self, device: AggregateId) -> Result<(), PlatformError>;

    /// Attach a callback to the device. The device is not started yet.
    fn register_io_callback(
        &self,
        device: AggregateId,
        callback: IoCallback,
    ) -> Result<IoProcId, PlatformError>;

    /// Detach a callback, blocking until any in-flight invocation returns.
    ///
    /// Must never be called from the callback's own thread.
    fn unregister_io_callback(
        &self,
        device: AggregateId,
        io_proc: IoProcId,
    ) -> Result<(), PlatformError>;

    fn start(&self, device: AggregateId, io_proc: IoProcId) -> Result<(), PlatformError>;

    fn stop(&self, device: AggregateId, io_proc: IoProcId) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handles_are_invalid() {
        assert!(!TapId::INVALID.is_valid());
        assert!(!AggregateId::default().is_valid());
        assert!(TapId(7).is_valid());
        assert!(AggregateId(3).is_valid());
    }

    #[test]
    fn test_device_target_serde_round_trip() {
        let target = DeviceTarget::Uid("AppleUSBAudioEngine:1234".into());
        let json = serde_json::to_string(&target).unwrap();
        let back: DeviceTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(target, back);

        let json = serde_json::to_string(&DeviceTarget::SystemDefault).unwrap();
        let back: DeviceTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DeviceTarget::SystemDefault);
    }
}
