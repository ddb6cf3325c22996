//! Recording TapHost for Tests
//!
//! Mints handles, records every host call in order, and lets tests drive
//! registered callbacks buffer-by-buffer the way the device would. Shared
//! by this crate's lifecycle tests and the engine's switch tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PlatformError;
use crate::host::{
    AggregateId, DeviceTarget, IoCallback, IoProcId, TapDescriptor, TapHost, TapId,
};

/// One host call, recorded in invocation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    CreateTap(u32),
    DestroyTap(u32),
    CreateAggregate(String),
    DestroyAggregate(u32),
    RegisterIoProc(u32),
    UnregisterIoProc { device: u32, io_proc: u64 },
    Start(u32),
    Stop(u32),
}

/// Which host calls should fail with an injected error
#[derive(Debug, Default, Clone, Copy)]
pub struct MockFailures {
    pub create_tap: bool,
    pub create_aggregate: bool,
    pub register: bool,
    pub start: bool,
    pub stop: bool,
    pub unregister: bool,
    pub destroy_aggregate: bool,
    pub destroy_tap: bool,
}

#[derive(Default)]
pub struct MockTapHost {
    ops: Mutex<Vec<MockOp>>,
    failures: Mutex<MockFailures>,
    callbacks: Mutex<HashMap<u64, IoCallback>>,
    next_handle: AtomicU32,
    next_io_proc: AtomicU64,
}

impl MockTapHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failures(&self, failures: MockFailures) {
        *self.failures.lock() = failures;
    }

    /// Everything recorded so far, in order
    pub fn ops(&self) -> Vec<MockOp> {
        self.ops.lock().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    /// Number of callbacks still registered
    pub fn registered_callbacks(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Invoke a registered callback over `buffer`, as the device would.
    ///
    /// Returns false if no callback is registered under `io_proc`.
    pub fn drive(&self, io_proc: IoProcId, buffer: &mut [f32], sample_rate: f64) -> bool {
        let mut callbacks = self.callbacks.lock();
        match callbacks.get_mut(&io_proc.0) {
            Some(callback) => {
                callback(buffer, sample_rate);
                true
            }
            None => false,
        }
    }

    /// Drive `frames` frames of silence through a callback.
    pub fn drive_silence(&self, io_proc: IoProcId, frames: usize, sample_rate: f64) -> bool {
        let mut buffer = vec![0.0_f32; frames * 2];
        self.drive(io_proc, &mut buffer, sample_rate)
    }

    fn record(&self, op: MockOp) {
        self.ops.lock().push(op);
    }

    fn injected(kind: &str) -> PlatformError {
        PlatformError::Internal(format!("injected {kind} failure"))
    }
}

impl TapHost for MockTapHost {
    fn create_process_tap(&self, pid: u32) -> Result<(TapId, TapDescriptor), PlatformError> {
        self.record(MockOp::CreateTap(pid));
        if self.failures.lock().create_tap {
            return Err(Self::injected("create_tap"));
        }
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        Ok((
            TapId(id),
            TapDescriptor {
                uid: format!("mock-tap-{id}"),
            },
        ))
    }

    fn destroy_process_tap(&self, tap: TapId) -> Result<(), PlatformError> {
        self.record(MockOp::DestroyTap(tap.0));
        if self.failures.lock().destroy_tap {
            return Err(Self::injected("destroy_tap"));
        }
        Ok(())
    }

    fn create_aggregate_device(
        &self,
        descriptor: &TapDescriptor,
        _target: &DeviceTarget,
        _name: &str,
    ) -> Result<AggregateId, PlatformError> {
        self.record(MockOp::CreateAggregate(descriptor.uid.clone()));
        if self.failures.lock().create_aggregate {
            return Err(Self::injected("create_aggregate"));
        }
        Ok(AggregateId(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn destroy_aggregate_device(&self, device: AggregateId) -> Result<(), PlatformError> {
        self.record(MockOp::DestroyAggregate(device.0));
        if self.failures.lock().destroy_aggregate {
            return Err(Self::injected("destroy_aggregate"));
        }
        Ok(())
    }

    fn register_io_callback(
        &self,
        device: AggregateId,
        callback: IoCallback,
    ) -> Result<IoProcId, PlatformError> {
        self.record(MockOp::RegisterIoProc(device.0));
        if self.failures.lock().register {
            return Err(Self::injected("register"));
        }
        let token = self.next_io_proc.fetch_add(1, Ordering::Relaxed) + 1;
        self.callbacks.lock().insert(token, callback);
        Ok(IoProcId(token))
    }

    fn unregister_io_callback(
        &self,
        device: AggregateId,
        io_proc: IoProcId,
    ) -> Result<(), PlatformError> {
        self.record(MockOp::UnregisterIoProc {
            device: device.0,
            io_proc: io_proc.0,
        });
        if self.failures.lock().unregister {
            return Err(Self::injected("unregister"));
        }
        self.callbacks.lock().remove(&io_proc.0);
        Ok(())
    }

    fn start(&self, device: AggregateId, _io_proc: IoProcId) -> Result<(), PlatformError> {
        self.record(MockOp::Start(device.0));
        if self.failures.lock().start {
            return Err(Self::injected("start"));
        }
        Ok(())
    }

    fn stop(&self, device: AggregateId, _io_proc: IoProcId) -> Result<(), PlatformError> {
        self.record(MockOp::Stop(device.0));
        if self.failures.lock().stop {
            return Err(Self::injected("stop"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_and_drives() {
        let host = MockTapHost::new();
        let (tap, descriptor) = host.create_process_tap(101).unwrap();
        let device = host
            .create_aggregate_device(&descriptor, &DeviceTarget::SystemDefault, "test")
            .unwrap();

        let seen = Arc::new(AtomicU32::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let io_proc = host
            .register_io_callback(
                device,
                Box::new(move |buffer, _rate| {
                    seen_in_callback.fetch_add(buffer.len() as u32, Ordering::Relaxed);
                }),
            )
            .unwrap();

        assert!(host.drive_silence(io_proc, 128, 48000.0));
        assert_eq!(seen.load(Ordering::Relaxed), 256);

        host.unregister_io_callback(device, io_proc).unwrap();
        assert!(!host.drive_silence(io_proc, 128, 48000.0));

        let ops = host.ops();
        assert_eq!(ops[0], MockOp::CreateTap(101));
        assert!(matches!(ops[1], MockOp::CreateAggregate(_)));
        assert_eq!(ops[2], MockOp::RegisterIoProc(device.0));
        assert!(tap.is_valid());
    }

    #[test]
    fn test_failure_injection() {
        let host = MockTapHost::new();
        host.set_failures(MockFailures {
            create_tap: true,
            ..Default::default()
        });
        assert!(host.create_process_tap(1).is_err());
    }
}
