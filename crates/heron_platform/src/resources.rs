//! Tap Resource Lifecycle
//!
//! Owns the create/teardown choreography for the native handles behind one
//! capture path: process tap, aggregate device, IO proc registration.
//!
//! Teardown order is load-bearing:
//!
//! 1. stop the device
//! 2. destroy the IO proc (blocks until in-flight callbacks return)
//! 3. destroy the aggregate device
//! 4. destroy the tap
//!
//! Destroying the aggregate while its IO proc can still fire is a
//! use-after-free in the HAL, so step 2 always precedes step 3. Individual
//! step failures are logged and the remaining steps still run; a handle we
//! fail to release is better than handles we never try to release.

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::host::{DeviceTarget, IoCallback, IoProcId, TapHost};

/// Native handles backing one capture path.
///
/// `io_proc` is only ever set while `aggregate` is valid.
#[derive(Debug, Default)]
pub struct TapResourceSet {
    pub tap: crate::host::TapId,
    pub aggregate: crate::host::AggregateId,
    pub io_proc: Option<IoProcId>,
    pub descriptor: Option<crate::host::TapDescriptor>,
}

impl TapResourceSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any live native handle is held
    pub fn is_active(&self) -> bool {
        self.tap.is_valid() || self.aggregate.is_valid()
    }

    /// Move the handles out, leaving the set empty
    fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Creates and destroys capture paths against a [`TapHost`]
pub struct DeviceResourceManager {
    host: Arc<dyn TapHost>,
}

impl DeviceResourceManager {
    pub fn new(host: Arc<dyn TapHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<dyn TapHost> {
        &self.host
    }

    /// Bring up a full capture path for one process: tap, aggregate bound
    /// to the target output, registered and started IO callback.
    ///
    /// On any failure the partially created handles are rolled back and an
    /// empty (inactive) set comes back. Callers check
    /// [`TapResourceSet::is_active`] rather than handling an error.
    pub fn acquire(
        &self,
        pid: u32,
        target: &DeviceTarget,
        name: &str,
        callback: IoCallback,
    ) -> TapResourceSet {
        let (tap, descriptor) = match self.host.create_process_tap(pid) {
            Ok(created) => created,
            Err(err) => {
                warn!(pid, error = %err, "process tap creation failed");
                return TapResourceSet::empty();
            }
        };
        debug!(pid, tap = tap.0, uid = %descriptor.uid, "process tap created");

        let aggregate = match self.host.create_aggregate_device(&descriptor, target, name) {
            Ok(device) => device,
            Err(err) => {
                warn!(pid, error = %err, "aggregate creation failed, rolling back tap");
                if let Err(err) = self.host.destroy_process_tap(tap) {
                    warn!(tap = tap.0, error = %err, "tap rollback failed");
                }
                return TapResourceSet::empty();
            }
        };
        debug!(pid, aggregate = aggregate.0, "aggregate device created");

        let io_proc = match self.host.register_io_callback(aggregate, callback) {
            Ok(io_proc) => io_proc,
            Err(err) => {
                warn!(pid, error = %err, "io proc registration failed, rolling back");
                let mut partial = TapResourceSet {
                    tap,
                    aggregate,
                    io_proc: None,
                    descriptor: Some(descriptor),
                };
                self.destroy(&mut partial);
                return TapResourceSet::empty();
            }
        };

        if let Err(err) = self.host.start(aggregate, io_proc) {
            warn!(pid, error = %err, "device start failed, rolling back");
            let mut partial = TapResourceSet {
                tap,
                aggregate,
                io_proc: Some(io_proc),
                descriptor: Some(descriptor),
            };
            self.destroy(&mut partial);
            return TapResourceSet::empty();
        }

        info!(pid, tap = tap.0, aggregate = aggregate.0, "capture path running");
        TapResourceSet {
            tap,
            aggregate,
            io_proc: Some(io_proc),
            descriptor: Some(descriptor),
        }
    }

    /// Tear down every handle in the set, in order, synchronously.
    ///
    /// Idempotent: the set is cleared up front, so a second call sees an
    /// empty set and performs no host operations. Blocks while the IO proc
    /// is destroyed; never call this from the audio callback.
    pub fn destroy(&self, set: &mut TapResourceSet) {
        teardown(&self.host, set.take());
    }

    /// Tear down on a background thread.
    ///
    /// The caller's set is cleared immediately, so its record of the path
    /// is gone even while the native teardown is still in flight. `on_done`
    /// runs on the teardown thread after the last step.
    pub fn destroy_async(&self, set: &mut TapResourceSet, on_done: Option<Box<dyn FnOnce() + Send>>) {
        let snapshot = set.take();
        if !snapshot.is_active() {
            if let Some(done) = on_done {
                done();
            }
            return;
        }

        let host = Arc::clone(&self.host);
        let spawned = thread::Builder::new()
            .name("heron-teardown".into())
            .spawn(move || {
                teardown(&host, snapshot);
                if let Some(done) = on_done {
                    done();
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn teardown thread, handles leaked");
        }
    }
}

fn teardown(host: &Arc<dyn TapHost>, set: TapResourceSet) {
    if !set.is_active() {
        return;
    }
    debug!(tap = set.tap.0, aggregate = set.aggregate.0, "tearing down capture path");

    if let Some(io_proc) = set.io_proc {
        if set.aggregate.is_valid() {
            if let Err(err) = host.stop(set.aggregate, io_proc) {
                warn!(aggregate = set.aggregate.0, error = %err, "device stop failed, continuing teardown");
            }
            // Blocks until the HAL guarantees the callback cannot fire again.
            if let Err(err) = host.unregister_io_callback(set.aggregate, io_proc) {
                warn!(aggregate = set.aggregate.0, error = %err, "io proc destroy failed, continuing teardown");
            }
        }
    }

    if set.aggregate.is_valid() {
        if let Err(err) = host.destroy_aggregate_device(set.aggregate) {
            warn!(aggregate = set.aggregate.0, error = %err, "aggregate destroy failed, continuing teardown");
        }
    }

    if set.tap.is_valid() {
        if let Err(err) = host.destroy_process_tap(set.tap) {
            warn!(tap = set.tap.0, error = %err, "tap destroy failed");
        }
    }

    debug!("capture path teardown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFailures, MockOp, MockTapHost};

    fn noop_callback() -> IoCallback {
        Box::new(|_buffer, _rate| {})
    }

    #[test]
    fn test_acquire_then_destroy_in_order() {
        let host = MockTapHost::new();
        let manager = DeviceResourceManager::new(host.clone());

        let mut set = manager.acquire(42, &DeviceTarget::SystemDefault, "test path", noop_callback());
        assert!(set.is_active());
        assert!(set.io_proc.is_some());

        manager.destroy(&mut set);
        assert!(!set.is_active());
        assert!(set.io_proc.is_none());

        let tap = 1;
        let aggregate = 2;
        assert_eq!(
            host.ops(),
            vec![
                MockOp::CreateTap(42),
                MockOp::CreateAggregate("mock-tap-1".into()),
                MockOp::RegisterIoProc(aggregate),
                MockOp::Start(aggregate),
                MockOp::Stop(aggregate),
                MockOp::UnregisterIoProc {
                    device: aggregate,
                    io_proc: 1
                },
                MockOp::DestroyAggregate(aggregate),
                MockOp::DestroyTap(tap),
            ]
        );
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let host = MockTapHost::new();
        let manager = DeviceResourceManager::new(host.clone());

        let mut set = manager.acquire(7, &DeviceTarget::SystemDefault, "test path", noop_callback());
        manager.destroy(&mut set);
        let ops_after_first = host.ops().len();

        manager.destroy(&mut set);
        assert_eq!(host.ops().len(), ops_after_first, "second destroy must be a no-op");
    }

    #[test]
    fn test_teardown_continues_past_failures() {
        let host = MockTapHost::new();
        let manager = DeviceResourceManager::new(host.clone());

        let mut set = manager.acquire(7, &DeviceTarget::SystemDefault, "test path", noop_callback());
        host.set_failures(MockFailures {
            stop: true,
            unregister: true,
            destroy_aggregate: true,
            ..Default::default()
        });
        manager.destroy(&mut set);

        // Every step was still attempted, ending with the tap.
        let ops = host.ops();
        assert!(matches!(ops.last(), Some(MockOp::DestroyTap(_))));
        assert!(ops.iter().any(|op| matches!(op, MockOp::DestroyAggregate(_))));
    }

    #[test]
    fn test_acquire_failure_rolls_back_and_returns_inactive_set() {
        let host = MockTapHost::new();
        host.set_failures(MockFailures {
            create_aggregate: true,
            ..Default::default()
        });
        let manager = DeviceResourceManager::new(host.clone());

        let set = manager.acquire(9, &DeviceTarget::SystemDefault, "test path", noop_callback());
        assert!(!set.is_active());

        let ops = host.ops();
        assert!(ops.contains(&MockOp::DestroyTap(1)), "tap must be rolled back");
        assert!(!ops.iter().any(|op| matches!(op, MockOp::RegisterIoProc(_))));
    }

    #[test]
    fn test_register_failure_rolls_back_aggregate_and_tap() {
        let host = MockTapHost::new();
        host.set_failures(MockFailures {
            register: true,
            ..Default::default()
        });
        let manager = DeviceResourceManager::new(host.clone());

        let set = manager.acquire(9, &DeviceTarget::SystemDefault, "test path", noop_callback());
        assert!(!set.is_active());

        let ops = host.ops();
        assert!(ops.iter().any(|op| matches!(op, MockOp::DestroyAggregate(_))));
        assert!(ops.iter().any(|op| matches!(op, MockOp::DestroyTap(_))));
    }

    #[test]
    fn test_destroy_async_clears_record_immediately_and_signals() {
        let host = MockTapHost::new();
        let manager = DeviceResourceManager::new(host.clone());

        let mut set = manager.acquire(11, &DeviceTarget::SystemDefault, "test path", noop_callback());
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        manager.destroy_async(
            &mut set,
            Some(Box::new(move || {
                let _ = done_tx.send(());
            })),
        );

        // The caller's record is gone before the background teardown is
        // necessarily finished.
        assert!(!set.is_active());
        assert!(set.io_proc.is_none());

        done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("teardown completion signal");
        assert!(matches!(host.ops().last(), Some(MockOp::DestroyTap(_))));
    }

    #[test]
    fn test_destroy_async_on_empty_set_still_signals() {
        let host = MockTapHost::new();
        let manager = DeviceResourceManager::new(host.clone());

        let mut set = TapResourceSet::empty();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        manager.destroy_async(
            &mut set,
            Some(Box::new(move || {
                let _ = done_tx.send(());
            })),
        );
        done_rx
            .recv_timeout(std::time::Duration::from_secs(1))
            .expect("completion signal for empty set");
        assert!(host.ops().is_empty());
    }
}
