//! Device Switch Controller
//!
//! Owns the capture paths and drives glitch-free handoffs between output
//! devices. A switch brings up a secondary path on the new device while
//! the primary keeps playing, waits for the secondary to warm up, sweeps
//! both gains through an equal-power crossfade, then promotes the
//! secondary and retires the primary's native resources on a background
//! thread.
//!
//! The control thread calls [`DeviceSwitchController::poll`] periodically;
//! each path's audio callback runs [`RealtimePath::render`], which is
//! wait-free. Role changes reach the callbacks over SPSC rebind rings, the
//! same handoff idiom the EQ uses for coefficient snapshots.

use std::sync::Arc;
use std::time::Instant;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use heron_dsp::{eq_pair, EqHandle, EqProcessor, EqSettings};
use heron_platform::{DeviceResourceManager, DeviceTarget, TapResourceSet};

use crate::config::EngineConfig;
use crate::crossfade::{CrossfadePhase, CrossfadeStateMachine};
use crate::error::{EngineError, EngineResult};

const REBIND_QUEUE_CAPACITY: usize = 4;

/// Which side of a crossfade a path is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathRole {
    Primary,
    Secondary,
}

/// A path's current machine and role, shipped to its callback on change
struct PathBinding {
    machine: Arc<CrossfadeStateMachine>,
    role: PathRole,
}

/// The part of a capture path that moves into the IO callback.
/// Everything `render` does is wait-free.
struct RealtimePath {
    eq: EqProcessor,
    binding: Option<PathBinding>,
    rebinds: Consumer<PathBinding>,
}

impl RealtimePath {
    fn render(&mut self, buffer: &mut [f32]) {
        while let Ok(binding) = self.rebinds.pop() {
            self.binding = Some(binding);
        }

        self.eq.process_interleaved(buffer);

        let gain = match &self.binding {
            // Unbound paths play at unity; there is no switch in flight.
            None => 1.0,
            Some(binding) => match binding.role {
                PathRole::Primary => binding.machine.primary_multiplier(),
                PathRole::Secondary => {
                    let frames = (buffer.len() / 2) as u64;
                    binding.machine.update_progress(frames);
                    binding.machine.secondary_multiplier()
                }
            },
        };

        if gain != 1.0 {
            for sample in buffer.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

/// Control-side record of one live capture path
struct ControlPath {
    set: TapResourceSet,
    eq: EqHandle,
    rebinds: Producer<PathBinding>,
    pid: u32,
    target: DeviceTarget,
}

struct PendingSwitch {
    path: ControlPath,
    machine: Arc<CrossfadeStateMachine>,
    started: Instant,
}

/// Why an in-flight switch was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The secondary path never delivered enough samples in time
    WarmupTimeout,
    /// A newer switch replaced it
    Superseded,
}

/// How a switch request started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStart {
    /// Nothing was playing; capture started directly on the target
    Immediate,
    /// A crossfade from the current device is in flight
    Crossfading,
}

/// A state change observed by `poll`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Completed { pid: u32 },
    Aborted { reason: AbortReason },
}

/// Orchestrates capture paths and device handoffs on the control thread
pub struct DeviceSwitchController {
    resources: DeviceResourceManager,
    config: EngineConfig,
    eq_settings: EqSettings,
    active: Option<ControlPath>,
    pending: Option<PendingSwitch>,
}

impl DeviceSwitchController {
    pub fn new(resources: DeviceResourceManager, config: EngineConfig) -> Self {
        Self {
            resources,
            config,
            eq_settings: EqSettings::default(),
            active: None,
            pending: None,
        }
    }

    pub fn is_switching(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some() || self.pending.is_some()
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.active.as_ref().map(|path| path.pid)
    }

    pub fn active_target(&self) -> Option<&DeviceTarget> {
        self.active.as_ref().map(|path| &path.target)
    }

    pub fn eq_settings(&self) -> &EqSettings {
        &self.eq_settings
    }

    /// Start capturing `pid` on `target`.
    ///
    /// With no active path this brings capture up directly. Otherwise it
    /// arms a crossfade: the new path starts warming up while the current
    /// one keeps playing at full gain. Any switch already in flight is
    /// aborted first; there is no resume.
    pub fn switch_to(&mut self, pid: u32, target: DeviceTarget) -> EngineResult<SwitchStart> {
        if self.abort_pending(AbortReason::Superseded).is_some() {
            debug!("superseded in-flight switch");
        }

        let crossfading = self.active.is_some();
        let machine = Arc::new(CrossfadeStateMachine::with_duration(
            self.config.crossfade.duration_secs,
        ));

        let (eq, processor) = eq_pair(self.config.sample_rate as f32, self.eq_settings)?;
        let (rebind_tx, rebind_rx) = RingBuffer::new(REBIND_QUEUE_CAPACITY);
        let binding = crossfading.then(|| PathBinding {
            machine: Arc::clone(&machine),
            role: PathRole::Secondary,
        });
        let mut realtime = RealtimePath {
            eq: processor,
            binding,
            rebinds: rebind_rx,
        };

        if crossfading {
            // The machine must be WarmingUp before the first callback can
            // fire, so the secondary starts muted.
            machine.begin_crossfade(self.config.sample_rate);
        }

        let name = format!("Heron Tap (pid {pid})");
        let set = self.resources.acquire(
            pid,
            &target,
            &name,
            Box::new(move |buffer: &mut [f32], _sample_rate: f64| realtime.render(buffer)),
        );
        if !set.is_active() {
            machine.abort();
            return Err(EngineError::SwitchFailed(format!(
                "could not bring up capture path for pid {pid}"
            )));
        }

        let path = ControlPath {
            set,
            eq,
            rebinds: rebind_tx,
            pid,
            target,
        };

        if crossfading {
            if let Some(active) = self.active.as_mut() {
                let rebound = active.rebinds.push(PathBinding {
                    machine: Arc::clone(&machine),
                    role: PathRole::Primary,
                });
                if rebound.is_err() {
                    warn!("primary rebind queue full, outgoing path keeps unity gain");
                }
            }
            self.pending = Some(PendingSwitch {
                path,
                machine,
                started: Instant::now(),
            });
            info!(pid, "device switch started");
            Ok(SwitchStart::Crossfading)
        } else {
            self.active = Some(path);
            info!(pid, "capture started");
            Ok(SwitchStart::Immediate)
        }
    }

    /// Drive any in-flight switch forward. Call periodically from the
    /// control loop.
    pub fn poll(&mut self) -> Option<SwitchOutcome> {
        // Free retired EQ snapshots while we are here.
        if let Some(active) = self.active.as_mut() {
            active.eq.reclaim();
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.path.eq.reclaim();
        }

        let (machine, stalled) = {
            let pending = self.pending.as_ref()?;
            (
                Arc::clone(&pending.machine),
                pending.started.elapsed() >= self.config.crossfade.warmup_timeout(),
            )
        };

        match machine.phase() {
            CrossfadePhase::WarmingUp => {
                if machine.is_warmup_complete() {
                    machine.begin_crossfading();
                    debug!("secondary path warmed up, crossfade running");
                    None
                } else if stalled {
                    warn!("secondary path stalled during warmup, keeping current device");
                    self.abort_pending(AbortReason::WarmupTimeout)
                } else {
                    None
                }
            }
            CrossfadePhase::Crossfading => {
                if machine.is_crossfade_complete() {
                    self.promote()
                } else {
                    None
                }
            }
            CrossfadePhase::Idle => None,
        }
    }

    /// Replace the EQ settings on every live path
    pub fn update_eq(&mut self, settings: EqSettings) -> EngineResult<()> {
        let settings = settings.clamped();
        self.eq_settings = settings;
        if let Some(active) = self.active.as_mut() {
            active.eq.update_settings(settings)?;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.path.eq.update_settings(settings)?;
        }
        Ok(())
    }

    /// Rebuild every path's EQ at a new sample rate
    pub fn update_sample_rate(&mut self, sample_rate: f64) -> EngineResult<()> {
        self.config.sample_rate = sample_rate;
        if let Some(active) = self.active.as_mut() {
            active.eq.update_sample_rate(sample_rate as f32)?;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.path.eq.update_sample_rate(sample_rate as f32)?;
        }
        Ok(())
    }

    /// Tear down every path synchronously. Used on engine shutdown.
    pub fn shutdown(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.machine.abort();
            self.resources.destroy(&mut pending.path.set);
        }
        if let Some(mut active) = self.active.take() {
            self.resources.destroy(&mut active.set);
        }
    }

    fn promote(&mut self) -> Option<SwitchOutcome> {
        let pending = self.pending.take()?;
        pending.machine.complete();

        if let Some(mut old) = self.active.take() {
            debug!(pid = old.pid, "retiring outgoing capture path");
            self.resources.destroy_async(&mut old.set, None);
        }

        let path = pending.path;
        let pid = path.pid;
        self.active = Some(path);
        info!(pid, "device switch complete");
        Some(SwitchOutcome::Completed { pid })
    }

    fn abort_pending(&mut self, reason: AbortReason) -> Option<SwitchOutcome> {
        let mut pending = self.pending.take()?;
        // Idle without promotion silences the secondary and restores the
        // primary to unity before its resources go away.
        pending.machine.abort();
        self.resources.destroy_async(&mut pending.path.set, None);
        info!(?reason, "device switch aborted");
        Some(SwitchOutcome::Aborted { reason })
    }
}

impl Drop for DeviceSwitchController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
