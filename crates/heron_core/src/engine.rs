//! Audio Engine
//!
//! The engine owns a dedicated control thread that services commands,
//! drives device switches forward, and reports events back. Audio itself
//! never touches this thread; it runs in the host's IO callbacks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use heron_dsp::{preset_settings, CompressorParams};
use heron_platform::{DeviceResourceManager, TapHost};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, EngineState, Event};
use crate::switch::{AbortReason, DeviceSwitchController, SwitchOutcome, SwitchStart};

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// How often the control loop wakes to drive in-flight switches
const CONTROL_TICK: Duration = Duration::from_millis(16);

/// Handle to a running audio engine.
///
/// Dropping the handle shuts the control thread down and tears down any
/// live capture paths.
pub struct Engine {
    commands: Sender<Command>,
    events: Receiver<Event>,
    control_thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Validate `config` and spin up the control thread on `host`.
    pub fn new(host: Arc<dyn TapHost>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let (command_tx, command_rx) = bounded(COMMAND_QUEUE_CAPACITY);
        let (event_tx, event_rx) = unbounded();

        let control_thread = thread::Builder::new()
            .name("heron-control".into())
            .spawn(move || {
                let resources = DeviceResourceManager::new(host);
                let controller = DeviceSwitchController::new(resources, config);
                control_loop(controller, command_rx, event_tx);
            })
            .map_err(|e| EngineError::ThreadSpawnFailed(e.to_string()))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            control_thread: Some(control_thread),
        })
    }

    /// Queue a command for the control thread
    pub fn send(&self, command: Command) -> EngineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Event stream from the control thread
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Non-blocking event poll
    pub fn try_event(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.control_thread.take() {
            if handle.join().is_err() {
                warn!("engine control thread panicked");
            }
        }
    }
}

fn control_loop(
    mut controller: DeviceSwitchController,
    commands: Receiver<Command>,
    events: Sender<Event>,
) {
    info!("engine control thread started");
    let mut compressor = CompressorParams::default();

    loop {
        match commands.recv_timeout(CONTROL_TICK) {
            Ok(Command::Shutdown) => break,
            Ok(command) => handle_command(&mut controller, &mut compressor, command, &events),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(outcome) = controller.poll() {
            let _ = events.send(outcome_event(outcome));
        }
    }

    controller.shutdown();
    info!("engine control thread stopped");
}

fn handle_command(
    controller: &mut DeviceSwitchController,
    compressor: &mut CompressorParams,
    command: Command,
    events: &Sender<Event>,
) {
    debug!(?command, "handling command");
    let result = match command {
        Command::SetEqEnabled(enabled) => {
            let mut settings = *controller.eq_settings();
            settings.enabled = enabled;
            controller.update_eq(settings)
        }
        Command::SetBandGain { band, gain_db } => {
            let mut settings = *controller.eq_settings();
            settings
                .set_band_gain(band, gain_db)
                .map_err(EngineError::from)
                .and_then(|_| controller.update_eq(settings))
        }
        // The handle clamps gains before designing each snapshot.
        Command::SetEqSettings(settings) => controller.update_eq(settings),
        Command::ApplyPreset(name) => match preset_settings(&name) {
            Some(mut settings) => {
                settings.enabled = controller.eq_settings().enabled;
                controller.update_eq(settings)
            }
            None => Err(EngineError::UnknownPreset(name)),
        },
        Command::SetCompressor(params) => match params.validate() {
            Ok(()) => {
                *compressor = params;
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::SwitchDevice { pid, target } => match controller.switch_to(pid, target) {
            Ok(SwitchStart::Crossfading) => {
                let _ = events.send(Event::SwitchStarted { pid });
                Ok(())
            }
            Ok(SwitchStart::Immediate) => {
                let _ = events.send(Event::SwitchStarted { pid });
                let _ = events.send(Event::SwitchCompleted { pid });
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::GetState => {
            let _ = events.send(Event::State(EngineState {
                eq: *controller.eq_settings(),
                compressor: *compressor,
                capturing: controller.is_capturing(),
                switching: controller.is_switching(),
                target: controller.active_target().cloned(),
                pid: controller.active_pid(),
            }));
            Ok(())
        }
        Command::Shutdown => Ok(()),
    };

    if let Err(e) = result {
        warn!(error = %e, "command failed");
        let _ = events.send(Event::Error(e.to_string()));
    }
}

fn outcome_event(outcome: SwitchOutcome) -> Event {
    match outcome {
        SwitchOutcome::Completed { pid } => Event::SwitchCompleted { pid },
        SwitchOutcome::Aborted { reason } => Event::SwitchAborted {
            reason: match reason {
                AbortReason::WarmupTimeout => "secondary path warmup timed out".into(),
                AbortReason::Superseded => "superseded by a newer switch".into(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_platform::{DeviceTarget, MockTapHost};
    use std::time::Instant;

    fn recv_event(engine: &Engine) -> Event {
        engine
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("expected an event")
    }

    #[test]
    fn test_first_switch_reports_started_and_completed() {
        let host = MockTapHost::new();
        let engine = Engine::new(host, EngineConfig::default()).unwrap();

        engine
            .send(Command::SwitchDevice {
                pid: 100,
                target: DeviceTarget::SystemDefault,
            })
            .unwrap();

        assert!(matches!(recv_event(&engine), Event::SwitchStarted { pid: 100 }));
        assert!(matches!(recv_event(&engine), Event::SwitchCompleted { pid: 100 }));
    }

    #[test]
    fn test_undriven_second_switch_times_out_and_aborts() {
        let host = MockTapHost::new();
        let mut config = EngineConfig::default();
        config.crossfade.warmup_timeout_ms = 100;
        let engine = Engine::new(host, config).unwrap();

        engine
            .send(Command::SwitchDevice {
                pid: 100,
                target: DeviceTarget::SystemDefault,
            })
            .unwrap();
        engine
            .send(Command::SwitchDevice {
                pid: 100,
                target: DeviceTarget::Uid("silent".into()),
            })
            .unwrap();

        // Nothing drives the mock IO callbacks, so the second switch can
        // never warm up.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match recv_event(&engine) {
                Event::SwitchAborted { reason } => {
                    assert!(reason.contains("timed out"));
                    break;
                }
                _ => assert!(Instant::now() < deadline, "no abort before deadline"),
            }
        }
    }

    #[test]
    fn test_get_state_reflects_capture() {
        let host = MockTapHost::new();
        let engine = Engine::new(host, EngineConfig::default()).unwrap();

        engine
            .send(Command::SwitchDevice {
                pid: 42,
                target: DeviceTarget::SystemDefault,
            })
            .unwrap();
        engine.send(Command::GetState).unwrap();

        let state = loop {
            if let Event::State(state) = recv_event(&engine) {
                break state;
            }
        };
        assert!(state.capturing);
        assert!(!state.switching);
        assert_eq!(state.pid, Some(42));
        assert_eq!(state.target, Some(DeviceTarget::SystemDefault));
    }

    #[test]
    fn test_unknown_preset_reports_error() {
        let host = MockTapHost::new();
        let engine = Engine::new(host, EngineConfig::default()).unwrap();

        engine
            .send(Command::ApplyPreset("Mega Bass".into()))
            .unwrap();
        match recv_event(&engine) {
            Event::Error(message) => assert!(message.contains("Mega Bass")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let host = MockTapHost::new();
        let mut config = EngineConfig::default();
        config.sample_rate = 1.0;
        assert!(matches!(
            Engine::new(host, config),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_set_eq_settings_clamps_into_state() {
        let host = MockTapHost::new();
        let engine = Engine::new(host, EngineConfig::default()).unwrap();

        let mut settings = heron_dsp::EqSettings::flat();
        settings.band_gains[0] = 40.0;
        settings.band_gains[1] = -40.0;
        engine.send(Command::SetEqSettings(settings)).unwrap();
        engine.send(Command::GetState).unwrap();

        let state = loop {
            if let Event::State(state) = recv_event(&engine) {
                break state;
            }
        };
        assert_eq!(state.eq.band_gains[0], heron_dsp::MAX_BAND_GAIN_DB);
        assert_eq!(state.eq.band_gains[1], -heron_dsp::MAX_BAND_GAIN_DB);
    }

    #[test]
    fn test_preset_applies_band_gains() {
        let host = MockTapHost::new();
        let engine = Engine::new(host, EngineConfig::default()).unwrap();

        engine.send(Command::ApplyPreset("Bass Boost".into())).unwrap();
        engine.send(Command::GetState).unwrap();

        let state = loop {
            if let Event::State(state) = recv_event(&engine) {
                break state;
            }
        };
        assert!(state.eq.band_gains[0] > 0.0);
    }
}
