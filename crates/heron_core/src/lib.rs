//! Heron Audio Engine
//!
//! Ties the DSP chain and the platform capture layer together: a control
//! thread accepts [`Command`]s, orchestrates per-process capture paths,
//! and performs equal-power crossfades when the output device changes.
//!
//! ```no_run
//! use heron_core::{Command, Engine, EngineConfig};
//! use heron_platform::{DeviceTarget, MockTapHost};
//!
//! # fn main() -> Result<(), heron_core::EngineError> {
//! // In production the host is `CoreAudioTapHost`; the mock works anywhere.
//! let engine = Engine::new(MockTapHost::new(), EngineConfig::default())?;
//! engine.send(Command::SwitchDevice {
//!     pid: 1234,
//!     target: DeviceTarget::SystemDefault,
//! })?;
//! # Ok(())
//! # }
//! ```

mod config;
mod crossfade;
mod engine;
mod error;
mod message;
mod switch;

pub use config::{CrossfadeConfig, EngineConfig};
pub use crossfade::{
    CrossfadePhase, CrossfadeStateMachine, DEFAULT_CROSSFADE_SECONDS, WARMUP_THRESHOLD_SAMPLES,
};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use message::{Command, EngineState, Event};
pub use switch::{AbortReason, DeviceSwitchController, SwitchOutcome, SwitchStart};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());

        let machine = CrossfadeStateMachine::new();
        assert_eq!(machine.phase(), CrossfadePhase::Idle);
        assert_eq!(WARMUP_THRESHOLD_SAMPLES, 2048);
    }
}
