//! Engine Control Messages
//!
//! Commands flow from the owning application into the control thread,
//! events flow back out. Both are plain data so a UI layer can serialize
//! them across whatever boundary it lives behind.

use serde::{Deserialize, Serialize};

use heron_dsp::{CompressorParams, EqSettings};
use heron_platform::DeviceTarget;

/// Requests handled by the engine control thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Enable or bypass the EQ on every live path
    SetEqEnabled(bool),

    /// Set one band's gain in dB
    SetBandGain { band: usize, gain_db: f32 },

    /// Replace the full EQ settings
    SetEqSettings(EqSettings),

    /// Apply a named preset's band gains
    ApplyPreset(String),

    /// Update compressor parameters
    SetCompressor(CompressorParams),

    /// Capture `pid` on `target`, crossfading from the current device if
    /// one is already playing
    SwitchDevice { pid: u32, target: DeviceTarget },

    /// Ask for an [`Event::State`] snapshot
    GetState,

    /// Stop capture and exit the control thread
    Shutdown,
}

/// Notifications emitted by the engine control thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A device switch started crossfading
    SwitchStarted { pid: u32 },

    /// A device switch finished and the new path is live
    SwitchCompleted { pid: u32 },

    /// An in-flight device switch was abandoned
    SwitchAborted { reason: String },

    /// Snapshot answering [`Command::GetState`]
    State(EngineState),

    /// A command failed
    Error(String),
}

/// Point-in-time view of the engine for UIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub eq: EqSettings,
    pub compressor: CompressorParams,
    pub capturing: bool,
    pub switching: bool,
    pub target: Option<DeviceTarget>,
    pub pid: Option<u32>,
}
