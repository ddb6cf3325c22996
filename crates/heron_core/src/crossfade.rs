//! Equal-Power Crossfade State Machine
//!
//! Coordinates the handoff between two live capture paths during a device
//! switch. The control thread drives phase transitions; the secondary
//! path's audio callback reports how many samples it has delivered. Every
//! field is an atomic with a single writer, so neither side ever blocks.
//!
//! Phase flow: Idle -> WarmingUp -> Crossfading -> Idle. Dependent fields
//! are always written before the phase store (Release) and read after the
//! phase load (Acquire).

use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use tracing::debug;

/// Samples the secondary path must deliver before it is trusted to carry
/// audio. Devices spin up with a few empty or partial buffers; fading in
/// before real signal flows would fade into silence.
pub const WARMUP_THRESHOLD_SAMPLES: u64 = 2048;

/// Default fade length in seconds
pub const DEFAULT_CROSSFADE_SECONDS: f64 = 0.5;

/// Where the handoff currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CrossfadePhase {
    /// No switch in flight
    Idle = 0,
    /// Secondary path exists but has not proven it delivers audio
    WarmingUp = 1,
    /// Both paths live, gains sweeping
    Crossfading = 2,
}

impl CrossfadePhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CrossfadePhase::WarmingUp,
            2 => CrossfadePhase::Crossfading,
            _ => CrossfadePhase::Idle,
        }
    }
}

/// Lock-free crossfade coordinator shared by the control thread and the
/// secondary path's audio callback.
pub struct CrossfadeStateMachine {
    /// Current phase; the control thread is the only writer
    phase: AtomicU8,
    /// Fade position in [0, 1] as f32 bits; the secondary callback is the
    /// only writer
    progress_bits: AtomicU32,
    /// Samples the fade spans, fixed when the fade is armed
    total_samples: AtomicU64,
    /// Samples counted toward fade progress (Crossfading only)
    crossfade_samples: AtomicU64,
    /// Samples the secondary path has delivered since the switch began
    warmup_samples: AtomicU64,
    /// Set once a fade ran to completion; Idle multipliers then favor the
    /// promoted (secondary) path
    promoted: AtomicBool,
    /// Fade length in seconds, fixed at construction
    duration_secs: f64,
}

impl Default for CrossfadeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossfadeStateMachine {
    pub fn new() -> Self {
        Self::with_duration(DEFAULT_CROSSFADE_SECONDS)
    }

    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            phase: AtomicU8::new(CrossfadePhase::Idle as u8),
            progress_bits: AtomicU32::new(0.0_f32.to_bits()),
            total_samples: AtomicU64::new(0),
            crossfade_samples: AtomicU64::new(0),
            warmup_samples: AtomicU64::new(0),
            promoted: AtomicBool::new(false),
            duration_secs,
        }
    }

    pub fn phase(&self) -> CrossfadePhase {
        CrossfadePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Fade position in [0, 1]. Zero in every phase except Crossfading
    /// (and the instant between reaching 1.0 and `complete`).
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::Acquire))
    }

    /// Arm a switch without knowing the device rate yet. Control thread only.
    pub fn begin_warmup(&self) {
        self.reset_fields();
        self.phase
            .store(CrossfadePhase::WarmingUp as u8, Ordering::Release);
        debug!("crossfade warming up");
    }

    /// Arm a switch and fix the fade span from the device's sample rate.
    /// Control thread only.
    pub fn begin_crossfade(&self, sample_rate: f64) {
        self.reset_fields();
        let total = (self.duration_secs * sample_rate).round() as u64;
        self.total_samples.store(total.max(1), Ordering::Release);
        self.phase
            .store(CrossfadePhase::WarmingUp as u8, Ordering::Release);
        debug!(total_samples = total, "crossfade armed");
    }

    /// Move from WarmingUp to Crossfading. Control thread only; a no-op
    /// from any other phase.
    pub fn begin_crossfading(&self) {
        let moved = self
            .phase
            .compare_exchange(
                CrossfadePhase::WarmingUp as u8,
                CrossfadePhase::Crossfading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            debug!("crossfade running");
        }
    }

    /// Report `samples` delivered by the secondary path. Called from the
    /// secondary audio callback only; wait-free.
    ///
    /// Warmup samples are always counted. Fade progress only advances
    /// while Crossfading, monotonically, saturating at 1.0.
    pub fn update_progress(&self, samples: u64) -> f32 {
        self.warmup_samples.fetch_add(samples, Ordering::AcqRel);

        if self.phase.load(Ordering::Acquire) != CrossfadePhase::Crossfading as u8 {
            return self.progress();
        }

        let counted = self.crossfade_samples.fetch_add(samples, Ordering::AcqRel) + samples;
        let total = self.total_samples.load(Ordering::Acquire);
        let progress = if total == 0 {
            0.0
        } else {
            (counted as f32 / total as f32).min(1.0)
        };
        self.progress_bits.store(progress.to_bits(), Ordering::Release);
        progress
    }

    /// Whether the secondary path has delivered enough samples to be
    /// trusted with audible output
    pub fn is_warmup_complete(&self) -> bool {
        self.warmup_samples.load(Ordering::Acquire) >= WARMUP_THRESHOLD_SAMPLES
    }

    pub fn is_crossfade_complete(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Finish the switch. Control thread only. If the fade ran to
    /// completion the secondary path stays at full gain from Idle on.
    pub fn complete(&self) {
        if self.is_crossfade_complete() {
            self.promoted.store(true, Ordering::Release);
        }
        self.progress_bits.store(0.0_f32.to_bits(), Ordering::Release);
        self.phase.store(CrossfadePhase::Idle as u8, Ordering::Release);
        debug!(promoted = self.promoted.load(Ordering::Acquire), "crossfade complete");
    }

    /// Cancel the switch from any phase. Control thread only. The primary
    /// path keeps full gain, the secondary is silenced.
    pub fn abort(&self) {
        self.reset_fields();
        self.phase.store(CrossfadePhase::Idle as u8, Ordering::Release);
        debug!("crossfade aborted");
    }

    /// Gain for the outgoing (primary) path
    pub fn primary_multiplier(&self) -> f32 {
        match self.phase() {
            CrossfadePhase::WarmingUp => 1.0,
            CrossfadePhase::Crossfading => (self.progress() * FRAC_PI_2).cos(),
            CrossfadePhase::Idle => {
                if self.promoted.load(Ordering::Acquire) {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }

    /// Gain for the incoming (secondary) path
    pub fn secondary_multiplier(&self) -> f32 {
        match self.phase() {
            CrossfadePhase::WarmingUp => 0.0,
            CrossfadePhase::Crossfading => (self.progress() * FRAC_PI_2).sin(),
            CrossfadePhase::Idle => {
                if self.promoted.load(Ordering::Acquire) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn reset_fields(&self) {
        self.progress_bits.store(0.0_f32.to_bits(), Ordering::Release);
        self.total_samples.store(0, Ordering::Release);
        self.crossfade_samples.store(0, Ordering::Release);
        self.warmup_samples.store(0, Ordering::Release);
        self.promoted.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle_favoring_primary() {
        let machine = CrossfadeStateMachine::new();
        assert_eq!(machine.phase(), CrossfadePhase::Idle);
        assert_eq!(machine.primary_multiplier(), 1.0);
        assert_eq!(machine.secondary_multiplier(), 0.0);
        assert_eq!(machine.progress(), 0.0);
    }

    #[test]
    fn test_warmup_threshold_crossing_is_exact() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        assert_eq!(machine.phase(), CrossfadePhase::WarmingUp);

        machine.update_progress(WARMUP_THRESHOLD_SAMPLES - 1);
        assert!(!machine.is_warmup_complete());
        machine.update_progress(1);
        assert!(machine.is_warmup_complete());
    }

    #[test]
    fn test_begin_warmup_arms_without_a_rate() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_warmup();
        assert_eq!(machine.phase(), CrossfadePhase::WarmingUp);

        // Warmup counting works before the fade span is known.
        machine.update_progress(WARMUP_THRESHOLD_SAMPLES);
        assert!(machine.is_warmup_complete());
        assert_eq!(machine.progress(), 0.0);

        // Fixing the span re-arms from scratch.
        machine.begin_crossfade(48000.0);
        assert!(!machine.is_warmup_complete());
    }

    #[test]
    fn test_warmup_holds_gains_and_progress() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.update_progress(4096);

        // Samples during warmup count toward the threshold but never move
        // the fade.
        assert_eq!(machine.progress(), 0.0);
        assert_eq!(machine.primary_multiplier(), 1.0);
        assert_eq!(machine.secondary_multiplier(), 0.0);
    }

    #[test]
    fn test_total_samples_follow_sample_rate() {
        let machine = CrossfadeStateMachine::with_duration(0.5);
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();

        // 0.5s at 48kHz spans 24000 samples; half of that is progress 0.5.
        let progress = machine.update_progress(12000);
        assert!((progress - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_progress_is_monotone_and_saturates() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();

        let mut last = 0.0;
        for _ in 0..100 {
            let progress = machine.update_progress(512);
            assert!(progress >= last, "progress went backwards");
            assert!(progress <= 1.0);
            last = progress;
        }

        // Way past the end it stays pinned at 1.0.
        machine.update_progress(1_000_000);
        assert_eq!(machine.progress(), 1.0);
        assert!(machine.is_crossfade_complete());
    }

    #[test]
    fn test_equal_power_invariant_over_sweep() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();

        for _ in 0..96 {
            machine.update_progress(250);
            let p = machine.primary_multiplier();
            let s = machine.secondary_multiplier();
            let power = p * p + s * s;
            assert!(
                (power - 1.0).abs() < 1e-5,
                "power not conserved at progress {}: {power}",
                machine.progress()
            );
        }
    }

    #[test]
    fn test_midpoint_gains_match() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();
        machine.update_progress(12000); // exactly half of 24000

        let expected = (0.5_f32 * FRAC_PI_2).sin(); // == cos at the midpoint
        assert!((machine.primary_multiplier() - expected).abs() < 1e-6);
        assert!((machine.secondary_multiplier() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_complete_promotes_secondary() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();
        machine.update_progress(24000);
        assert!(machine.is_crossfade_complete());

        machine.complete();
        assert_eq!(machine.phase(), CrossfadePhase::Idle);
        assert_eq!(machine.progress(), 0.0);
        assert_eq!(machine.primary_multiplier(), 0.0);
        assert_eq!(machine.secondary_multiplier(), 1.0);
    }

    #[test]
    fn test_abort_restores_primary() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();
        machine.update_progress(12000);

        machine.abort();
        assert_eq!(machine.phase(), CrossfadePhase::Idle);
        assert_eq!(machine.primary_multiplier(), 1.0);
        assert_eq!(machine.secondary_multiplier(), 0.0);
        assert_eq!(machine.progress(), 0.0);
    }

    #[test]
    fn test_illegal_transitions_are_no_ops() {
        let machine = CrossfadeStateMachine::new();

        // Idle -> Crossfading is not a legal edge.
        machine.begin_crossfading();
        assert_eq!(machine.phase(), CrossfadePhase::Idle);

        // Progress updates while Idle change nothing.
        machine.update_progress(50_000);
        assert_eq!(machine.progress(), 0.0);
        assert_eq!(machine.phase(), CrossfadePhase::Idle);
    }

    #[test]
    fn test_rearming_clears_previous_promotion() {
        let machine = CrossfadeStateMachine::new();
        machine.begin_crossfade(48000.0);
        machine.begin_crossfading();
        machine.update_progress(24000);
        machine.complete();
        assert_eq!(machine.secondary_multiplier(), 1.0);

        machine.begin_crossfade(48000.0);
        assert_eq!(machine.phase(), CrossfadePhase::WarmingUp);
        assert_eq!(machine.primary_multiplier(), 1.0);
        assert_eq!(machine.secondary_multiplier(), 0.0);
    }
}
