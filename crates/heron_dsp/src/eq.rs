//! 10-Band Graphic Equalizer
//!
//! The equalizer is split across two threads:
//!
//! - [`EqHandle`] lives on the control thread. It owns the current
//!   [`EqSettings`], designs immutable coefficient snapshots, and ships them
//!   to the processor over a wait-free SPSC ring.
//! - [`EqProcessor`] lives on the real-time audio thread. It installs
//!   pending snapshots at buffer boundaries, keeping per-channel delay-line
//!   state across coefficient swaps, and runs the cascade in place.
//!
//! Retired snapshots travel back to the handle on a second ring, so snapshot
//! memory is always freed on the control thread. The audio thread never
//! allocates, frees, or blocks.

use std::sync::Arc;

use biquad::{Biquad, DirectForm2Transposed};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DspError, DspResult};
use crate::filter::{design_all_bands, preamp_attenuation, FilterCoefficients, EQ_BANDS};

/// Number of EQ bands
pub const NUM_BANDS: usize = EQ_BANDS.len();

/// Per-band gain limit in dB; settings outside this range are clamped
pub const MAX_BAND_GAIN_DB: f32 = 12.0;

/// Snapshot ring depth. Updates beyond this without an intervening audio
/// callback are rejected rather than blocked on.
const SNAPSHOT_QUEUE_CAPACITY: usize = 8;

/// User-facing equalizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqSettings {
    /// Master bypass; disabled means bit-exact passthrough
    pub enabled: bool,

    /// Band gains in dB, low to high frequency
    pub band_gains: [f32; NUM_BANDS],
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            band_gains: [0.0; NUM_BANDS],
        }
    }
}

impl EqSettings {
    /// All bands at 0 dB
    pub fn flat() -> Self {
        Self::default()
    }

    /// Set one band's gain, clamped to the ±[`MAX_BAND_GAIN_DB`] range
    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) -> DspResult<()> {
        if band >= NUM_BANDS {
            return Err(DspError::InvalidBandIndex(band));
        }
        self.band_gains[band] = gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
        Ok(())
    }

    /// Copy with every band gain clamped into the legal range
    pub fn clamped(mut self) -> Self {
        for gain in &mut self.band_gains {
            *gain = gain.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
        }
        self
    }
}

/// Immutable coefficient set built on the control thread.
///
/// Snapshots are shared via `Arc` and never mutated after construction, so
/// the audio thread can read them without synchronization beyond the ring.
#[derive(Debug)]
pub struct EqSnapshot {
    enabled: bool,
    preamp: f32,
    coefficients: [FilterCoefficients; NUM_BANDS],
    sample_rate: f32,
    /// Delay lines must be cleared when this snapshot installs
    /// (set on sample-rate changes, where stale state is meaningless)
    reset_state: bool,
}

impl EqSnapshot {
    fn build(settings: &EqSettings, sample_rate: f32, reset_state: bool) -> Self {
        Self {
            enabled: settings.enabled,
            preamp: preamp_attenuation(&settings.band_gains),
            coefficients: design_all_bands(&settings.band_gains, sample_rate),
            sample_rate,
            reset_state,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn preamp(&self) -> f32 {
        self.preamp
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

/// Create a connected handle/processor pair.
///
/// The processor starts with a snapshot built from `settings`, so it is
/// ready to run before the first update arrives.
pub fn eq_pair(sample_rate: f32, settings: EqSettings) -> DspResult<(EqHandle, EqProcessor)> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }

    let settings = settings.clamped();
    let (snapshot_tx, snapshot_rx) = RingBuffer::new(SNAPSHOT_QUEUE_CAPACITY);
    // One extra slot: every queued snapshot plus the installed one can be
    // in flight back to the handle at once.
    let (retire_tx, retire_rx) = RingBuffer::new(SNAPSHOT_QUEUE_CAPACITY + 1);

    let initial = Arc::new(EqSnapshot::build(&settings, sample_rate, false));
    let processor = EqProcessor::new(initial, snapshot_rx, retire_tx);
    let handle = EqHandle {
        settings,
        sample_rate,
        snapshots: snapshot_tx,
        retired: retire_rx,
    };
    Ok((handle, processor))
}

/// Control-thread side of the equalizer
pub struct EqHandle {
    settings: EqSettings,
    sample_rate: f32,
    snapshots: Producer<Arc<EqSnapshot>>,
    retired: Consumer<Arc<EqSnapshot>>,
}

impl EqHandle {
    pub fn settings(&self) -> &EqSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Replace the full settings; gains are clamped before design.
    pub fn update_settings(&mut self, settings: EqSettings) -> DspResult<()> {
        let settings = settings.clamped();
        self.push(EqSnapshot::build(&settings, self.sample_rate, false))?;
        self.settings = settings;
        debug!(enabled = settings.enabled, "eq settings updated");
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) -> DspResult<()> {
        let mut settings = self.settings;
        settings.enabled = enabled;
        self.update_settings(settings)
    }

    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) -> DspResult<()> {
        let mut settings = self.settings;
        settings.set_band_gain(band, gain_db)?;
        self.update_settings(settings)
    }

    /// Rebuild every band at a new sample rate.
    ///
    /// The snapshot carries a reset flag so the processor clears its delay
    /// lines at the same buffer boundary the new coefficients install.
    pub fn update_sample_rate(&mut self, sample_rate: f32) -> DspResult<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        self.push(EqSnapshot::build(&self.settings, sample_rate, true))?;
        self.sample_rate = sample_rate;
        debug!(sample_rate, "eq rebuilt for new sample rate");
        Ok(())
    }

    /// Drop snapshots the processor has finished with.
    ///
    /// Called internally before every push; control loops may also call it
    /// periodically. Returns how many snapshots were freed.
    pub fn reclaim(&mut self) -> usize {
        let mut freed = 0;
        while self.retired.pop().is_ok() {
            freed += 1;
        }
        freed
    }

    fn push(&mut self, snapshot: EqSnapshot) -> DspResult<()> {
        self.reclaim();
        self.snapshots
            .push(Arc::new(snapshot))
            .map_err(|_| DspError::UpdateQueueFull)
    }
}

/// Real-time side of the equalizer. All methods are wait-free.
pub struct EqProcessor {
    filters_left: [DirectForm2Transposed<f32>; NUM_BANDS],
    filters_right: [DirectForm2Transposed<f32>; NUM_BANDS],
    current: Arc<EqSnapshot>,
    snapshots: Consumer<Arc<EqSnapshot>>,
    retired: Producer<Arc<EqSnapshot>>,
}

impl EqProcessor {
    fn new(
        initial: Arc<EqSnapshot>,
        snapshots: Consumer<Arc<EqSnapshot>>,
        retired: Producer<Arc<EqSnapshot>>,
    ) -> Self {
        let filters_left = initial
            .coefficients
            .map(|c| DirectForm2Transposed::<f32>::new(c.to_biquad()));
        let filters_right = initial
            .coefficients
            .map(|c| DirectForm2Transposed::<f32>::new(c.to_biquad()));
        Self {
            filters_left,
            filters_right,
            current: initial,
            snapshots,
            retired,
        }
    }

    /// Install pending snapshots; the freshest one wins.
    ///
    /// `update_coefficients` keeps the delay lines, so a parameter tweak
    /// mid-stream does not click. Snapshots flagged `reset_state` clear
    /// them instead.
    fn drain_updates(&mut self) {
        let mut installed = false;
        let mut reset = false;
        while let Ok(snapshot) = self.snapshots.pop() {
            reset |= snapshot.reset_state;
            let old = std::mem::replace(&mut self.current, snapshot);
            // Ring capacity covers every snapshot that can be in flight,
            // so this push cannot fail while the pair is wired up.
            let _ = self.retired.push(old);
            installed = true;
        }
        if installed {
            for (band, coefficients) in self.current.coefficients.iter().enumerate() {
                self.filters_left[band].update_coefficients(coefficients.to_biquad());
                self.filters_right[band].update_coefficients(coefficients.to_biquad());
            }
            if reset {
                self.reset();
            }
        }
    }

    /// Process an interleaved stereo buffer in place.
    ///
    /// When the EQ is disabled the buffer is left untouched, bit for bit.
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        self.drain_updates();
        if !self.current.enabled {
            return;
        }

        let preamp = self.current.preamp;
        for frame in buffer.chunks_exact_mut(2) {
            let mut left = frame[0] * preamp;
            let mut right = frame[1] * preamp;
            for band in 0..NUM_BANDS {
                left = self.filters_left[band].run(left);
                right = self.filters_right[band].run(right);
            }
            frame[0] = left;
            frame[1] = right;
        }
    }

    /// Process split input/output buffers (copies verbatim when bypassed).
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        self.process_interleaved(&mut output[..len]);
    }

    /// Clear all delay-line state, both channels, every band.
    pub fn reset(&mut self) {
        for filter in self
            .filters_left
            .iter_mut()
            .chain(self.filters_right.iter_mut())
        {
            filter.reset_state();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.current.enabled
    }

    pub fn sample_rate(&self) -> f32 {
        self.current.sample_rate
    }
}
