//! Heron DSP - Digital Signal Processing Module
//!
//! This crate provides the audio processing pipeline for Heron, including:
//! - 10-band graphic equalizer using BiQuad peaking filters
//! - Snapshot-based coefficient handoff for real-time safety
//! - Automatic preamp headroom for boosted bands
//! - Compressor parameter surface
//!
//! # Architecture
//!
//! The DSP path follows a strict "no allocation, no locks in the audio
//! callback" rule. Coefficients are designed on the control thread and
//! swapped in atomically between buffers; retired coefficient sets are
//! freed back on the control thread.

mod compressor;
mod eq;
mod error;
mod filter;
mod presets;

pub use compressor::CompressorParams;
pub use eq::{eq_pair, EqHandle, EqProcessor, EqSettings, EqSnapshot, MAX_BAND_GAIN_DB, NUM_BANDS};
pub use error::{DspError, DspResult};
pub use filter::{
    design_all_bands, design_peaking, preamp_attenuation, FilterCoefficients, EQ_BANDS,
    GRAPHIC_EQ_Q,
};
pub use presets::{find_preset, preset_settings, Preset, PRESETS};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let _params = CompressorParams::default();
        let _pair = eq_pair(48000.0, EqSettings::flat()).unwrap();
        assert_eq!(EQ_BANDS.len(), NUM_BANDS);
    }
}
