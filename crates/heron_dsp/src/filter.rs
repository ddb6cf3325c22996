//! Peaking EQ Filter Design
//!
//! Coefficient design for the 10-band graphic equalizer, following the
//! RBJ Audio EQ Cookbook peaking filter. All functions here are pure and
//! allocation-free, so they can run on any thread; the results are handed
//! to the audio thread as immutable snapshots (see [`crate::eq`]).

use std::f32::consts::PI;

use biquad::Coefficients;

/// Center frequencies for the 10-band graphic EQ in Hz
pub const EQ_BANDS: [f32; 10] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Bandwidth shared by every graphic EQ band
pub const GRAPHIC_EQ_Q: f32 = 1.4;

/// One biquad section, normalized so the leading feedback coefficient is 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl FilterCoefficients {
    /// Unity passthrough section
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Convert into the runtime representation used by the filter sections
    pub fn to_biquad(self) -> Coefficients<f32> {
        Coefficients {
            a1: self.a1,
            a2: self.a2,
            b0: self.b0,
            b1: self.b1,
            b2: self.b2,
        }
    }
}

/// Design a single peaking EQ section.
///
/// Bands at or above Nyquist come back as [`FilterCoefficients::IDENTITY`]:
/// the cookbook math is unstable there, and a band the sample rate cannot
/// represent should pass audio through untouched.
pub fn design_peaking(frequency: f32, gain_db: f32, q: f32, sample_rate: f32) -> FilterCoefficients {
    if frequency >= sample_rate / 2.0 {
        return FilterCoefficients::IDENTITY;
    }

    let a = 10.0_f32.powf(gain_db / 40.0);
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = omega.cos();
    let alpha = omega.sin() / (2.0 * q);

    let b0 = 1.0 + alpha * a;
    let b1 = -2.0 * cos_omega;
    let b2 = 1.0 - alpha * a;
    let a0 = 1.0 + alpha / a;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha / a;

    FilterCoefficients {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// Design all ten bands at the given sample rate, low to high frequency.
pub fn design_all_bands(gains: &[f32; 10], sample_rate: f32) -> [FilterCoefficients; 10] {
    let mut sections = [FilterCoefficients::IDENTITY; 10];
    for (section, (frequency, gain_db)) in sections.iter_mut().zip(EQ_BANDS.iter().zip(gains)) {
        *section = design_peaking(*frequency, *gain_db, GRAPHIC_EQ_Q, sample_rate);
    }
    sections
}

/// Headroom scaler applied ahead of the cascade.
///
/// Exactly 1.0 when no band is boosted, otherwise `10^(-max_boost/20)` so
/// the loudest band cannot clip full-scale input.
pub fn preamp_attenuation(gains: &[f32; 10]) -> f32 {
    let max_boost = gains.iter().copied().fold(0.0_f32, f32::max);
    if max_boost > 0.0 {
        10.0_f32.powf(-max_boost / 20.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Recompute the cookbook formula independently (in f64) and compare.
    fn reference_peaking(frequency: f64, gain_db: f64, q: f64, sample_rate: f64) -> [f64; 5] {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * std::f64::consts::PI * frequency / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha / a;
        [
            (1.0 + alpha * a) / a0,
            (-2.0 * omega.cos()) / a0,
            (1.0 - alpha * a) / a0,
            (-2.0 * omega.cos()) / a0,
            (1.0 - alpha / a) / a0,
        ]
    }

    #[test]
    fn test_matches_cookbook_formula() {
        let got = design_peaking(1000.0, 6.0, 1.4, 48000.0);
        let want = reference_peaking(1000.0, 6.0, 1.4, 48000.0);

        assert!((got.b0 as f64 - want[0]).abs() < 1e-5);
        assert!((got.b1 as f64 - want[1]).abs() < 1e-5);
        assert!((got.b2 as f64 - want[2]).abs() < 1e-5);
        assert!((got.a1 as f64 - want[3]).abs() < 1e-5);
        assert!((got.a2 as f64 - want[4]).abs() < 1e-5);
    }

    #[test]
    fn test_coefficients_finite_across_parameter_grid() {
        let rates = [8000.0, 22050.0, 44100.0, 48000.0, 96000.0, 192000.0];
        let gains = [-12.0, -6.0, -0.1, 0.0, 0.1, 6.0, 12.0];

        for &rate in &rates {
            for &gain in &gains {
                for &freq in &EQ_BANDS {
                    let c = design_peaking(freq, gain, GRAPHIC_EQ_Q, rate);
                    for v in [c.b0, c.b1, c.b2, c.a1, c.a2] {
                        assert!(v.is_finite(), "{freq}Hz {gain}dB @{rate}Hz produced {v}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_nyquist_band_is_identity() {
        // At 24kHz, Nyquist is 12kHz: the 16kHz band must bypass.
        let c = design_peaking(16000.0, 6.0, GRAPHIC_EQ_Q, 24000.0);
        assert!(c.is_identity());

        // Exactly at Nyquist also bypasses.
        let c = design_peaking(12000.0, 6.0, GRAPHIC_EQ_Q, 24000.0);
        assert!(c.is_identity());

        // Just below Nyquist does not.
        let c = design_peaking(11999.0, 6.0, GRAPHIC_EQ_Q, 24000.0);
        assert!(!c.is_identity());
    }

    #[test]
    fn test_all_bands_preserve_order() {
        let mut gains = [0.0_f32; 10];
        gains[3] = 4.5;
        let sections = design_all_bands(&gains, 48000.0);

        for (i, section) in sections.iter().enumerate() {
            let expected = design_peaking(EQ_BANDS[i], gains[i], GRAPHIC_EQ_Q, 48000.0);
            assert_eq!(*section, expected, "band {i} out of order");
        }
    }

    #[test]
    fn test_all_bands_at_low_sample_rate() {
        // At 8kHz only the bands below 4kHz survive; the rest are identity.
        let sections = design_all_bands(&[3.0; 10], 8000.0);
        for (i, section) in sections.iter().enumerate() {
            if EQ_BANDS[i] >= 4000.0 {
                assert!(section.is_identity(), "band {i} should bypass");
            } else {
                assert!(!section.is_identity(), "band {i} should be active");
            }
        }
    }

    #[test]
    fn test_zero_gain_yields_unity_response() {
        // gain 0 => A = 1 => numerator equals denominator.
        let c = design_peaking(1000.0, 0.0, GRAPHIC_EQ_Q, 48000.0);
        assert!((c.b0 - 1.0).abs() < 1e-6);
        assert!((c.b1 - c.a1).abs() < 1e-6);
        assert!((c.b2 - c.a2).abs() < 1e-6);
    }

    #[test]
    fn test_preamp_unity_when_nothing_boosted() {
        assert_eq!(preamp_attenuation(&[0.0; 10]), 1.0);
        assert_eq!(preamp_attenuation(&[-12.0; 10]), 1.0);
    }

    #[test]
    fn test_preamp_tracks_max_boost() {
        let mut gains = [0.0_f32; 10];
        gains[2] = 6.0;
        gains[7] = 3.0;
        let expected = 10.0_f32.powf(-6.0 / 20.0);
        assert!((preamp_attenuation(&gains) - expected).abs() < 1e-7);
    }
}
