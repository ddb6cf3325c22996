//! Built-in EQ Presets

use crate::eq::EqSettings;

/// Named EQ preset with 10 band gains
pub type Preset = (&'static str, [f32; 10]);

/// List of built-in presets
pub const PRESETS: &[Preset] = &[
    ("Flat", [0.0; 10]),
    ("Bass Boost", [6.0, 5.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Treble Boost", [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0, 5.0, 6.0, 6.0]),
    ("Vocal Clarity", [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 2.0, 1.0, 0.0]),
    ("Bass Reduce", [-6.0, -4.0, -2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Loudness", [4.0, 3.0, 0.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0]),
    ("Podcast", [-3.0, -2.0, 0.0, 3.0, 4.0, 4.0, 2.0, 0.0, -1.0, -2.0]),
    ("Electronic", [4.0, 3.0, 1.0, 0.0, -2.0, -2.0, 0.0, 1.0, 3.0, 4.0]),
];

/// Look up a preset's gains by name (case-insensitive).
pub fn find_preset(name: &str) -> Option<&'static [f32; 10]> {
    PRESETS
        .iter()
        .find(|(preset_name, _)| preset_name.eq_ignore_ascii_case(name))
        .map(|(_, gains)| gains)
}

/// Build enabled settings from a preset's gains.
pub fn preset_settings(name: &str) -> Option<EqSettings> {
    find_preset(name).map(|gains| EqSettings {
        enabled: true,
        band_gains: *gains,
    })
}
