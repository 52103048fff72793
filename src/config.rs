//! Typed, immutable extractor configuration.
//!
//! Defaults follow Kaldi's `compute-fbank-feats` / `compute-mfcc-feats` as used
//! by the batch feature layers: 16 kHz audio, 25 ms frames every 10 ms, a Povey
//! window, 0.97 pre-emphasis and centered (non-snipped) framing.
//!
//! Config keys (TOML): `kind`, `sampling_rate`, `frame`, `energy`, `mel`, `mfcc`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config_defaults::{
    FBANK_NUM_FILTERS, MFCC_NUM_FILTERS, default_blackman_coeff, default_cepstral_lifter,
    default_dither, default_energy_floor, default_false, default_frame_length_ms,
    default_frame_shift_ms, default_high_freq, default_low_freq, default_num_ceps,
    default_preemph_coeff, default_sampling_rate, default_true, default_window_type,
};
use crate::error::{ConfigError, ConfigFileError};
use crate::window::WindowType;

/// Which feature family the extractor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Log mel filterbank energies.
    #[default]
    Fbank,
    /// Mel-frequency cepstral coefficients.
    Mfcc,
    /// Log power (or magnitude) spectrum.
    Spectrogram,
}

impl FeatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fbank => "fbank",
            Self::Mfcc => "mfcc",
            Self::Spectrogram => "spectrogram",
        }
    }
}

/// Complete extractor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub kind: FeatureKind,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
    #[serde(default)]
    pub frame: FrameOptions,
    #[serde(default)]
    pub energy: EnergyOptions,
    #[serde(default)]
    pub mel: MelOptions,
    #[serde(default)]
    pub mfcc: MfccOptions,
}

/// Framing, windowing and FFT sizing.
///
/// Config keys: `frame_length_ms`, `frame_shift_ms`, `round_to_power_of_two`, `fft_size`,
/// `remove_dc_offset`, `preemph_coeff`, `window_type`, `blackman_coeff`, `dither`,
/// `dither_seed`, `snip_edges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOptions {
    #[serde(default = "default_frame_length_ms")]
    pub frame_length_ms: f32,
    #[serde(default = "default_frame_shift_ms")]
    pub frame_shift_ms: f32,
    /// Zero-pad frames to the next power of two before the FFT.
    #[serde(default = "default_true")]
    pub round_to_power_of_two: bool,
    /// Explicit FFT size; overrides `round_to_power_of_two` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fft_size: Option<usize>,
    #[serde(default = "default_true")]
    pub remove_dc_offset: bool,
    #[serde(default = "default_preemph_coeff")]
    pub preemph_coeff: f32,
    #[serde(default = "default_window_type")]
    pub window_type: WindowType,
    #[serde(default = "default_blackman_coeff")]
    pub blackman_coeff: f32,
    /// Standard deviation of Gaussian noise added to every frame (0 disables).
    #[serde(default = "default_dither")]
    pub dither: f32,
    #[serde(default)]
    pub dither_seed: u64,
    /// Drop partial frames at the edges instead of reflecting samples.
    #[serde(default = "default_false")]
    pub snip_edges: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            frame_length_ms: default_frame_length_ms(),
            frame_shift_ms: default_frame_shift_ms(),
            round_to_power_of_two: default_true(),
            fft_size: None,
            remove_dc_offset: default_true(),
            preemph_coeff: default_preemph_coeff(),
            window_type: default_window_type(),
            blackman_coeff: default_blackman_coeff(),
            dither: default_dither(),
            dither_seed: 0,
            snip_edges: default_false(),
        }
    }
}

/// Frame energy handling.
///
/// Config keys: `use_energy`, `raw_energy`, `energy_floor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyOptions {
    /// Emit log energy (first fbank column, MFCC c0, or spectrogram bin 0).
    #[serde(default = "default_false")]
    pub use_energy: bool,
    /// Measure energy before pre-emphasis and windowing.
    #[serde(default = "default_true")]
    pub raw_energy: bool,
    #[serde(default = "default_energy_floor")]
    pub energy_floor: f32,
}

impl Default for EnergyOptions {
    fn default() -> Self {
        Self {
            use_energy: default_false(),
            raw_energy: default_true(),
            energy_floor: default_energy_floor(),
        }
    }
}

/// Mel filterbank placement.
///
/// Config keys: `num_filters`, `low_freq`, `high_freq`, `norm_filters`, `use_fft_mag`,
/// `apply_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelOptions {
    /// Filter count; unset means 80 for fbank and 23 for MFCC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_filters: Option<usize>,
    #[serde(default = "default_low_freq")]
    pub low_freq: f32,
    /// Upper edge in Hz; zero or negative values are offsets from Nyquist.
    #[serde(default = "default_high_freq")]
    pub high_freq: f32,
    #[serde(default = "default_false")]
    pub norm_filters: bool,
    /// Use the magnitude spectrum instead of the power spectrum.
    #[serde(default = "default_false")]
    pub use_fft_mag: bool,
    /// Take the log of fbank or spectrogram outputs. MFCC always works on log
    /// energies and rejects `false`.
    #[serde(default = "default_true")]
    pub apply_log: bool,
}

impl Default for MelOptions {
    fn default() -> Self {
        Self {
            num_filters: None,
            low_freq: default_low_freq(),
            high_freq: default_high_freq(),
            norm_filters: default_false(),
            use_fft_mag: default_false(),
            apply_log: default_true(),
        }
    }
}

/// Cepstral options, only used for [`FeatureKind::Mfcc`].
///
/// Config keys: `num_ceps`, `cepstral_lifter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfccOptions {
    #[serde(default = "default_num_ceps")]
    pub num_ceps: usize,
    /// Lifter coefficient Q; 0 disables liftering.
    #[serde(default = "default_cepstral_lifter")]
    pub cepstral_lifter: f32,
}

impl Default for MfccOptions {
    fn default() -> Self {
        Self {
            num_ceps: default_num_ceps(),
            cepstral_lifter: default_cepstral_lifter(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::fbank()
    }
}

impl FeatureConfig {
    /// Log mel filterbank defaults (80 filters).
    pub fn fbank() -> Self {
        Self::with_kind(FeatureKind::Fbank)
    }

    /// MFCC defaults (23 filters, 13 coefficients, lifter 22).
    pub fn mfcc() -> Self {
        Self::with_kind(FeatureKind::Mfcc)
    }

    /// Log power spectrogram defaults.
    pub fn spectrogram() -> Self {
        Self::with_kind(FeatureKind::Spectrogram)
    }

    fn with_kind(kind: FeatureKind) -> Self {
        Self {
            kind,
            sampling_rate: default_sampling_rate(),
            frame: FrameOptions::default(),
            energy: EnergyOptions::default(),
            mel: MelOptions::default(),
            mfcc: MfccOptions::default(),
        }
    }

    pub fn with_sampling_rate(mut self, sampling_rate: u32) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    /// Filter count after applying the per-kind default.
    pub fn num_filters(&self) -> usize {
        self.mel.num_filters.unwrap_or(match self.kind {
            FeatureKind::Mfcc => MFCC_NUM_FILTERS,
            FeatureKind::Fbank | FeatureKind::Spectrogram => FBANK_NUM_FILTERS,
        })
    }

    /// Check the scalar options that do not depend on derived geometry.
    ///
    /// Frequency bounds and FFT sizing are checked when the extractor builds its stages.
    pub(crate) fn validate_scalars(&self) -> Result<(), ConfigError> {
        if self.sampling_rate == 0 {
            return Err(ConfigError::ZeroSamplingRate);
        }
        let preemph = self.frame.preemph_coeff;
        if !(0.0..=1.0).contains(&preemph) {
            return Err(ConfigError::PreEmphasis(preemph));
        }
        let dither = self.frame.dither;
        if !dither.is_finite() || dither < 0.0 {
            return Err(ConfigError::Dither(dither));
        }
        let floor = self.energy.energy_floor;
        if !floor.is_finite() || floor < 0.0 {
            return Err(ConfigError::EnergyFloor(floor));
        }
        if self.kind == FeatureKind::Mfcc {
            if !self.mel.apply_log {
                return Err(ConfigError::MfccWithoutLog);
            }
            let lifter = self.mfcc.cepstral_lifter;
            if !lifter.is_finite() || lifter < 0.0 {
                return Err(ConfigError::Lifter(lifter));
            }
        }
        Ok(())
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigFileError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let data = self.to_toml_string()?;
        std::fs::write(path, data).map_err(|source| ConfigFileError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
