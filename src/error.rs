use std::path::PathBuf;
use thiserror::Error;

/// Invalid extractor configuration, detected when the extractor is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Sampling rate must be positive")]
    ZeroSamplingRate,
    #[error("Frame length must be positive, got {frame_length_ms} ms ({samples} samples)")]
    FrameLength { frame_length_ms: f32, samples: i64 },
    #[error("Frame shift must be positive, got {frame_shift_ms} ms ({samples} samples)")]
    FrameShift { frame_shift_ms: f32, samples: i64 },
    #[error("FFT size {fft_size} is smaller than the frame length {frame_length}")]
    FftSize { fft_size: usize, frame_length: usize },
    #[error("Pre-emphasis coefficient must be within [0, 1], got {0}")]
    PreEmphasis(f32),
    #[error("Dither must be non-negative and finite, got {0}")]
    Dither(f32),
    #[error("Energy floor must be non-negative, got {0}")]
    EnergyFloor(f32),
    #[error("At least 3 mel filters are required, got {0}")]
    TooFewFilters(usize),
    #[error("Invalid frequency bounds: low {low_freq} Hz, high {high_freq} Hz, nyquist {nyquist} Hz")]
    FrequencyBounds {
        low_freq: f32,
        high_freq: f32,
        nyquist: f32,
    },
    #[error("Cepstral coefficient count must be within 1..={num_filters}, got {num_ceps}")]
    CepstralCount { num_ceps: usize, num_filters: usize },
    #[error("Cepstral lifter must be non-negative, got {0}")]
    Lifter(f32),
    #[error("MFCC needs log mel energies; apply_log cannot be disabled")]
    MfccWithoutLog,
}

/// Errors raised while reading or writing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML: {0}")]
    SerializeToml(#[from] toml::ser::Error),
}

/// Errors returned by feature extraction and gradient propagation.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Sampling rate mismatch: extractor expects {expected} Hz, got {actual} Hz")]
    SamplingRate { expected: u32, actual: u32 },
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Non-finite value reached in {stage} at frame {frame}")]
    NumericDomain { stage: &'static str, frame: usize },
}

impl FeatureError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
