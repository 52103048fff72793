//! Kaldi-compatible speech features (log mel filterbank, MFCC, spectrogram)
//! with a reverse-mode pass back to the waveform.
//!
//! ```no_run
//! use kaldi_features::{Extractor, FeatureConfig};
//!
//! let extractor = Extractor::new(FeatureConfig::fbank())?;
//! let waveform = vec![0.0_f32; 16_000];
//! let (features, tape) = extractor.extract_with_tape(&waveform, 16_000)?;
//! let grad = extractor.backward(&tape, ndarray::Array2::ones(features.dim()).view())?;
//! assert_eq!(grad.len(), waveform.len());
//! # Ok::<(), kaldi_features::FeatureError>(())
//! ```

/// Cepstral transform (DCT-II and liftering).
pub mod cepstral;
/// Serializable extractor configuration.
pub mod config;
mod config_defaults;
/// Error types.
pub mod error;
/// Extraction facade and backward pass.
pub mod extractor;
/// Frame geometry and per-frame signal conditioning.
pub mod frame;
/// Tracing subscriber setup.
pub mod logging;
/// Mel scale and triangular filterbanks.
pub mod mel;
/// Real FFT power and magnitude spectra.
pub mod spectrum;
/// Analysis window functions.
pub mod window;

pub use cepstral::CepstralTransform;
pub use config::{EnergyOptions, FeatureConfig, FeatureKind, FrameOptions, MelOptions, MfccOptions};
pub use error::{ConfigError, ConfigFileError, FeatureError};
pub use extractor::{Extractor, Tape};
pub use frame::FrameGeometry;
pub use mel::MelBanks;
pub use spectrum::SpectrumKind;
pub use window::WindowType;
