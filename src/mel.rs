//! Triangular mel filterbank in Kaldi's placement convention.
//!
//! Filter centers are equidistant on `mel(f) = 1127 ln(1 + f / 700)` between the
//! resolved low and high frequencies. FFT bin `i` sits at `i * rate / fft_len` Hz and
//! the Nyquist bin never carries weight.

use ndarray::Array2;
use serde::Serialize;
use tracing::warn;

use crate::config::MelOptions;
use crate::error::ConfigError;

pub fn mel_scale(hz: f32) -> f32 {
    1127.0_f32 * (1.0 + hz / 700.0).ln()
}

pub fn inverse_mel_scale(mel: f32) -> f32 {
    700.0_f32 * ((mel / 1127.0).exp() - 1.0)
}

fn mel_scale_f64(hz: f64) -> f64 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct FilterSpan {
    /// First spectrum bin with non-zero weight.
    start: usize,
    /// Offset of the first weight in the shared arena.
    offset: usize,
    len: usize,
}

/// Immutable filterbank built once per extractor.
///
/// All filter weights live in one contiguous arena; each filter stores the span of
/// bins it covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MelBanks {
    num_bins: usize,
    low_freq: f32,
    high_freq: f32,
    center_freqs: Vec<f32>,
    spans: Vec<FilterSpan>,
    weights: Vec<f32>,
}

impl MelBanks {
    /// Build `num_filters` filters over the `fft_len / 2 + 1` bins of a real FFT.
    pub fn new(
        options: &MelOptions,
        num_filters: usize,
        sampling_rate: u32,
        fft_len: usize,
    ) -> Result<Self, ConfigError> {
        if num_filters < 3 {
            return Err(ConfigError::TooFewFilters(num_filters));
        }
        let (low_freq, high_freq) =
            resolve_frequency_bounds(options.low_freq, options.high_freq, sampling_rate)?;

        let mel_low = mel_scale_f64(low_freq as f64);
        let mel_high = mel_scale_f64(high_freq as f64);
        let mel_delta = (mel_high - mel_low) / (num_filters + 1) as f64;
        let bin_width = sampling_rate as f32 / fft_len as f32;
        let bin_mels: Vec<f32> = (0..fft_len / 2)
            .map(|i| mel_scale(bin_width * i as f32))
            .collect();

        let mut center_freqs = Vec::with_capacity(num_filters);
        let mut spans = Vec::with_capacity(num_filters);
        let mut weights = Vec::new();
        for m in 0..num_filters {
            let left = (mel_low + m as f64 * mel_delta) as f32;
            let center = (mel_low + (m + 1) as f64 * mel_delta) as f32;
            let right = (mel_low + (m + 2) as f64 * mel_delta) as f32;
            center_freqs.push(inverse_mel_scale(center));

            let offset = weights.len();
            let mut start = None;
            for (bin, &mel) in bin_mels.iter().enumerate() {
                if mel <= left || mel >= right {
                    if start.is_some() {
                        break;
                    }
                    continue;
                }
                let weight = if mel <= center {
                    (mel - left) / (center - left)
                } else {
                    (right - mel) / (right - center)
                };
                start.get_or_insert(bin);
                weights.push(weight);
            }
            let len = weights.len() - offset;
            if len == 0 {
                warn!(
                    filter = m,
                    num_filters,
                    fft_len,
                    "mel filter covers no FFT bins; its energy is always floored"
                );
            }
            if options.norm_filters {
                let sum: f32 = weights[offset..].iter().sum();
                if sum > 0.0 {
                    for w in &mut weights[offset..] {
                        *w /= sum;
                    }
                }
            }
            spans.push(FilterSpan {
                start: start.unwrap_or(0),
                offset,
                len,
            });
        }

        Ok(Self {
            num_bins: fft_len / 2 + 1,
            low_freq,
            high_freq,
            center_freqs,
            spans,
            weights,
        })
    }

    pub fn num_filters(&self) -> usize {
        self.spans.len()
    }

    /// Spectrum bins each filter is defined over (`fft_len / 2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn low_freq(&self) -> f32 {
        self.low_freq
    }

    pub fn high_freq(&self) -> f32 {
        self.high_freq
    }

    pub fn center_frequencies(&self) -> &[f32] {
        &self.center_freqs
    }

    /// First bin and weights of filter `m`.
    pub fn filter(&self, m: usize) -> Option<(usize, &[f32])> {
        let span = self.spans.get(m)?;
        Some((span.start, &self.weights[span.offset..span.offset + span.len]))
    }

    /// Dense `num_filters x num_bins` weight matrix.
    pub fn matrix(&self) -> Array2<f32> {
        let mut matrix = Array2::<f32>::zeros((self.num_filters(), self.num_bins));
        for (m, span) in self.spans.iter().enumerate() {
            let weights = &self.weights[span.offset..span.offset + span.len];
            for (i, &w) in weights.iter().enumerate() {
                matrix[[m, span.start + i]] = w;
            }
        }
        matrix
    }

    /// Project a spectrum onto the filters.
    pub(crate) fn apply(&self, spectrum: &[f32], out: &mut [f32]) {
        for (slot, span) in out.iter_mut().zip(&self.spans) {
            let weights = &self.weights[span.offset..span.offset + span.len];
            let bins = &spectrum[span.start..span.start + span.len];
            let mut sum = 0.0_f64;
            for (&w, &p) in weights.iter().zip(bins) {
                sum += w as f64 * p as f64;
            }
            *slot = sum as f32;
        }
    }

    /// Transpose of [`MelBanks::apply`]; overwrites `grad_spectrum`.
    pub(crate) fn apply_backward(&self, grad_energies: &[f32], grad_spectrum: &mut [f32]) {
        grad_spectrum.fill(0.0);
        for (&g, span) in grad_energies.iter().zip(&self.spans) {
            let weights = &self.weights[span.offset..span.offset + span.len];
            for (slot, &w) in grad_spectrum[span.start..span.start + span.len]
                .iter_mut()
                .zip(weights)
            {
                *slot += g * w;
            }
        }
    }
}

/// Resolve `high_freq <= 0` as an offset from Nyquist and check the bounds.
pub(crate) fn resolve_frequency_bounds(
    low_freq: f32,
    high_freq: f32,
    sampling_rate: u32,
) -> Result<(f32, f32), ConfigError> {
    let nyquist = 0.5 * sampling_rate as f32;
    let resolved_high = if high_freq > 0.0 {
        high_freq
    } else {
        nyquist + high_freq
    };
    let valid = low_freq.is_finite()
        && resolved_high.is_finite()
        && low_freq >= 0.0
        && low_freq < nyquist
        && resolved_high > 0.0
        && resolved_high <= nyquist
        && low_freq < resolved_high;
    if !valid {
        return Err(ConfigError::FrequencyBounds {
            low_freq,
            high_freq: resolved_high,
            nyquist,
        });
    }
    Ok((low_freq, resolved_high))
}

/// `ln(max(e, f32::EPSILON))` in place.
pub(crate) fn log_floored(energies: &mut [f32]) {
    for e in energies.iter_mut() {
        *e = e.max(f32::EPSILON).ln();
    }
}

/// Gradient of [`log_floored`] given the energies before the log; zero where floored.
pub(crate) fn log_floored_backward(energies: &[f32], grad: &mut [f32]) {
    for (g, &e) in grad.iter_mut().zip(energies) {
        *g = if e > f32::EPSILON { *g / e } else { 0.0 };
    }
}
