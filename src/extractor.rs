//! Feature extraction facade: framing, windowing, FFT, mel projection and DCT.
//!
//! An [`Extractor`] is built once per configuration. Construction validates every
//! option and caches the window, FFT plans, mel filterbank and DCT matrix; after
//! that the extractor is immutable and can be shared across threads.

mod tape;


use std::borrow::Cow;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustfft::num_complex::Complex32;
use tracing::{debug, trace, warn};

use crate::cepstral::CepstralTransform;
use crate::config::{FeatureConfig, FeatureKind};
use crate::error::FeatureError;
use crate::frame::{self, FrameGeometry, LogEnergy};
use crate::mel::{self, MelBanks};
use crate::spectrum::{SpectrumBuffers, SpectrumKind, SpectrumPlan};
use crate::window::{apply_window, window_coefficients};

pub use tape::Tape;
use tape::FrameTrace;

/// Kaldi-compatible fbank / MFCC / spectrogram extractor.
#[derive(Debug)]
pub struct Extractor {
    config: FeatureConfig,
    geometry: FrameGeometry,
    window: Vec<f32>,
    spectrum: SpectrumPlan,
    mel: Option<MelBanks>,
    cepstral: Option<CepstralTransform>,
    feature_dim: usize,
}

/// Per-call working memory, reused across the frames of one waveform.
struct FrameScratch {
    frame: Vec<f32>,
    spectrum: SpectrumBuffers,
    bins: Vec<Complex32>,
    power: Vec<f32>,
    energies: Vec<f32>,
    log_energies: Vec<f32>,
    rng: Option<StdRng>,
}

impl Extractor {
    /// Validate `config` and build every stage.
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        config.validate_scalars()?;
        let geometry = FrameGeometry::new(&config.frame, config.sampling_rate)?;
        let window = window_coefficients(
            config.frame.window_type,
            geometry.frame_length(),
            config.frame.blackman_coeff,
        );
        let spectrum_kind = if config.mel.use_fft_mag {
            SpectrumKind::Magnitude
        } else {
            SpectrumKind::Power
        };
        let spectrum = SpectrumPlan::new(geometry.padded_length(), spectrum_kind);

        let mel = match config.kind {
            FeatureKind::Spectrogram => None,
            FeatureKind::Fbank | FeatureKind::Mfcc => Some(MelBanks::new(
                &config.mel,
                config.num_filters(),
                config.sampling_rate,
                geometry.padded_length(),
            )?),
        };
        let cepstral = match (&mel, config.kind) {
            (Some(banks), FeatureKind::Mfcc) => Some(CepstralTransform::new(
                banks.num_filters(),
                config.mfcc.num_ceps,
                config.mfcc.cepstral_lifter,
            )?),
            _ => None,
        };

        let feature_dim = match config.kind {
            FeatureKind::Spectrogram => spectrum.num_bins(),
            FeatureKind::Fbank => config.num_filters() + usize::from(config.energy.use_energy),
            FeatureKind::Mfcc => config.mfcc.num_ceps,
        };

        debug!(
            kind = config.kind.as_str(),
            sampling_rate = config.sampling_rate,
            frame_length = geometry.frame_length(),
            frame_shift = geometry.frame_shift(),
            fft_len = geometry.padded_length(),
            window = config.frame.window_type.as_str(),
            feature_dim,
            "feature extractor ready"
        );

        Ok(Self {
            config,
            geometry,
            window,
            spectrum,
            mel,
            cepstral,
            feature_dim,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn kind(&self) -> FeatureKind {
        self.config.kind
    }

    pub fn sampling_rate(&self) -> u32 {
        self.config.sampling_rate
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Window coefficients, one per frame sample.
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn mel_banks(&self) -> Option<&MelBanks> {
        self.mel.as_ref()
    }

    pub fn cepstral(&self) -> Option<&CepstralTransform> {
        self.cepstral.as_ref()
    }

    /// Columns of every output row.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn num_frames(&self, num_samples: usize) -> usize {
        self.geometry.num_frames(num_samples)
    }

    /// Extract a `frames x feature_dim` matrix from one waveform.
    pub fn extract(&self, waveform: &[f32], sampling_rate: u32) -> Result<Array2<f32>, FeatureError> {
        self.check_sampling_rate(sampling_rate)?;
        self.run(waveform, None)
    }

    /// Extract features and record what the backward pass needs.
    pub fn extract_with_tape(
        &self,
        waveform: &[f32],
        sampling_rate: u32,
    ) -> Result<(Array2<f32>, Tape), FeatureError> {
        self.check_sampling_rate(sampling_rate)?;
        let mut traces = Vec::with_capacity(self.num_frames(waveform.len()));
        let features = self.run(waveform, Some(&mut traces))?;
        Ok((features, Tape::new(waveform.len(), traces)))
    }

    /// Extract a `batch x frames x feature_dim` array; rows are processed independently.
    pub fn extract_batch(
        &self,
        waveforms: ArrayView2<'_, f32>,
        sampling_rate: u32,
    ) -> Result<Array3<f32>, FeatureError> {
        self.check_sampling_rate(sampling_rate)?;
        let (batch, num_samples) = waveforms.dim();
        trace!(batch, num_samples, "extracting batch");
        let rows = batch_rows(waveforms);
        let outputs = map_rows(&rows, |row| self.run(row, None))?;
        stack_rows(outputs, [batch, self.num_frames(num_samples), self.feature_dim])
    }

    /// Gradient of a scalar loss with respect to each batch row, given the
    /// gradient `grad_output` (`batch x frames x feature_dim`) of that loss with
    /// respect to the features of `waveforms`.
    pub fn vjp_batch(
        &self,
        waveforms: ArrayView2<'_, f32>,
        sampling_rate: u32,
        grad_output: ArrayView3<'_, f32>,
    ) -> Result<Array2<f32>, FeatureError> {
        self.check_sampling_rate(sampling_rate)?;
        let (batch, num_samples) = waveforms.dim();
        let expected = [batch, self.num_frames(num_samples), self.feature_dim];
        if grad_output.shape() != expected {
            return Err(FeatureError::shape("output gradient", &expected, grad_output.shape()));
        }
        let rows = batch_rows(waveforms);
        let indexed: Vec<(usize, &[f32])> = rows.iter().map(|row| &row[..]).enumerate().collect();
        let grads = map_rows(&indexed, |&(index, row)| {
            let (_, tape) = self.extract_with_tape(row, sampling_rate)?;
            self.backward(&tape, grad_output.index_axis(Axis(0), index))
        })?;
        let mut out = Array2::<f32>::zeros((batch, num_samples));
        for (mut dst, grad) in out.outer_iter_mut().zip(grads) {
            dst.assign(&grad);
        }
        Ok(out)
    }

    fn check_sampling_rate(&self, sampling_rate: u32) -> Result<(), FeatureError> {
        if sampling_rate != self.config.sampling_rate {
            return Err(FeatureError::SamplingRate {
                expected: self.config.sampling_rate,
                actual: sampling_rate,
            });
        }
        Ok(())
    }

    fn scratch(&self) -> FrameScratch {
        let num_bins = self.spectrum.num_bins();
        let num_filters = self.mel.as_ref().map_or(0, MelBanks::num_filters);
        let rng = (self.config.frame.dither > 0.0)
            .then(|| StdRng::seed_from_u64(self.config.frame.dither_seed));
        FrameScratch {
            frame: vec![0.0; self.geometry.frame_length()],
            spectrum: self.spectrum.buffers(),
            bins: vec![Complex32::default(); num_bins],
            power: vec![0.0; num_bins],
            energies: vec![0.0; num_filters],
            log_energies: vec![0.0; num_filters],
            rng,
        }
    }

    fn run(
        &self,
        waveform: &[f32],
        mut traces: Option<&mut Vec<FrameTrace>>,
    ) -> Result<Array2<f32>, FeatureError> {
        let num_frames = self.num_frames(waveform.len());
        if num_frames == 0 {
            warn!(
                num_samples = waveform.len(),
                frame_length = self.geometry.frame_length(),
                "waveform too short for a single frame"
            );
            return Ok(Array2::zeros((0, self.feature_dim)));
        }
        let mut scratch = self.scratch();
        let mut flat = vec![0.0_f32; num_frames * self.feature_dim];
        let record = traces.is_some();
        for (index, out) in flat.chunks_mut(self.feature_dim).enumerate() {
            let trace = self.forward_frame(waveform, index, &mut scratch, out, record)?;
            if let (Some(traces), Some(trace)) = (traces.as_deref_mut(), trace) {
                traces.push(trace);
            }
        }
        let len = flat.len();
        Array2::from_shape_vec((num_frames, self.feature_dim), flat)
            .map_err(|_| FeatureError::shape("features", &[num_frames, self.feature_dim], &[len]))
    }

    /// Run every stage on one frame, writing `feature_dim` values into `out`.
    ///
    /// Intermediates for the backward pass are copied out only when `record` is set.
    fn forward_frame(
        &self,
        waveform: &[f32],
        index: usize,
        scratch: &mut FrameScratch,
        out: &mut [f32],
        record: bool,
    ) -> Result<Option<FrameTrace>, FeatureError> {
        let frame_opts = &self.config.frame;
        let energy_opts = &self.config.energy;
        let frame = &mut scratch.frame;

        self.geometry.fill_frame(waveform, index, frame);
        if let Some(rng) = scratch.rng.as_mut() {
            frame::dither(frame, frame_opts.dither, rng);
        }
        if frame_opts.remove_dc_offset {
            frame::remove_dc_offset(frame);
        }

        let mut energy: Option<LogEnergy> = None;
        let mut energy_samples: Option<Vec<f32>> = None;
        if energy_opts.use_energy && energy_opts.raw_energy {
            energy = Some(frame::log_energy(frame, energy_opts.energy_floor));
            energy_samples = record.then(|| frame.clone());
        }
        frame::pre_emphasize(frame, frame_opts.preemph_coeff);
        apply_window(frame, &self.window);
        if energy_opts.use_energy && !energy_opts.raw_energy {
            energy = Some(frame::log_energy(frame, energy_opts.energy_floor));
            energy_samples = record.then(|| frame.clone());
        }

        self.spectrum
            .forward(frame, &mut scratch.spectrum, &mut scratch.bins, &mut scratch.power);

        match (self.config.kind, &self.mel) {
            (FeatureKind::Spectrogram, _) | (_, None) => {
                out.copy_from_slice(&scratch.power);
                if self.config.mel.apply_log {
                    mel::log_floored(out);
                }
            }
            (FeatureKind::Fbank, Some(banks)) => {
                banks.apply(&scratch.power, &mut scratch.energies);
                let filters = &mut out[usize::from(energy.is_some())..];
                filters.copy_from_slice(&scratch.energies);
                if self.config.mel.apply_log {
                    mel::log_floored(filters);
                }
            }
            (FeatureKind::Mfcc, Some(banks)) => {
                banks.apply(&scratch.power, &mut scratch.energies);
                scratch.log_energies.copy_from_slice(&scratch.energies);
                mel::log_floored(&mut scratch.log_energies);
                if let Some(cepstral) = &self.cepstral {
                    cepstral.apply(&scratch.log_energies, out);
                }
            }
        }
        if let Some(e) = &energy {
            out[0] = e.value;
        }

        if out.iter().any(|v| !v.is_finite()) {
            return Err(FeatureError::NumericDomain {
                stage: self.config.kind.as_str(),
                frame: index,
            });
        }
        if !record {
            return Ok(None);
        }

        let pre_log = match self.mel {
            Some(_) => scratch.energies.clone(),
            None => scratch.power.clone(),
        };
        Ok(Some(FrameTrace {
            energy: energy.zip(energy_samples),
            bins: scratch.bins.clone(),
            pre_log,
        }))
    }
}

fn batch_rows(waveforms: ArrayView2<'_, f32>) -> Vec<Cow<'_, [f32]>> {
    (0..waveforms.nrows())
        .map(|index| waveforms.index_axis_move(Axis(0), index))
        .map(|row| match row.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(row.to_vec()),
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn map_rows<I, T, F>(rows: &[I], f: F) -> Result<Vec<T>, FeatureError>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<T, FeatureError> + Sync + Send,
{
    use rayon::prelude::*;
    rows.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_rows<I, T, F>(rows: &[I], f: F) -> Result<Vec<T>, FeatureError>
where
    F: Fn(&I) -> Result<T, FeatureError>,
{
    rows.iter().map(f).collect()
}

fn stack_rows(rows: Vec<Array2<f32>>, shape: [usize; 3]) -> Result<Array3<f32>, FeatureError> {
    let [batch, frames, dim] = shape;
    let mut out = Array3::<f32>::zeros((batch, frames, dim));
    for (mut dst, row) in out.outer_iter_mut().zip(rows) {
        if row.dim() != (frames, dim) {
            return Err(FeatureError::shape("batch row", &[frames, dim], row.shape()));
        }
        dst.assign(&row);
    }
    Ok(out)
}
