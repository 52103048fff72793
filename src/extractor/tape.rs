//! Reverse-mode pass over a recorded extraction.

use ndarray::{Array1, ArrayView2};
use rustfft::num_complex::Complex32;

use super::Extractor;
use crate::config::FeatureKind;
use crate::error::FeatureError;
use crate::frame::{self, LogEnergy};
use crate::mel;
use crate::window::apply_window;

/// Intermediate values of one frame needed to run its stages backwards.
#[derive(Debug, Clone)]
pub(super) struct FrameTrace {
    /// Log energy and the samples it was measured on.
    pub(super) energy: Option<(LogEnergy, Vec<f32>)>,
    /// Half-spectrum FFT bins.
    pub(super) bins: Vec<Complex32>,
    /// Mel energies (or spectrum values) before the log.
    pub(super) pre_log: Vec<f32>,
}

/// Record of a forward extraction over one waveform.
///
/// A tape is only meaningful for the extractor that produced it.
#[derive(Debug, Clone)]
pub struct Tape {
    num_samples: usize,
    frames: Vec<FrameTrace>,
}

impl Tape {
    pub(super) fn new(num_samples: usize, frames: Vec<FrameTrace>) -> Self {
        Self {
            num_samples,
            frames,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }
}

impl Extractor {
    /// Propagate `grad_output` (`frames x feature_dim`, the gradient of a scalar loss
    /// with respect to the features) back to the waveform samples.
    pub fn backward(&self, tape: &Tape, grad_output: ArrayView2<'_, f32>) -> Result<Array1<f32>, FeatureError> {
        let expected = [tape.num_frames(), self.feature_dim];
        if grad_output.shape() != expected {
            return Err(FeatureError::shape("output gradient", &expected, grad_output.shape()));
        }
        let mut grad_waveform = Array1::<f32>::zeros(tape.num_samples);
        let Some(grad_samples) = grad_waveform.as_slice_mut() else {
            return Err(FeatureError::shape("waveform gradient", &[tape.num_samples], &[]));
        };

        let num_bins = self.spectrum.num_bins();
        let num_filters = self.mel.as_ref().map_or(0, |banks| banks.num_filters());
        let mut buffers = self.spectrum.buffers();
        let mut grad_out = vec![0.0_f32; self.feature_dim];
        let mut grad_filters = vec![0.0_f32; num_filters];
        let mut grad_spectrum = vec![0.0_f32; num_bins];
        let mut grad_frame = vec![0.0_f32; self.geometry.frame_length()];

        for (index, (trace, row)) in tape.frames.iter().zip(grad_output.outer_iter()).enumerate() {
            for (dst, &src) in grad_out.iter_mut().zip(row.iter()) {
                *dst = src;
            }
            let grad_energy = self.spectral_backward(
                trace,
                &mut grad_out,
                &mut grad_filters,
                &mut grad_spectrum,
            );
            self.spectrum
                .backward(&trace.bins, &grad_spectrum, &mut buffers, &mut grad_frame);
            self.frame_backward(trace, grad_energy, &mut grad_frame);
            self.geometry
                .scatter_frame_grad(&grad_frame, index, grad_samples);
        }
        Ok(grad_waveform)
    }

    /// Features back to the power spectrum; returns the gradient on the log energy.
    fn spectral_backward(
        &self,
        trace: &FrameTrace,
        grad_out: &mut [f32],
        grad_filters: &mut [f32],
        grad_spectrum: &mut [f32],
    ) -> f32 {
        let has_energy = trace.energy.is_some();
        let mut grad_energy = 0.0;
        match (self.config.kind, &self.mel) {
            (FeatureKind::Spectrogram, _) | (_, None) => {
                grad_spectrum.copy_from_slice(grad_out);
                if has_energy {
                    grad_energy = grad_spectrum[0];
                    grad_spectrum[0] = 0.0;
                }
                if self.config.mel.apply_log {
                    mel::log_floored_backward(&trace.pre_log, grad_spectrum);
                }
            }
            (FeatureKind::Fbank, Some(banks)) => {
                let offset = usize::from(has_energy);
                if has_energy {
                    grad_energy = grad_out[0];
                }
                grad_filters.copy_from_slice(&grad_out[offset..]);
                if self.config.mel.apply_log {
                    mel::log_floored_backward(&trace.pre_log, grad_filters);
                }
                banks.apply_backward(grad_filters, grad_spectrum);
            }
            (FeatureKind::Mfcc, Some(banks)) => {
                if has_energy {
                    grad_energy = grad_out[0];
                    grad_out[0] = 0.0;
                }
                if let Some(cepstral) = &self.cepstral {
                    cepstral.apply_backward(grad_out, grad_filters);
                }
                mel::log_floored_backward(&trace.pre_log, grad_filters);
                banks.apply_backward(grad_filters, grad_spectrum);
            }
        }
        grad_energy
    }

    /// Windowed frame back to the raw frame samples, in reverse stage order.
    fn frame_backward(&self, trace: &FrameTrace, grad_energy: f32, grad_frame: &mut [f32]) {
        let frame_opts = &self.config.frame;
        let raw_energy = self.config.energy.raw_energy;
        if let Some((energy, samples)) = &trace.energy
            && !raw_energy
        {
            frame::log_energy_backward(samples, energy, grad_energy, grad_frame);
        }
        apply_window(grad_frame, &self.window);
        frame::pre_emphasize_backward(grad_frame, frame_opts.preemph_coeff);
        if let Some((energy, samples)) = &trace.energy
            && raw_energy
        {
            frame::log_energy_backward(samples, energy, grad_energy, grad_frame);
        }
        if frame_opts.remove_dc_offset {
            frame::remove_dc_offset_backward(grad_frame);
        }
    }
}
