//! Zero-padded real FFT of windowed frames.

use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;

/// Per-bin quantity kept from the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumKind {
    /// `re² + im²`
    Power,
    /// `sqrt(re² + im²)`
    Magnitude,
}

/// Cached forward and inverse transforms for one FFT size.
pub(crate) struct SpectrumPlan {
    len: usize,
    kind: SpectrumKind,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch_len: usize,
}

impl fmt::Debug for SpectrumPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumPlan")
            .field("len", &self.len)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Working buffers for one frame; reused across frames of a single call.
pub(crate) struct SpectrumBuffers {
    fft: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl SpectrumPlan {
    pub(crate) fn new(len: usize, kind: SpectrumKind) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            len,
            kind,
            forward,
            inverse,
            scratch_len,
        }
    }

    pub(crate) fn num_bins(&self) -> usize {
        self.len / 2 + 1
    }

    pub(crate) fn buffers(&self) -> SpectrumBuffers {
        SpectrumBuffers {
            fft: vec![Complex32::default(); self.len],
            scratch: vec![Complex32::default(); self.scratch_len],
        }
    }

    /// Transform `frame` (zero-padded to the plan size) and write the half spectrum.
    ///
    /// `bins` receives the complex bins `0..=len/2`; `out` receives power or magnitude.
    pub(crate) fn forward(
        &self,
        frame: &[f32],
        buffers: &mut SpectrumBuffers,
        bins: &mut [Complex32],
        out: &mut [f32],
    ) {
        for (i, cell) in buffers.fft.iter_mut().enumerate() {
            *cell = Complex32::new(frame.get(i).copied().unwrap_or(0.0), 0.0);
        }
        self.forward
            .process_with_scratch(&mut buffers.fft, &mut buffers.scratch);
        let num_bins = self.num_bins();
        bins[..num_bins].copy_from_slice(&buffers.fft[..num_bins]);
        for (slot, c) in out.iter_mut().zip(&buffers.fft[..num_bins]) {
            let power = c.re * c.re + c.im * c.im;
            *slot = match self.kind {
                SpectrumKind::Power => power,
                SpectrumKind::Magnitude => power.sqrt(),
            };
        }
    }

    /// Map a gradient on the half spectrum back onto the (unpadded) real frame.
    pub(crate) fn backward(
        &self,
        bins: &[Complex32],
        grad_out: &[f32],
        buffers: &mut SpectrumBuffers,
        grad_frame: &mut [f32],
    ) {
        buffers.fft.fill(Complex32::default());
        for ((cell, &c), &g) in buffers.fft.iter_mut().zip(bins).zip(grad_out) {
            *cell = match self.kind {
                SpectrumKind::Power => c * (2.0 * g),
                SpectrumKind::Magnitude => {
                    let magnitude = c.norm();
                    if magnitude > 0.0 {
                        c * (g / magnitude)
                    } else {
                        Complex32::default()
                    }
                }
            };
        }
        self.inverse
            .process_with_scratch(&mut buffers.fft, &mut buffers.scratch);
        for (g, c) in grad_frame.iter_mut().zip(&buffers.fft) {
            *g = c.re;
        }
    }
}
