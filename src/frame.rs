//! Frame geometry and the per-frame time-domain stages.
//!
//! Every stage that transforms a frame has a matching `*_backward` function that
//! maps a gradient on the stage output to a gradient on its input.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::config::FrameOptions;
use crate::error::ConfigError;

/// Resolved frame sizes in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameGeometry {
    frame_length: usize,
    frame_shift: usize,
    padded_length: usize,
    snip_edges: bool,
}

impl FrameGeometry {
    pub fn new(options: &FrameOptions, sampling_rate: u32) -> Result<Self, ConfigError> {
        if sampling_rate == 0 {
            return Err(ConfigError::ZeroSamplingRate);
        }
        let frame_length = ms_to_samples(options.frame_length_ms, sampling_rate);
        if frame_length <= 0 {
            return Err(ConfigError::FrameLength {
                frame_length_ms: options.frame_length_ms,
                samples: frame_length,
            });
        }
        let frame_shift = ms_to_samples(options.frame_shift_ms, sampling_rate);
        if frame_shift <= 0 {
            return Err(ConfigError::FrameShift {
                frame_shift_ms: options.frame_shift_ms,
                samples: frame_shift,
            });
        }
        let frame_length = frame_length as usize;
        let padded_length = match options.fft_size {
            Some(fft_size) => fft_size,
            None if options.round_to_power_of_two => frame_length.next_power_of_two(),
            None => frame_length,
        };
        if padded_length < frame_length {
            return Err(ConfigError::FftSize {
                fft_size: padded_length,
                frame_length,
            });
        }
        Ok(Self {
            frame_length,
            frame_shift: frame_shift as usize,
            padded_length,
            snip_edges: options.snip_edges,
        })
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn frame_shift(&self) -> usize {
        self.frame_shift
    }

    /// FFT size each windowed frame is zero-padded to.
    pub fn padded_length(&self) -> usize {
        self.padded_length
    }

    pub fn snip_edges(&self) -> bool {
        self.snip_edges
    }

    /// Number of frames produced for `num_samples` input samples.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if self.snip_edges {
            if num_samples < self.frame_length {
                0
            } else {
                1 + (num_samples - self.frame_length) / self.frame_shift
            }
        } else {
            (num_samples + self.frame_shift / 2) / self.frame_shift
        }
    }

    /// Offset of the first sample of `frame`; negative before the waveform start.
    pub fn first_sample(&self, frame: usize) -> i64 {
        let shift = self.frame_shift as i64;
        let frame = frame as i64;
        if self.snip_edges {
            frame * shift
        } else {
            frame * shift + shift / 2 - (self.frame_length / 2) as i64
        }
    }

    /// Waveform index read for position `offset` of `frame`, reflecting out-of-range
    /// positions about the waveform edges (the edge sample is repeated).
    pub(crate) fn source_index(&self, frame: usize, offset: usize, num_samples: usize) -> usize {
        reflect_index(self.first_sample(frame) + offset as i64, num_samples)
    }

    /// Copy the raw samples of `frame` into `out` (`frame_length` long).
    pub(crate) fn fill_frame(&self, waveform: &[f32], frame: usize, out: &mut [f32]) {
        let num_samples = waveform.len();
        let start = self.first_sample(frame);
        if start >= 0 && start as usize + self.frame_length <= num_samples {
            let start = start as usize;
            out.copy_from_slice(&waveform[start..start + self.frame_length]);
            return;
        }
        for (offset, slot) in out.iter_mut().enumerate() {
            *slot = waveform[self.source_index(frame, offset, num_samples)];
        }
    }

    /// Accumulate a gradient on the raw frame samples into the waveform gradient.
    pub(crate) fn scatter_frame_grad(&self, grad_frame: &[f32], frame: usize, grad_waveform: &mut [f32]) {
        let num_samples = grad_waveform.len();
        for (offset, &g) in grad_frame.iter().enumerate() {
            grad_waveform[self.source_index(frame, offset, num_samples)] += g;
        }
    }
}

fn ms_to_samples(ms: f32, sampling_rate: u32) -> i64 {
    if !ms.is_finite() {
        return 0;
    }
    (sampling_rate as f64 * ms as f64 / 1000.0).floor() as i64
}

fn reflect_index(index: i64, num_samples: usize) -> usize {
    let n = num_samples as i64;
    if (0..n).contains(&index) {
        return index as usize;
    }
    let period = 2 * n;
    let folded = index.rem_euclid(period);
    if folded < n {
        folded as usize
    } else {
        (period - 1 - folded) as usize
    }
}

/// Add Gaussian noise with standard deviation `amount`. The gradient passes through unchanged.
pub(crate) fn dither<R: Rng>(frame: &mut [f32], amount: f32, rng: &mut R) {
    for sample in frame.iter_mut() {
        let noise: f32 = rng.sample(StandardNormal);
        *sample += amount * noise;
    }
}

/// Subtract the frame mean. The centering map is symmetric, so it is its own adjoint.
pub(crate) fn remove_dc_offset(frame: &mut [f32]) {
    if frame.is_empty() {
        return;
    }
    let mean = (frame.iter().map(|&v| v as f64).sum::<f64>() / frame.len() as f64) as f32;
    for sample in frame.iter_mut() {
        *sample -= mean;
    }
}

pub(crate) fn remove_dc_offset_backward(grad: &mut [f32]) {
    remove_dc_offset(grad);
}

/// `y[j] = x[j] - coeff * x[j - 1]`, with `x[-1]` taken as `x[0]`.
pub(crate) fn pre_emphasize(frame: &mut [f32], coeff: f32) {
    if frame.is_empty() || coeff == 0.0 {
        return;
    }
    for j in (1..frame.len()).rev() {
        frame[j] -= coeff * frame[j - 1];
    }
    frame[0] -= coeff * frame[0];
}

pub(crate) fn pre_emphasize_backward(grad: &mut [f32], coeff: f32) {
    if grad.is_empty() || coeff == 0.0 {
        return;
    }
    let first = grad[0];
    for j in 0..grad.len() - 1 {
        grad[j] -= coeff * grad[j + 1];
    }
    grad[0] -= coeff * first;
}

/// Log energy of one frame together with what its adjoint needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LogEnergy {
    pub(crate) value: f32,
    sum_sq: f32,
    /// True when the epsilon or the configured floor decided the value.
    clamped: bool,
}

/// `max(ln(max(Σx², ε)), ln(energy_floor))`, the floor applying only when positive.
pub(crate) fn log_energy(frame: &[f32], energy_floor: f32) -> LogEnergy {
    let sum_sq = frame.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>() as f32;
    let mut clamped = sum_sq < f32::EPSILON;
    let mut value = sum_sq.max(f32::EPSILON).ln();
    if energy_floor > 0.0 {
        let floor = energy_floor.ln();
        if value < floor {
            value = floor;
            clamped = true;
        }
    }
    LogEnergy {
        value,
        sum_sq,
        clamped,
    }
}

pub(crate) fn log_energy_backward(frame: &[f32], energy: &LogEnergy, grad_energy: f32, grad_frame: &mut [f32]) {
    if energy.clamped || grad_energy == 0.0 {
        return;
    }
    let scale = 2.0 * grad_energy / energy.sum_sq;
    for (g, &x) in grad_frame.iter_mut().zip(frame) {
        *g += scale * x;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn geometry(snip_edges: bool) -> FrameGeometry {
        let options = FrameOptions {
            snip_edges,
            ..FrameOptions::default()
        };
        FrameGeometry::new(&options, 16_000).unwrap()
    }

    #[test]
    fn default_geometry_is_400_by_160_padded_to_512() {
        let g = geometry(false);
        assert_eq!(g.frame_length(), 400);
        assert_eq!(g.frame_shift(), 160);
        assert_eq!(g.padded_length(), 512);
    }

    #[test]
    fn snip_edges_frame_count() {
        let g = geometry(true);
        assert_eq!(g.num_frames(0), 0);
        assert_eq!(g.num_frames(399), 0);
        assert_eq!(g.num_frames(400), 1);
        assert_eq!(g.num_frames(16_000), 98);
    }

    #[test]
    fn centered_frame_count_rounds_samples_over_shift() {
        let g = geometry(false);
        assert_eq!(g.num_frames(0), 0);
        assert_eq!(g.num_frames(79), 0);
        assert_eq!(g.num_frames(80), 1);
        assert_eq!(g.num_frames(16_000), 100);
        assert_eq!(g.num_frames(256_640), 1604);
    }

    #[test]
    fn rejects_non_positive_frame_parameters() {
        let options = FrameOptions {
            frame_shift_ms: 0.0,
            ..FrameOptions::default()
        };
        assert!(matches!(
            FrameGeometry::new(&options, 16_000),
            Err(ConfigError::FrameShift { .. })
        ));
        let options = FrameOptions {
            frame_length_ms: -5.0,
            ..FrameOptions::default()
        };
        assert!(matches!(
            FrameGeometry::new(&options, 16_000),
            Err(ConfigError::FrameLength { .. })
        ));
    }

    #[test]
    fn rejects_fft_smaller_than_frame() {
        let options = FrameOptions {
            fft_size: Some(256),
            ..FrameOptions::default()
        };
        assert_eq!(
            FrameGeometry::new(&options, 16_000),
            Err(ConfigError::FftSize {
                fft_size: 256,
                frame_length: 400
            })
        );
    }

    #[test]
    fn reflection_repeats_edge_sample() {
        assert_eq!(reflect_index(-1, 10), 0);
        assert_eq!(reflect_index(-3, 10), 2);
        assert_eq!(reflect_index(10, 10), 9);
        assert_eq!(reflect_index(12, 10), 7);
        assert_eq!(reflect_index(-25, 10), 4);
        assert_eq!(reflect_index(-4, 1), 0);
    }

    #[test]
    fn centered_first_frame_reflects_left_edge() {
        let g = geometry(false);
        assert_eq!(g.first_sample(0), 80 - 200);
        let waveform: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let mut frame = vec![0.0_f32; g.frame_length()];
        g.fill_frame(&waveform, 0, &mut frame);
        assert_eq!(frame[119], 0.0);
        assert_eq!(frame[120], 0.0);
        assert_eq!(frame[118], 1.0);
        assert_eq!(frame[121], 1.0);
    }

    #[test]
    fn scatter_is_adjoint_of_fill() {
        let g = geometry(false);
        let waveform: Vec<f32> = (0..500).map(|i| ((i * 7) % 13) as f32 - 6.0).collect();
        let probe: Vec<f32> = (0..g.frame_length()).map(|i| (i % 5) as f32 * 0.1).collect();
        let mut frame = vec![0.0_f32; g.frame_length()];
        g.fill_frame(&waveform, 0, &mut frame);
        let lhs: f64 = frame.iter().zip(&probe).map(|(a, b)| (a * b) as f64).sum();
        let mut grad = vec![0.0_f32; waveform.len()];
        g.scatter_frame_grad(&probe, 0, &mut grad);
        let rhs: f64 = grad.iter().zip(&waveform).map(|(a, b)| (a * b) as f64).sum();
        assert!((lhs - rhs).abs() < 1e-3);
    }

    #[test]
    fn pre_emphasis_backward_matches_transpose() {
        let coeff = 0.97;
        let n = 6;
        for col in 0..n {
            let mut basis = vec![0.0_f32; n];
            basis[col] = 1.0;
            pre_emphasize(&mut basis, coeff);
            for row in 0..n {
                let mut grad = vec![0.0_f32; n];
                grad[row] = 1.0;
                pre_emphasize_backward(&mut grad, coeff);
                assert!((basis[row] - grad[col]).abs() < 1e-6, "row {row} col {col}");
            }
        }
    }

    #[test]
    fn pre_emphasis_replicates_first_sample() {
        let mut frame = vec![1.0_f32, 2.0, 4.0];
        pre_emphasize(&mut frame, 0.5);
        assert_eq!(frame, vec![0.5, 1.5, 3.0]);
    }

    #[test]
    fn dc_removal_zeroes_mean() {
        let mut frame = vec![1.0_f32, 2.0, 3.0, 6.0];
        remove_dc_offset(&mut frame);
        let mean: f32 = frame.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
    }

    #[test]
    fn log_energy_applies_floor() {
        let silent = vec![0.0_f32; 16];
        let energy = log_energy(&silent, 1e-10);
        assert!((energy.value - f32::EPSILON.ln()).abs() < 1e-4);
        assert!(energy.clamped);

        let energy = log_energy(&silent, 1e-3);
        assert!((energy.value - 1e-3_f32.ln()).abs() < 1e-4);

        let frame = vec![0.5_f32; 16];
        let energy = log_energy(&frame, 1e-10);
        assert!((energy.value - 4.0_f32.ln()).abs() < 1e-6);
        let mut grad = vec![0.0_f32; 16];
        log_energy_backward(&frame, &energy, 1.0, &mut grad);
        assert!((grad[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn dither_is_reproducible_for_a_seed() {
        let mut a = vec![0.0_f32; 32];
        let mut b = vec![0.0_f32; 32];
        dither(&mut a, 1.0, &mut StdRng::seed_from_u64(7));
        dither(&mut b, 1.0, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v != 0.0));
    }
}
