use std::f64::consts::PI;

use ndarray::Array2;

use crate::error::ConfigError;

/// Orthonormal DCT-II followed by sinusoidal liftering.
#[derive(Debug, Clone, PartialEq)]
pub struct CepstralTransform {
    /// `num_ceps x num_filters`.
    dct: Array2<f32>,
    /// Empty when liftering is disabled.
    lifter: Vec<f32>,
}

impl CepstralTransform {
    pub fn new(num_filters: usize, num_ceps: usize, cepstral_lifter: f32) -> Result<Self, ConfigError> {
        if num_ceps == 0 || num_ceps > num_filters {
            return Err(ConfigError::CepstralCount {
                num_ceps,
                num_filters,
            });
        }
        if !cepstral_lifter.is_finite() || cepstral_lifter < 0.0 {
            return Err(ConfigError::Lifter(cepstral_lifter));
        }
        let lifter = if cepstral_lifter > 0.0 {
            lifter_coefficients(num_ceps, cepstral_lifter)
        } else {
            Vec::new()
        };
        Ok(Self {
            dct: dct_matrix(num_filters, num_ceps),
            lifter,
        })
    }

    pub fn num_ceps(&self) -> usize {
        self.dct.nrows()
    }

    pub fn num_filters(&self) -> usize {
        self.dct.ncols()
    }

    pub fn dct(&self) -> &Array2<f32> {
        &self.dct
    }

    pub fn lifter(&self) -> &[f32] {
        &self.lifter
    }

    /// Cepstra of one frame of log filterbank energies.
    pub(crate) fn apply(&self, log_energies: &[f32], out: &mut [f32]) {
        for (k, (slot, row)) in out.iter_mut().zip(self.dct.outer_iter()).enumerate() {
            let mut sum = 0.0_f64;
            for (&d, &e) in row.iter().zip(log_energies) {
                sum += d as f64 * e as f64;
            }
            let lift = self.lifter.get(k).copied().unwrap_or(1.0);
            *slot = sum as f32 * lift;
        }
    }

    /// Transpose of [`CepstralTransform::apply`]; overwrites `grad_log_energies`.
    pub(crate) fn apply_backward(&self, grad_ceps: &[f32], grad_log_energies: &mut [f32]) {
        grad_log_energies.fill(0.0);
        for (k, (&g, row)) in grad_ceps.iter().zip(self.dct.outer_iter()).enumerate() {
            let g = g * self.lifter.get(k).copied().unwrap_or(1.0);
            if g == 0.0 {
                continue;
            }
            for (slot, &d) in grad_log_energies.iter_mut().zip(row) {
                *slot += g * d;
            }
        }
    }
}

/// Rows `k < num_ceps` of the orthonormal DCT-II of size `num_filters`.
fn dct_matrix(num_filters: usize, num_ceps: usize) -> Array2<f32> {
    let n = num_filters as f64;
    Array2::from_shape_fn((num_ceps, num_filters), |(k, m)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        let angle = PI / n * (m as f64 + 0.5) * k as f64;
        (scale * angle.cos()) as f32
    })
}

/// `1 + Q/2 * sin(pi * i / Q)`.
fn lifter_coefficients(num_ceps: usize, q: f32) -> Vec<f32> {
    let q = q as f64;
    (0..num_ceps)
        .map(|i| (1.0 + 0.5 * q * (PI * i as f64 / q).sin()) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_more_ceps_than_filters() {
        assert_eq!(
            CepstralTransform::new(23, 24, 22.0),
            Err(ConfigError::CepstralCount {
                num_ceps: 24,
                num_filters: 23
            })
        );
        assert!(CepstralTransform::new(23, 0, 22.0).is_err());
        assert!(CepstralTransform::new(23, 23, 22.0).is_ok());
    }

    #[test]
    fn full_dct_is_orthonormal() {
        let t = CepstralTransform::new(8, 8, 0.0).unwrap();
        let dct = t.dct();
        let gram = dct.dot(&dct.t());
        for i in 0..8 {
            for j in 0..8 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn constant_input_only_has_c0() {
        let t = CepstralTransform::new(23, 13, 22.0).unwrap();
        let mut out = vec![0.0_f32; 13];
        t.apply(&[2.0; 23], &mut out);
        assert!((out[0] - 2.0 * 23.0_f32.sqrt()).abs() < 1e-4);
        assert!(out[1..].iter().all(|c| c.abs() < 1e-4));
    }

    #[test]
    fn lifter_leaves_c0_untouched() {
        let t = CepstralTransform::new(23, 13, 22.0).unwrap();
        assert_eq!(t.lifter().len(), 13);
        assert!((t.lifter()[0] - 1.0).abs() < 1e-7);
        assert!((t.lifter()[11] - (1.0 + 11.0 * (std::f32::consts::PI / 2.0).sin())).abs() < 1e-4);
    }

    #[test]
    fn truncation_keeps_leading_coefficients() {
        let input: Vec<f32> = (0..23).map(|m| (m as f32 * 0.37).sin()).collect();
        let full = CepstralTransform::new(23, 23, 22.0).unwrap();
        let short = CepstralTransform::new(23, 13, 22.0).unwrap();
        let mut a = vec![0.0_f32; 23];
        let mut b = vec![0.0_f32; 13];
        full.apply(&input, &mut a);
        short.apply(&input, &mut b);
        // Lifter depends only on Q and the coefficient index.
        assert_eq!(&a[..13], &b[..]);
    }

    #[test]
    fn dct_matrix_has_ceps_by_filters_shape() {
        let t = CepstralTransform::new(23, 13, 22.0).unwrap();
        assert_eq!(t.dct().dim(), (13, 23));
        assert_eq!(t.num_ceps(), 13);
        assert_eq!(t.num_filters(), 23);
        let n = 23.0_f64;
        let expected = (2.0 / n).sqrt() * (std::f64::consts::PI / n * 2.5 * 3.0).cos();
        assert!((t.dct()[[3, 2]] as f64 - expected).abs() < 1e-6);
        assert!(t.dct().row(0).iter().all(|&v| (v as f64 - (1.0 / n).sqrt()).abs() < 1e-7));
    }

    #[test]
    fn backward_is_transpose() {
        let t = CepstralTransform::new(10, 6, 22.0).unwrap();
        let x: Vec<f32> = (0..10).map(|m| m as f32 * 0.1 - 0.4).collect();
        let g: Vec<f32> = (0..6).map(|k| 1.0 - k as f32 * 0.3).collect();
        let mut y = vec![0.0_f32; 6];
        t.apply(&x, &mut y);
        let mut gx = vec![0.0_f32; 10];
        t.apply_backward(&g, &mut gx);
        let lhs: f32 = y.iter().zip(&g).map(|(a, b)| a * b).sum();
        let rhs: f32 = x.iter().zip(&gx).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-4);
    }
}
