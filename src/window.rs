use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Analysis window applied to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    /// Hann window raised to the power 0.85; never reaches zero inside the frame.
    Povey,
    Hamming,
    #[serde(alias = "hanning")]
    Hann,
    Rectangular,
    Blackman,
}

impl WindowType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Povey => "povey",
            Self::Hamming => "hamming",
            Self::Hann => "hann",
            Self::Rectangular => "rectangular",
            Self::Blackman => "blackman",
        }
    }
}

/// Evaluate the symmetric window of `length` samples.
///
/// Coefficients use `a = 2π / (length - 1)`; a single-sample window is `[1.0]`.
pub fn window_coefficients(window_type: WindowType, length: usize, blackman_coeff: f32) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length];
    }
    let a = 2.0 * PI / (length - 1) as f64;
    let blackman_coeff = blackman_coeff as f64;
    (0..length)
        .map(|i| {
            let i = i as f64;
            let value = match window_type {
                WindowType::Hann => 0.5 - 0.5 * (a * i).cos(),
                WindowType::Povey => (0.5 - 0.5 * (a * i).cos()).powf(0.85),
                WindowType::Hamming => 0.54 - 0.46 * (a * i).cos(),
                WindowType::Rectangular => 1.0,
                WindowType::Blackman => {
                    blackman_coeff - 0.5 * (a * i).cos()
                        + (0.5 - blackman_coeff) * (2.0 * a * i).cos()
                }
            };
            value as f32
        })
        .collect()
}

/// Multiply `frame` by `window` in place. The adjoint is the same operation.
pub(crate) fn apply_window(frame: &mut [f32], window: &[f32]) {
    for (sample, &w) in frame.iter_mut().zip(window) {
        *sample *= w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_is_symmetric_and_zero_at_edges() {
        let w = window_coefficients(WindowType::Hann, 8, 0.42);
        assert!((w[0]).abs() < 1e-6);
        assert!((w[7]).abs() < 1e-6);
        assert!((w[1] - w[6]).abs() < 1e-6);
    }

    #[test]
    fn povey_is_hann_to_the_085() {
        let hann = window_coefficients(WindowType::Hann, 400, 0.42);
        let povey = window_coefficients(WindowType::Povey, 400, 0.42);
        for (h, p) in hann.iter().zip(&povey) {
            assert!((h.powf(0.85) - p).abs() < 1e-6);
        }
        assert!(povey[200] > 0.99);
    }

    #[test]
    fn hamming_endpoints_are_008() {
        let w = window_coefficients(WindowType::Hamming, 400, 0.42);
        assert!((w[0] - 0.08).abs() < 1e-6);
        assert!((w[399] - 0.08).abs() < 1e-6);
    }

    #[test]
    fn blackman_with_default_coeff_starts_at_zero() {
        let w = window_coefficients(WindowType::Blackman, 64, 0.42);
        assert!(w[0].abs() < 1e-6);
        assert!((w[0] - w[63]).abs() < 1e-6);
    }

    #[test]
    fn rectangular_is_identity() {
        let w = window_coefficients(WindowType::Rectangular, 5, 0.42);
        let mut frame = vec![0.5_f32, -1.0, 2.0, 0.0, 3.0];
        let original = frame.clone();
        apply_window(&mut frame, &w);
        assert_eq!(frame, original);
    }

    #[test]
    fn window_type_parses_lowercase_names() {
        let parsed: WindowType = serde_json::from_str("\"hanning\"").unwrap();
        assert_eq!(parsed, WindowType::Hann);
        let parsed: WindowType = serde_json::from_str("\"povey\"").unwrap();
        assert_eq!(parsed, WindowType::Povey);
    }
}
