use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Linear chirp from 100 Hz to 3 kHz plus uniform noise, reproducible per seed.
pub fn chirp_with_noise(len: usize, sampling_rate: u32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let duration = len as f32 / sampling_rate as f32;
    let sweep = (3_000.0 - 100.0) / duration.max(f32::EPSILON);
    (0..len)
        .map(|i| {
            let t = i as f32 / sampling_rate as f32;
            let phase = 2.0 * std::f32::consts::PI * (100.0 * t + 0.5 * sweep * t * t);
            0.4 * phase.sin() + rng.random_range(-0.02..0.02)
        })
        .collect()
}

/// `rows` independent waveforms of `len` samples each.
pub fn batch(rows: usize, len: usize, sampling_rate: u32) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((rows, len));
    for (seed, mut row) in out.outer_iter_mut().enumerate() {
        let samples = chirp_with_noise(len, sampling_rate, seed as u64);
        for (dst, src) in row.iter_mut().zip(samples) {
            *dst = src;
        }
    }
    out
}
