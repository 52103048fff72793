use crate::window::WindowType;

pub(crate) const FBANK_NUM_FILTERS: usize = 80;
pub(crate) const MFCC_NUM_FILTERS: usize = 23;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_false() -> bool {
    false
}

pub(crate) fn default_sampling_rate() -> u32 {
    16_000
}

pub(crate) fn default_frame_length_ms() -> f32 {
    25.0
}

pub(crate) fn default_frame_shift_ms() -> f32 {
    10.0
}

pub(crate) fn default_preemph_coeff() -> f32 {
    0.97
}

pub(crate) fn default_window_type() -> WindowType {
    WindowType::Povey
}

pub(crate) fn default_blackman_coeff() -> f32 {
    0.42
}

pub(crate) fn default_dither() -> f32 {
    0.0
}

pub(crate) fn default_energy_floor() -> f32 {
    1e-10
}

pub(crate) fn default_low_freq() -> f32 {
    20.0
}

/// Non-positive values are offsets from the Nyquist frequency.
pub(crate) fn default_high_freq() -> f32 {
    -400.0
}

pub(crate) fn default_num_ceps() -> usize {
    13
}

pub(crate) fn default_cepstral_lifter() -> f32 {
    22.0
}
