//! 32-bit phase accumulator.
//!
//! The accumulator wraps silently modulo 2^32. Its top `index_bits` bits are
//! the sine table index; the cosine index leads it by a quarter table.
//!
//! # Frequency quantization
//!
//! The tuning word is `floor(2^32 / (c * Fs)) * f`. With `K = 2^32 / (c * Fs)`
//! the synthesized frequency is `floor(K) * f / K`, so the absolute error is
//! `f * frac(K) / K` and the relative error `frac(K) / K`. The error is zero
//! only when `c * Fs` divides 2^32.

use crate::error::{ConfigError, ConfigResult};

/// 2^32 as a float, the accumulator modulus.
pub const PHASE_MODULUS: f64 = 4_294_967_296.0;

/// Per-sample phase increment for `target_frequency`.
///
/// The accumulator advances once per scalar sample, so the effective rate is
/// `channel_count * sample_rate`. The division is truncated before the
/// multiplication on purpose: that is the rounding the streamed tone relies on.
pub fn compute_tuning_word(sample_rate: u32, channel_count: u16, target_frequency: u32) -> ConfigResult<u32> {
    let scalar_rate = u64::from(sample_rate) * u64::from(channel_count);
    if scalar_rate == 0 {
        return Err(ConfigError::ZeroRate { sample_rate, channels: channel_count });
    }

    let step = (1u64 << 32) / scalar_rate;
    step.checked_mul(u64::from(target_frequency))
        .and_then(|word| u32::try_from(word).ok())
        .ok_or(ConfigError::TuningWordOverflow { frequency: target_frequency })
}

/// Frequency actually produced by `tuning_word`.
#[inline]
pub fn actual_frequency(tuning_word: u32, sample_rate: u32, channel_count: u16) -> f64 {
    f64::from(tuning_word) * f64::from(channel_count) * f64::from(sample_rate) / PHASE_MODULUS
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseAccumulator {
    phase: u32,
    tuning_word: u32,
    index_bits: u32,
}

impl PhaseAccumulator {
    /// Start at phase zero. `index_bits` is log2 of the wavetable length, in `1..=16`.
    pub fn new(tuning_word: u32, index_bits: u32) -> Self {
        debug_assert!((1..=16).contains(&index_bits));
        Self {
            phase: 0,
            tuning_word,
            index_bits,
        }
    }

    pub fn with_phase(mut self, phase: u32) -> Self {
        self.phase = phase;
        self
    }

    /// Step forward by one scalar sample.
    #[inline(always)]
    pub fn advance(&mut self) {
        self.phase = self.phase.wrapping_add(self.tuning_word);
    }

    #[inline(always)]
    pub fn sine_index(&self) -> usize {
        (self.phase >> (32 - self.index_bits)) as usize
    }

    /// Quarter-cycle lead on the sine index.
    #[inline(always)]
    pub fn cosine_index(&self) -> usize {
        let len = self.table_len();
        (self.sine_index() + len / 4) & (len - 1)
    }

    #[inline]
    pub fn phase(&self) -> u32 {
        self.phase
    }

    #[inline]
    pub fn tuning_word(&self) -> u32 {
        self.tuning_word
    }

    #[inline]
    pub fn table_len(&self) -> usize {
        1 << self.index_bits
    }
}
