//! Build-time tone parameters.
//!
//! The defaults reproduce the reference hardware: an 8 kHz quadrature tone on
//! a 48 kHz codec whose clock runs 2.34375 % slow, so the nominal rate is
//! corrected down to 46875 Hz.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::STEREO;
use crate::error::{ConfigError, ConfigResult};
use crate::phase::{actual_frequency, compute_tuning_word};
use crate::wavetable::{DEFAULT_TABLE_SIZE, FULL_SCALE, MAX_TABLE_SIZE};

pub const NOMINAL_SAMPLE_RATE: u32 = 48_000;
/// 3/128: the codec clock error measured on the reference board.
pub const CLOCK_ERROR_FRACTION: f64 = 0.023_437_5;
pub const DEFAULT_TONE_FREQUENCY: u32 = 8_000;
pub const DEFAULT_HALF_FRAMES: usize = 32;

/// `Fs_nominal * (1 - clock_error_fraction)`, rounded to the nearest hertz.
pub fn compensated_sample_rate(nominal: u32, clock_error_fraction: f64) -> ConfigResult<u32> {
    if !(0.0..1.0).contains(&clock_error_fraction) {
        return Err(ConfigError::InvalidClockError(clock_error_fraction));
    }
    Ok((f64::from(nominal) * (1.0 - clock_error_fraction)).round() as u32)
}

/// Time available to refill one half of `half_frames` frames at `sample_rate`.
pub fn fill_deadline(half_frames: usize, sample_rate: u32) -> ConfigResult<Duration> {
    if sample_rate == 0 {
        return Err(ConfigError::ZeroRate {
            sample_rate,
            channels: STEREO as u16,
        });
    }
    if half_frames == 0 {
        return Err(ConfigError::EmptyHalfBuffer);
    }
    Ok(Duration::from_secs_f64(half_frames as f64 / f64::from(sample_rate)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneConfig {
    /// Rate the sink is configured with, after clock compensation.
    pub sample_rate: u32,
    pub tone_frequency: u32,
    pub table_size: usize,
    /// Stereo frames per buffer half.
    pub half_frames: usize,
    pub channels: u16,
    pub amplitude: i16,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 46_875,
            tone_frequency: DEFAULT_TONE_FREQUENCY,
            table_size: DEFAULT_TABLE_SIZE,
            half_frames: DEFAULT_HALF_FRAMES,
            channels: STEREO as u16,
            amplitude: FULL_SCALE,
        }
    }
}

impl ToneConfig {
    /// Defaults with the sample rate derived from a nominal rate and a clock error.
    pub fn with_clock_compensation(nominal: u32, clock_error_fraction: f64) -> ConfigResult<Self> {
        Ok(Self {
            sample_rate: compensated_sample_rate(nominal, clock_error_fraction)?,
            ..Self::default()
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ConfigError::ZeroRate {
                sample_rate: self.sample_rate,
                channels: self.channels,
            });
        }
        if usize::from(self.channels) != STEREO {
            return Err(ConfigError::UnsupportedChannelCount(self.channels));
        }
        if !self.table_size.is_power_of_two() || !(4..=MAX_TABLE_SIZE).contains(&self.table_size) {
            return Err(ConfigError::InvalidTableSize(self.table_size));
        }
        if self.amplitude <= 0 {
            return Err(ConfigError::InvalidAmplitude(self.amplitude));
        }
        if self.half_frames == 0 {
            return Err(ConfigError::EmptyHalfBuffer);
        }
        if u64::from(self.tone_frequency) * 2 >= u64::from(self.sample_rate) {
            return Err(ConfigError::AboveNyquist {
                frequency: self.tone_frequency,
                sample_rate: self.sample_rate,
            });
        }
        Ok(())
    }

    pub fn tuning_word(&self) -> ConfigResult<u32> {
        compute_tuning_word(self.sample_rate, self.channels, self.tone_frequency)
    }

    /// Time the filler has to refill one half: N sample periods.
    pub fn fill_deadline(&self) -> ConfigResult<Duration> {
        self.validate()?;
        fill_deadline(self.half_frames, self.sample_rate)
    }

    pub fn frequency_report(&self) -> ConfigResult<FrequencyReport> {
        self.validate()?;
        let tuning_word = self.tuning_word()?;
        let requested_hz = f64::from(self.tone_frequency);
        let actual_hz = actual_frequency(tuning_word, self.sample_rate, self.channels);
        let error_hz = actual_hz - requested_hz;

        Ok(FrequencyReport {
            requested_hz,
            tuning_word,
            actual_hz,
            error_hz,
            relative_error: if requested_hz > 0.0 { error_hz / requested_hz } else { 0.0 },
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frequency quantization introduced by the truncated tuning word.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyReport {
    pub requested_hz: f64,
    pub tuning_word: u32,
    pub actual_hz: f64,
    /// `actual - requested`; never positive.
    pub error_hz: f64,
    pub relative_error: f64,
}

impl FrequencyReport {
    /// Whether `|relative_error| <= tolerance`.
    pub fn within(&self, tolerance: f64) -> bool {
        self.relative_error.abs() <= tolerance
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
