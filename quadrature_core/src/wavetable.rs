//! Quantized sine lookup table.
//!
//! Generated once before streaming starts and never mutated afterwards. The
//! table covers exactly one period, so any index taken modulo its length is a
//! valid lookup.

use std::f64::consts::PI;
use std::ops::Index;

use crate::error::{ConfigError, ConfigResult};

/// Default table length. Power of 2 so the top phase bits index it directly.
pub const DEFAULT_TABLE_SIZE: usize = 256;

/// Largest table the 32-bit phase accumulator can address sensibly.
pub const MAX_TABLE_SIZE: usize = 1 << 16;

/// Full-scale amplitude for signed 16-bit output.
pub const FULL_SCALE: i16 = i16::MAX;

/// One period of `round(amplitude * sin(2πi / len))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wavetable {
    entries: Box<[i16]>,
    amplitude: i16,
}

impl Wavetable {
    /// Build the table. `table_size` must be a power of two in `[4, 65536]`
    /// and `amplitude` positive.
    pub fn generate(table_size: usize, amplitude: i16) -> ConfigResult<Self> {
        if !table_size.is_power_of_two() || !(4..=MAX_TABLE_SIZE).contains(&table_size) {
            return Err(ConfigError::InvalidTableSize(table_size));
        }
        if amplitude <= 0 {
            return Err(ConfigError::InvalidAmplitude(amplitude));
        }

        Ok(Self::build(table_size, amplitude))
    }

    /// Full-scale table of [`DEFAULT_TABLE_SIZE`] entries.
    pub fn full_scale() -> Self {
        Self::build(DEFAULT_TABLE_SIZE, FULL_SCALE)
    }

    fn build(table_size: usize, amplitude: i16) -> Self {
        let scale = f64::from(amplitude);
        let entries = (0..table_size)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / table_size as f64;
                // 0 < amplitude <= i16::MAX, so the cast cannot saturate.
                (scale * angle.sin()).round() as i16
            })
            .collect();

        Self { entries, amplitude }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// log2 of the table length, i.e. how many phase bits form an index.
    #[inline]
    pub fn index_bits(&self) -> u32 {
        self.entries.len().trailing_zeros()
    }

    #[inline]
    pub fn amplitude(&self) -> i16 {
        self.amplitude
    }

    /// Lookup with wrap-around.
    #[inline]
    pub fn get(&self, index: usize) -> i16 {
        self.entries[index & (self.entries.len() - 1)]
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.entries
    }
}

impl Index<usize> for Wavetable {
    type Output = i16;

    #[inline]
    fn index(&self, index: usize) -> &i16 {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_points() {
        let table = Wavetable::generate(256, 32767).unwrap();

        assert_eq!(table.len(), 256);
        assert_eq!(table[0], 0);
        assert_eq!(table[64], 32767);
        assert_eq!(table[128], 0);
        assert_eq!(table[192], -32767);
    }

    #[test]
    fn test_bounded_by_amplitude() {
        for &(size, amplitude) in &[(4usize, 100i16), (256, 32767), (1024, 12000), (65536, 32767)] {
            let table = Wavetable::generate(size, amplitude).unwrap();
            assert!(table.as_slice().iter().all(|v| v.unsigned_abs() <= amplitude as u16));
        }
    }

    #[test]
    fn test_periodic_lookup() {
        let table = Wavetable::full_scale();

        for i in 0..table.len() {
            assert_eq!(table.get(i), table.get(i + table.len()));
            assert_eq!(table.get(i), table.get(i + 7 * table.len()));
        }
    }

    #[test]
    fn test_odd_symmetry() {
        let table = Wavetable::full_scale();

        for i in 1..table.len() {
            let mirrored = -table[table.len() - i];
            assert!((table[i] as i32 - mirrored as i32).abs() <= 1);
        }
    }

    #[test]
    fn test_index_bits() {
        assert_eq!(Wavetable::generate(4, 1).unwrap().index_bits(), 2);
        assert_eq!(Wavetable::full_scale().index_bits(), 8);
        assert_eq!(Wavetable::generate(4096, 1).unwrap().index_bits(), 12);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        for size in [0usize, 1, 2, 3, 100, 255, MAX_TABLE_SIZE * 2] {
            assert_eq!(
                Wavetable::generate(size, FULL_SCALE),
                Err(ConfigError::InvalidTableSize(size))
            );
        }
    }

    #[test]
    fn test_rejects_non_positive_amplitude() {
        assert_eq!(Wavetable::generate(256, 0), Err(ConfigError::InvalidAmplitude(0)));
        assert_eq!(
            Wavetable::generate(256, i16::MIN),
            Err(ConfigError::InvalidAmplitude(i16::MIN))
        );

        let table = Wavetable::generate(256, 1).unwrap();
        assert_eq!(table[64], 1);
        assert_eq!(table[192], -1);
    }
}
