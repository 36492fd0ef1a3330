//! Half-buffer fill.
//!
//! Runs on the event path under a hard deadline of N sample periods, so it
//! never allocates, locks or logs.

use crate::buffer::{DoubleBuffer, Half};
use crate::config::ToneConfig;
use crate::error::ConfigResult;
use crate::phase::PhaseAccumulator;
use crate::wavetable::Wavetable;

pub struct BufferFiller {
    wavetable: Wavetable,
    accumulator: PhaseAccumulator,
}

impl BufferFiller {
    /// Accumulator starts at phase zero and indexes `wavetable` with its top bits.
    pub fn new(wavetable: Wavetable, tuning_word: u32) -> Self {
        let accumulator = PhaseAccumulator::new(tuning_word, wavetable.index_bits());
        Self { wavetable, accumulator }
    }

    /// Generate the wavetable and tuning word described by `config`.
    pub fn from_config(config: &ToneConfig) -> ConfigResult<Self> {
        config.validate()?;
        let wavetable = Wavetable::generate(config.table_size, config.amplitude)?;
        Ok(Self::new(wavetable, config.tuning_word()?))
    }

    pub fn with_phase(mut self, phase: u32) -> Self {
        self.accumulator = self.accumulator.with_phase(phase);
        self
    }

    /// Write one half of `buffer`.
    ///
    /// Even absolute positions (left) take the cosine, odd positions (right)
    /// the sine. The accumulator advances once per scalar written and carries
    /// over to the next call unchanged.
    pub fn fill(&mut self, buffer: &mut DoubleBuffer, half: Half) {
        let offset = half.offset(buffer.half_len());

        for (i, slot) in buffer.half_mut(half).iter_mut().enumerate() {
            let index = if (offset + i) & 1 == 1 {
                self.accumulator.sine_index()
            } else {
                self.accumulator.cosine_index()
            };
            *slot = self.wavetable[index];
            self.accumulator.advance();
        }
    }

    pub fn wavetable(&self) -> &Wavetable {
        &self.wavetable
    }

    pub fn accumulator(&self) -> &PhaseAccumulator {
        &self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD: u32 = 366_496_000;

    /// Sample the filler should emit at scalar `k` of the stream, for a start phase of zero.
    fn expected(table: &Wavetable, k: usize) -> i16 {
        let acc = PhaseAccumulator::new(WORD, table.index_bits())
            .with_phase(WORD.wrapping_mul(k as u32));
        if k & 1 == 1 {
            table[acc.sine_index()]
        } else {
            table[acc.cosine_index()]
        }
    }

    #[test]
    fn test_parity_mapping() {
        let mut filler = BufferFiller::new(Wavetable::full_scale(), WORD);
        let mut buffer = DoubleBuffer::new(32);

        filler.fill(&mut buffer, Half::First);

        // Phase zero: cosine on the left is full scale.
        assert_eq!(buffer.sample(0), 32_767);
        // Right channel samples the sine one step later: index of phase WORD.
        assert_eq!(buffer.sample(1), Wavetable::full_scale()[(WORD >> 24) as usize]);
        // Second half untouched.
        assert!(buffer.half(Half::Second).iter().all(|&s| s == 0));
    }

    #[test]
    fn test_advances_once_per_scalar() {
        let mut filler = BufferFiller::new(Wavetable::full_scale(), WORD);
        let mut buffer = DoubleBuffer::new(32);

        filler.fill(&mut buffer, Half::First);
        assert_eq!(filler.accumulator().phase(), WORD.wrapping_mul(64));

        filler.fill(&mut buffer, Half::Second);
        assert_eq!(filler.accumulator().phase(), WORD.wrapping_mul(128));
    }

    #[test]
    fn test_continuous_across_seam() {
        let table = Wavetable::full_scale();
        let mut filler = BufferFiller::new(table.clone(), WORD);
        let mut buffer = DoubleBuffer::new(32);

        let mut stream = Vec::new();
        for _ in 0..3 {
            filler.fill(&mut buffer, Half::First);
            stream.extend_from_slice(buffer.half(Half::First));
            filler.fill(&mut buffer, Half::Second);
            stream.extend_from_slice(buffer.half(Half::Second));
        }

        assert_eq!(stream.len(), 3 * 128);
        for (k, &sample) in stream.iter().enumerate() {
            assert_eq!(sample, expected(&table, k), "mismatch at scalar {k}");
        }
    }

    #[test]
    fn test_start_phase_is_respected() {
        let mut filler = BufferFiller::new(Wavetable::full_scale(), 0).with_phase(0x4000_0000);
        let mut buffer = DoubleBuffer::new(2);

        filler.fill(&mut buffer, Half::Second);

        // Quarter cycle: sine at +peak, cosine at zero; tuning word 0 holds it there.
        assert_eq!(buffer.half(Half::Second), &[0, 32_767, 0, 32_767]);
    }

    #[test]
    fn test_from_config() {
        let filler = BufferFiller::from_config(&ToneConfig::default()).unwrap();

        assert_eq!(filler.wavetable().len(), 256);
        assert_eq!(filler.accumulator().tuning_word(), WORD);
        assert_eq!(filler.accumulator().phase(), 0);
    }
}
