//! Refill scheduling driven by the sink's transfer events.
//!
//! There is no explicit state machine: the event itself says which half just
//! finished playing, and that half is refilled while the other one streams.
//!
//! | event          | now playing | refilled |
//! |----------------|-------------|----------|
//! | `HalfComplete` | second      | first    |
//! | `FullComplete` | first       | second   |

use crate::buffer::{DoubleBuffer, Half};
use crate::config::ToneConfig;
use crate::error::ConfigResult;
use crate::filler::BufferFiller;
use crate::transport::{TransferEvent, TransferHandler, TransferStatus};

pub struct StreamScheduler {
    filler: BufferFiller,
    first_fills: u64,
    second_fills: u64,
}

impl StreamScheduler {
    pub fn new(filler: BufferFiller) -> Self {
        Self {
            filler,
            first_fills: 0,
            second_fills: 0,
        }
    }

    pub fn from_config(config: &ToneConfig) -> ConfigResult<Self> {
        Ok(Self::new(BufferFiller::from_config(config)?))
    }

    /// First half drained: acknowledge, then refill it.
    #[inline]
    pub fn on_half_complete(&mut self, status: &TransferStatus, buffer: &mut DoubleBuffer) {
        status.acknowledge(TransferEvent::HalfComplete);
        self.refill(buffer, Half::First);
    }

    /// Whole buffer drained: acknowledge, then refill the second half.
    #[inline]
    pub fn on_full_complete(&mut self, status: &TransferStatus, buffer: &mut DoubleBuffer) {
        status.acknowledge(TransferEvent::FullComplete);
        self.refill(buffer, Half::Second);
    }

    pub fn on_event(&mut self, event: TransferEvent, status: &TransferStatus, buffer: &mut DoubleBuffer) {
        match event {
            TransferEvent::HalfComplete => self.on_half_complete(status, buffer),
            TransferEvent::FullComplete => self.on_full_complete(status, buffer),
        }
    }

    /// Service whichever event is pending, half-complete first.
    ///
    /// At most one event is handled per call. Returns the half that was
    /// refilled, or `None` if nothing was pending.
    pub fn service(&mut self, status: &TransferStatus, buffer: &mut DoubleBuffer) -> Option<Half> {
        if status.is_pending(TransferEvent::HalfComplete) {
            self.on_half_complete(status, buffer);
            Some(Half::First)
        } else if status.is_pending(TransferEvent::FullComplete) {
            self.on_full_complete(status, buffer);
            Some(Half::Second)
        } else {
            None
        }
    }

    fn refill(&mut self, buffer: &mut DoubleBuffer, half: Half) {
        self.filler.fill(buffer, half);
        match half {
            Half::First => self.first_fills += 1,
            Half::Second => self.second_fills += 1,
        }
    }

    pub fn fills(&self, half: Half) -> u64 {
        match half {
            Half::First => self.first_fills,
            Half::Second => self.second_fills,
        }
    }

    pub fn filler(&self) -> &BufferFiller {
        &self.filler
    }
}

impl TransferHandler for StreamScheduler {
    fn on_transfer(&mut self, status: &TransferStatus, buffer: &mut DoubleBuffer) {
        self.service(status, buffer);
    }
}
