//! Circular drain of the double buffer and the two transfer events.
//!
//! [`Transport`] behaves like a circular DMA channel: it reads the buffer one
//! scalar at a time, raises [`TransferEvent::HalfComplete`] after the last
//! scalar of the first half and [`TransferEvent::FullComplete`] after the last
//! scalar of the second half, and hands the buffer to the handler while the
//! event is pending. Every sink in this workspace drains through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::buffer::DoubleBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferEvent {
    /// First half drained; second half now playing.
    HalfComplete = 0b01,
    /// Second half drained; wrapped back to the first.
    FullComplete = 0b10,
}

impl TransferEvent {
    #[inline]
    fn bit(self) -> u8 {
        self as u8
    }
}

/// Pending-event flags plus diagnostic counters.
///
/// The transport raises, the handler acknowledges. Raising an event whose flag
/// is still set means the previous one was never serviced; that is counted as
/// an overrun and the flag simply stays set.
pub struct TransferStatus {
    pending: AtomicU8,
    half_raised: AtomicU64,
    full_raised: AtomicU64,
    overruns: AtomicU64,
}

impl TransferStatus {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
            half_raised: AtomicU64::new(0),
            full_raised: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
        }
    }

    /// Set the flag for `event`. Returns `false` if it was already pending.
    #[inline]
    pub fn raise(&self, event: TransferEvent) -> bool {
        let counter = match event {
            TransferEvent::HalfComplete => &self.half_raised,
            TransferEvent::FullComplete => &self.full_raised,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let previous = self.pending.fetch_or(event.bit(), Ordering::AcqRel);
        if previous & event.bit() != 0 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    #[inline]
    pub fn is_pending(&self, event: TransferEvent) -> bool {
        self.pending.load(Ordering::Acquire) & event.bit() != 0
    }

    /// Clear the flag for `event`. Returns whether it had been pending.
    #[inline]
    pub fn acknowledge(&self, event: TransferEvent) -> bool {
        self.pending.fetch_and(!event.bit(), Ordering::AcqRel) & event.bit() != 0
    }

    pub fn half_raised(&self) -> u64 {
        self.half_raised.load(Ordering::Relaxed)
    }

    pub fn full_raised(&self) -> u64 {
        self.full_raised.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl Default for TransferStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver of transfer events.
///
/// Invoked on the sink's event path with one event pending. Implementations
/// must acknowledge it before returning and must not block. Only one
/// invocation may be active at a time.
pub trait TransferHandler: Send + 'static {
    fn on_transfer(&mut self, status: &TransferStatus, buffer: &mut DoubleBuffer);
}

/// Read cursor over a [`DoubleBuffer`] that raises events at the half boundaries.
pub struct Transport {
    buffer: DoubleBuffer,
    cursor: usize,
    status: Arc<TransferStatus>,
}

impl Transport {
    pub fn new(buffer: DoubleBuffer, status: Arc<TransferStatus>) -> Self {
        Self {
            buffer,
            cursor: 0,
            status,
        }
    }

    /// Drain `out.len()` scalars, calling `dispatch` at every boundary.
    pub fn drain<D>(&mut self, out: &mut [i16], dispatch: D)
    where
        D: FnMut(&TransferStatus, &mut DoubleBuffer),
    {
        self.drain_map(out, |sample| sample, dispatch);
    }

    /// As [`drain`](Self::drain), converting each scalar for the output format.
    pub fn drain_map<T, C, D>(&mut self, out: &mut [T], convert: C, mut dispatch: D)
    where
        C: Fn(i16) -> T,
        D: FnMut(&TransferStatus, &mut DoubleBuffer),
    {
        let half_len = self.buffer.half_len();
        let len = self.buffer.len();
        if len == 0 {
            return;
        }

        for slot in out.iter_mut() {
            *slot = convert(self.buffer.sample(self.cursor));
            self.cursor += 1;

            let event = if self.cursor == half_len {
                TransferEvent::HalfComplete
            } else if self.cursor == len {
                self.cursor = 0;
                TransferEvent::FullComplete
            } else {
                continue;
            };

            if self.status.raise(event) {
                dispatch(&*self.status, &mut self.buffer);
            }
        }
    }

    /// Next scalar position to be read.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn buffer(&self) -> &DoubleBuffer {
        &self.buffer
    }

    pub fn status(&self) -> &Arc<TransferStatus> {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Half;

    #[test]
    fn test_status_raise_and_acknowledge() {
        let status = TransferStatus::new();

        assert!(!status.is_pending(TransferEvent::HalfComplete));
        assert!(status.raise(TransferEvent::HalfComplete));
        assert!(status.is_pending(TransferEvent::HalfComplete));
        assert!(!status.is_pending(TransferEvent::FullComplete));

        assert!(status.acknowledge(TransferEvent::HalfComplete));
        assert!(!status.acknowledge(TransferEvent::HalfComplete));
        assert!(!status.is_pending(TransferEvent::HalfComplete));
        assert_eq!(status.half_raised(), 1);
        assert_eq!(status.overruns(), 0);
    }

    #[test]
    fn test_status_counts_overrun() {
        let status = TransferStatus::new();

        assert!(status.raise(TransferEvent::FullComplete));
        assert!(!status.raise(TransferEvent::FullComplete));

        assert_eq!(status.full_raised(), 2);
        assert_eq!(status.overruns(), 1);
        assert!(status.is_pending(TransferEvent::FullComplete));
    }

    #[test]
    fn test_events_at_boundaries() {
        let status = Arc::new(TransferStatus::new());
        let mut transport = Transport::new(DoubleBuffer::new(4), status.clone());
        let mut seen = Vec::new();
        let mut out = [0i16; 20];

        for chunk in out.chunks_mut(3) {
            transport.drain(chunk, |status, _| {
                if status.acknowledge(TransferEvent::HalfComplete) {
                    seen.push(TransferEvent::HalfComplete);
                } else if status.acknowledge(TransferEvent::FullComplete) {
                    seen.push(TransferEvent::FullComplete);
                }
            });
        }

        // 20 scalars over a 16-scalar buffer: half at 8, full at 16.
        assert_eq!(seen, vec![TransferEvent::HalfComplete, TransferEvent::FullComplete]);
        assert_eq!(transport.cursor(), 4);
        assert_eq!(status.overruns(), 0);
    }

    #[test]
    fn test_dispatch_writes_are_read_next_cycle() {
        let status = Arc::new(TransferStatus::new());
        let mut transport = Transport::new(DoubleBuffer::new(2), status);
        let mut out = [0i16; 16];

        transport.drain(&mut out, |status, buffer| {
            if status.acknowledge(TransferEvent::HalfComplete) {
                buffer.half_mut(Half::First).fill(1);
            } else if status.acknowledge(TransferEvent::FullComplete) {
                buffer.half_mut(Half::Second).fill(2);
            }
        });

        assert_eq!(&out[..8], &[0; 8]);
        assert_eq!(&out[8..12], &[1; 4]);
        assert_eq!(&out[12..], &[2; 4]);
    }

    #[test]
    fn test_unacknowledged_events_overrun() {
        let status = Arc::new(TransferStatus::new());
        let mut transport = Transport::new(DoubleBuffer::new(2), status.clone());
        let mut calls = 0;
        let mut out = [0i16; 12];

        transport.drain(&mut out, |_, _| calls += 1);

        // Three boundaries crossed: half, full, half. The second half event finds its flag set.
        assert_eq!(status.half_raised(), 2);
        assert_eq!(status.full_raised(), 1);
        assert_eq!(status.overruns(), 1);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_drain_map_converts() {
        let status = Arc::new(TransferStatus::new());
        let mut buffer = DoubleBuffer::new(1);
        buffer.half_mut(Half::First).copy_from_slice(&[-2, 3]);
        let mut transport = Transport::new(buffer, status);
        let mut out = [0i32; 2];

        transport.drain_map(&mut out, |s| i32::from(s) * 10, |status, _| {
            status.acknowledge(TransferEvent::HalfComplete);
        });

        assert_eq!(out, [-20, 30]);
    }
}
