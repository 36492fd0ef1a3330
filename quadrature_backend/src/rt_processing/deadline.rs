use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use quanta::{Clock, Instant as QuantaInstant};

/// Snapshot of fill timing suitable for logging (non-RT).
#[derive(Debug, Clone)]
pub struct DeadlineSnapshot {
    /// Half refills timed since creation or last reset.
    pub fills: u64,
    /// Refills that took longer than the deadline.
    pub deadline_misses: u64,
    pub min_fill_nanos: Option<u64>,
    pub max_fill_nanos: Option<u64>,
    /// EMA of refill duration in nanoseconds.
    pub ema_fill_nanos: f64,
    /// Playback time of one half: the budget for each refill.
    pub deadline_nanos: f64,
    /// EMA refill time as a share of the deadline.
    pub avg_load_percent: f64,
    pub timestamp: Instant,
}

/// Real-time-safe timing of half refills against their deadline.
///
/// On the device thread only `scoped_fill()` and `record_fill_duration_nanos`
/// are used; both touch atomics only. `snapshot` belongs on the control thread.
pub struct DeadlineMonitor {
    clock: Clock,
    deadline_nanos: u64,

    fills: AtomicU64,
    deadline_misses: AtomicU64,

    min_fill_nanos: AtomicU64,
    max_fill_nanos: AtomicU64,
    /// EMA stored as f64 bits
    ema_fill_bits: AtomicU64,
    ema_alpha: f64,
}

impl DeadlineMonitor {
    /// `ema_alpha` must lie in (0, 1]; around 0.05..0.2 is typical.
    pub fn new(deadline: Duration, ema_alpha: f64) -> Self {
        assert!(ema_alpha > 0.0 && ema_alpha <= 1.0);
        Self {
            clock: Clock::new(),
            deadline_nanos: u64::try_from(deadline.as_nanos()).unwrap_or(u64::MAX),
            fills: AtomicU64::new(0),
            deadline_misses: AtomicU64::new(0),
            min_fill_nanos: AtomicU64::new(u64::MAX),
            max_fill_nanos: AtomicU64::new(0),
            ema_fill_bits: AtomicU64::new(0),
            ema_alpha,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_nanos(self.deadline_nanos)
    }

    /// Record one refill duration. Real-time safe.
    #[inline(always)]
    pub fn record_fill_duration_nanos(&self, nanos: u64) {
        self.fills.fetch_add(1, Ordering::Relaxed);
        if nanos > self.deadline_nanos {
            self.deadline_misses.fetch_add(1, Ordering::Relaxed);
        }

        self.min_fill_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_fill_nanos.fetch_max(nanos, Ordering::Relaxed);

        // EMA_new = alpha * x + (1 - alpha) * EMA_old
        let alpha = self.ema_alpha;
        let mut old_bits = self.ema_fill_bits.load(Ordering::Relaxed);
        loop {
            let old = f64::from_bits(old_bits);
            let new = alpha * (nanos as f64) + (1.0 - alpha) * old;
            match self.ema_fill_bits.compare_exchange_weak(
                old_bits,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => old_bits = found,
            }
        }
    }

    /// Guard that times the refill and records it on drop.
    ///
    /// ```ignore
    /// let _g = monitor.scoped_fill();
    /// slot.dispatch(status, buffer);
    /// ```
    #[inline(always)]
    pub fn scoped_fill(&self) -> FillGuard<'_> {
        FillGuard {
            monitor: self,
            start: self.clock.now(),
        }
    }

    /// Read the counters. With `reset_peaks`, min/max and the EMA start over.
    pub fn snapshot(&self, reset_peaks: bool) -> DeadlineSnapshot {
        let fills = self.fills.load(Ordering::Relaxed);
        let deadline_misses = self.deadline_misses.load(Ordering::Relaxed);
        let min_raw = self.min_fill_nanos.load(Ordering::Relaxed);
        let max_raw = self.max_fill_nanos.load(Ordering::Relaxed);
        let ema_fill_nanos = f64::from_bits(self.ema_fill_bits.load(Ordering::Relaxed));
        let deadline_nanos = self.deadline_nanos as f64;

        let avg_load_percent = if deadline_nanos > 0.0 {
            (ema_fill_nanos / deadline_nanos) * 100.0
        } else {
            0.0
        };

        if reset_peaks {
            self.min_fill_nanos.store(u64::MAX, Ordering::Relaxed);
            self.max_fill_nanos.store(0, Ordering::Relaxed);
            self.ema_fill_bits.store(0, Ordering::Relaxed);
        }

        DeadlineSnapshot {
            fills,
            deadline_misses,
            min_fill_nanos: (min_raw != u64::MAX).then_some(min_raw),
            max_fill_nanos: (max_raw != 0).then_some(max_raw),
            ema_fill_nanos,
            deadline_nanos,
            avg_load_percent,
            timestamp: Instant::now(),
        }
    }

    pub fn reset_all(&self) {
        self.fills.store(0, Ordering::Relaxed);
        self.deadline_misses.store(0, Ordering::Relaxed);
        self.min_fill_nanos.store(u64::MAX, Ordering::Relaxed);
        self.max_fill_nanos.store(0, Ordering::Relaxed);
        self.ema_fill_bits.store(0, Ordering::Relaxed);
    }
}

/// Records refill latency on drop. Atomics only.
pub struct FillGuard<'a> {
    monitor: &'a DeadlineMonitor,
    start: QuantaInstant,
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.monitor.clock.now().saturating_duration_since(self.start);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.monitor.record_fill_duration_nanos(nanos);
    }
}
