//! The streaming sink contract and an in-process loopback implementation.

use std::fmt;
use std::sync::Arc;

use crate::buffer::{DoubleBuffer, STEREO};
use crate::config::ToneConfig;
use crate::error::{SinkError, SinkResult};
use crate::transport::{TransferHandler, TransferStatus, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    /// Stereo frames per buffer half.
    pub half_frames: usize,
}

impl StreamFormat {
    pub fn from_config(config: &ToneConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            sample_format: SampleFormat::Int16,
            half_frames: config.half_frames,
        }
    }

    pub fn validate(&self) -> SinkResult<()> {
        if self.sample_rate == 0 || usize::from(self.channels) != STEREO || self.half_frames == 0 {
            return Err(SinkError::UnsupportedFormat(format!("{self}")));
        }
        Ok(())
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch @ {}Hz, {:?}, {} frames per half",
            self.channels, self.sample_rate, self.sample_format, self.half_frames
        )
    }
}

/// Something that drains a double buffer at a fixed sample rate and reports
/// half/full completion to a registered [`TransferHandler`].
pub trait StreamingSink {
    /// Allocate the double buffer and prepare the output for `format`.
    fn configure(&mut self, format: StreamFormat) -> SinkResult<()>;

    /// Register `handler` and begin draining.
    fn start(&mut self, handler: Box<dyn TransferHandler>) -> SinkResult<()>;

    fn stop(&mut self) -> SinkResult<()>;

    fn status(&self) -> Arc<TransferStatus>;
}

/// Deterministic sink that drains into memory when pumped.
///
/// Useful wherever there is no device: tests, offline rendering. Events are
/// dispatched synchronously from [`pump`](Self::pump), so the single-active-
/// handler rule holds trivially.
pub struct LoopbackSink {
    format: Option<StreamFormat>,
    transport: Option<Transport>,
    handler: Option<Box<dyn TransferHandler>>,
    status: Arc<TransferStatus>,
    captured: Vec<i16>,
    running: bool,
}

impl LoopbackSink {
    pub fn new() -> Self {
        Self {
            format: None,
            transport: None,
            handler: None,
            status: Arc::new(TransferStatus::new()),
            captured: Vec::new(),
            running: false,
        }
    }

    /// Drain `scalars` samples into the capture. Returns how many were drained
    /// (zero when stopped).
    pub fn pump(&mut self, scalars: usize) -> usize {
        if !self.running {
            return 0;
        }
        let (Some(transport), Some(handler)) = (self.transport.as_mut(), self.handler.as_mut()) else {
            return 0;
        };

        let start = self.captured.len();
        self.captured.resize(start + scalars, 0);
        transport.drain(&mut self.captured[start..], |status, buffer| {
            handler.on_transfer(status, buffer);
        });
        scalars
    }

    /// Drain whole stereo frames.
    pub fn pump_frames(&mut self, frames: usize) -> usize {
        self.pump(frames * STEREO) / STEREO
    }

    pub fn captured(&self) -> &[i16] {
        &self.captured
    }

    pub fn take_captured(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.captured)
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn buffer(&self) -> Option<&DoubleBuffer> {
        self.transport.as_ref().map(Transport::buffer)
    }
}

impl Default for LoopbackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingSink for LoopbackSink {
    fn configure(&mut self, format: StreamFormat) -> SinkResult<()> {
        if self.running {
            return Err(SinkError::AlreadyRunning);
        }
        format.validate()?;

        self.transport = Some(Transport::new(DoubleBuffer::new(format.half_frames), self.status.clone()));
        self.format = Some(format);
        log::debug!("loopback sink configured: {format}");
        Ok(())
    }

    fn start(&mut self, handler: Box<dyn TransferHandler>) -> SinkResult<()> {
        if self.running {
            return Err(SinkError::AlreadyRunning);
        }
        if self.transport.is_none() {
            return Err(SinkError::NotConfigured);
        }
        self.handler = Some(handler);
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> SinkResult<()> {
        self.running = false;
        Ok(())
    }

    fn status(&self) -> Arc<TransferStatus> {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseAccumulator;
    use crate::scheduler::StreamScheduler;
    use crate::wavetable::Wavetable;

    fn started(config: &ToneConfig) -> LoopbackSink {
        let mut sink = LoopbackSink::new();
        sink.configure(StreamFormat::from_config(config)).unwrap();
        sink.start(Box::new(StreamScheduler::from_config(config).unwrap())).unwrap();
        sink
    }

    #[test]
    fn test_start_requires_configure() {
        let mut sink = LoopbackSink::new();
        let scheduler = StreamScheduler::from_config(&ToneConfig::default()).unwrap();

        assert_eq!(sink.start(Box::new(scheduler)), Err(SinkError::NotConfigured));
        assert_eq!(sink.pump(16), 0);
    }

    #[test]
    fn test_rejects_non_stereo() {
        let mut sink = LoopbackSink::new();
        let format = StreamFormat {
            channels: 1,
            ..StreamFormat::from_config(&ToneConfig::default())
        };

        assert!(matches!(sink.configure(format), Err(SinkError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_first_cycle_is_silent_then_continuous() {
        let config = ToneConfig::default();
        let mut sink = started(&config);
        let table = Wavetable::full_scale();
        let word = config.tuning_word().unwrap();

        // Odd chunk sizes so boundaries fall mid-chunk.
        for _ in 0..40 {
            sink.pump(37);
        }
        let captured = sink.captured();
        assert_eq!(captured.len(), 40 * 37);

        // The buffer starts zeroed; the tone appears once both halves have been refilled.
        assert!(captured[..128].iter().all(|&s| s == 0));

        let mut acc = PhaseAccumulator::new(word, table.index_bits());
        for (k, &sample) in captured[128..].iter().enumerate() {
            let expected = if k & 1 == 1 {
                table[acc.sine_index()]
            } else {
                table[acc.cosine_index()]
            };
            assert_eq!(sample, expected, "scalar {k} after the first cycle");
            acc.advance();
        }
    }

    #[test]
    fn test_events_balanced_without_overrun() {
        let config = ToneConfig::default();
        let mut sink = started(&config);
        let status = sink.status();

        assert_eq!(sink.pump_frames(64 * 100), 64 * 100);

        assert_eq!(status.half_raised(), 100);
        assert_eq!(status.full_raised(), 100);
        assert_eq!(status.overruns(), 0);
    }

    #[test]
    fn test_stop_halts_draining() {
        let config = ToneConfig::default();
        let mut sink = started(&config);

        sink.pump(100);
        sink.stop().unwrap();

        assert!(!sink.is_running());
        assert_eq!(sink.pump(100), 0);
        assert_eq!(sink.take_captured().len(), 100);
        assert!(sink.captured().is_empty());
    }
}
