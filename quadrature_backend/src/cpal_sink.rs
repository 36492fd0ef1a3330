//! [`StreamingSink`] over a `cpal` output stream.
//!
//! The device callback drains the double buffer through a [`Transport`] and
//! converts each `i16` scalar to whatever sample type the device negotiated.
//! Refills run inside the callback, timed by a [`DeadlineMonitor`]. Stream
//! errors are forwarded to the control thread over a bounded channel.

use std::fmt;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam::channel::{self, Receiver, Sender};
use dasp::sample::{FromSample, Sample};

use quadrature_core::config::fill_deadline;
use quadrature_core::{
    DoubleBuffer, SinkError, SinkResult, StreamFormat, StreamingSink, TransferHandler, TransferStatus,
    Transport,
};

use crate::audio_device::{
    ConfigNegotiator, ConfigurationRequest, DeviceEnumerator, DeviceInfo, EnumError, NegotiatedConfig,
    NegotiationError, SampleRatePriority,
};
use crate::rt_processing::{DeadlineMonitor, DeadlineSnapshot, HandlerSlot};

const FAULT_CAPACITY: usize = 16;
const DEADLINE_EMA_ALPHA: f64 = 0.1;

/// Asynchronous failure reported by the device while streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    DeviceLost,
    Backend(String),
}

impl From<cpal::StreamError> for StreamFault {
    fn from(err: cpal::StreamError) -> Self {
        match err {
            cpal::StreamError::DeviceNotAvailable => Self::DeviceLost,
            other => Self::Backend(other.to_string()),
        }
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceLost => write!(f, "Output device is no longer available"),
            Self::Backend(msg) => write!(f, "Stream error: {}", msg),
        }
    }
}

impl std::error::Error for StreamFault {}

impl From<EnumError> for SinkError {
    fn from(err: EnumError) -> Self {
        SinkError::Device(err.to_string())
    }
}

impl From<NegotiationError> for SinkError {
    fn from(err: NegotiationError) -> Self {
        SinkError::UnsupportedFormat(err.to_string())
    }
}

/// Point-in-time view of the running stream, for the supervision loop.
#[derive(Debug, Clone)]
pub struct SinkDiagnostics {
    pub deadline: DeadlineSnapshot,
    pub half_events: u64,
    pub full_events: u64,
    pub overruns: u64,
    pub contended: u64,
}

impl SinkDiagnostics {
    /// Deadline misses, overruns and contended dispatches since `earlier`.
    pub fn new_faults_since(&self, earlier: &SinkDiagnostics) -> u64 {
        self.deadline.deadline_misses.saturating_sub(earlier.deadline.deadline_misses)
            + self.overruns.saturating_sub(earlier.overruns)
            + self.contended.saturating_sub(earlier.contended)
    }
}

impl fmt::Display for SinkDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events {}/{}, fills {}, misses {}, max {}ns, load {:.1}%, overruns {}, contended {}",
            self.half_events,
            self.full_events,
            self.deadline.fills,
            self.deadline.deadline_misses,
            self.deadline.max_fill_nanos.unwrap_or(0),
            self.deadline.avg_load_percent,
            self.overruns,
            self.contended,
        )
    }
}

pub struct CpalSink {
    device: cpal::Device,
    device_info: DeviceInfo,
    sample_rate_priority: SampleRatePriority,

    format: Option<StreamFormat>,
    negotiated: Option<NegotiatedConfig>,
    monitor: Option<Arc<DeadlineMonitor>>,
    slot: Option<HandlerSlot>,
    stream: Option<cpal::Stream>,

    status: Arc<TransferStatus>,
    faults_tx: Sender<StreamFault>,
    faults_rx: Receiver<StreamFault>,
}

impl CpalSink {
    /// Open the default output device of the default host.
    pub fn open_default() -> Result<Self, EnumError> {
        let enumerator = DeviceEnumerator::new()?;
        enumerator.log_device_list();
        let info = enumerator.default_output_device()?;
        Self::open(&enumerator, info)
    }

    fn open(enumerator: &DeviceEnumerator, info: &DeviceInfo) -> Result<Self, EnumError> {
        let device = enumerator.select_device(info)?.clone();
        let (faults_tx, faults_rx) = channel::bounded(FAULT_CAPACITY);
        log::info!("output device: {}", info);

        Ok(Self {
            device,
            device_info: info.clone(),
            sample_rate_priority: SampleRatePriority::Closest,
            format: None,
            negotiated: None,
            monitor: None,
            slot: None,
            stream: None,
            status: Arc::new(TransferStatus::new()),
            faults_tx,
            faults_rx,
        })
    }

    pub fn with_sample_rate_priority(mut self, priority: SampleRatePriority) -> Self {
        self.sample_rate_priority = priority;
        self
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn negotiated(&self) -> Option<&NegotiatedConfig> {
        self.negotiated.as_ref()
    }

    /// Stream faults raised on the device thread.
    pub fn faults(&self) -> Receiver<StreamFault> {
        self.faults_rx.clone()
    }

    pub fn monitor(&self) -> Option<Arc<DeadlineMonitor>> {
        self.monitor.clone()
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// `None` until the sink has been configured.
    pub fn diagnostics(&self, reset_peaks: bool) -> Option<SinkDiagnostics> {
        let monitor = self.monitor.as_ref()?;
        Some(SinkDiagnostics {
            deadline: monitor.snapshot(reset_peaks),
            half_events: self.status.half_raised(),
            full_events: self.status.full_raised(),
            overruns: self.status.overruns(),
            contended: self.slot.as_ref().map_or(0, HandlerSlot::contended),
        })
    }

    fn build_stream<T>(
        &self,
        config: &cpal::StreamConfig,
        mut transport: Transport,
        slot: HandlerSlot,
        monitor: Arc<DeadlineMonitor>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: cpal::SizedSample + FromSample<i16> + Send + 'static,
    {
        let faults = self.faults_tx.clone();

        self.device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                transport.drain_map(data, |s| s.to_sample::<T>(), |status, buffer| {
                    let _guard = monitor.scoped_fill();
                    slot.dispatch(status, buffer);
                });
            },
            move |err| {
                // Full channel: the control thread already has faults to handle.
                let _ = faults.try_send(StreamFault::from(err));
            },
            None,
        )
    }
}

impl StreamingSink for CpalSink {
    fn configure(&mut self, format: StreamFormat) -> SinkResult<()> {
        if self.stream.is_some() {
            return Err(SinkError::AlreadyRunning);
        }
        format.validate()?;

        let request = ConfigurationRequest::for_stream(&format)
            .with_sample_rate_priority(self.sample_rate_priority);
        let negotiated = ConfigNegotiator::negotiate(&self.device_info, &request)?;

        if !negotiated.sample_rate_matched {
            log::warn!(
                "device runs at {} Hz instead of {} Hz; tone frequency scales by {:.5}",
                negotiated.sample_rate,
                negotiated.requested_sample_rate,
                negotiated.rate_ratio()
            );
        }
        if !negotiated.format_matched {
            log::info!("converting i16 samples to {:?}", negotiated.sample_format);
        }

        let deadline = fill_deadline(format.half_frames, negotiated.sample_rate)?;
        log::info!(
            "negotiated {} (refill deadline {:.1} us)",
            negotiated,
            deadline.as_secs_f64() * 1e6
        );

        self.monitor = Some(Arc::new(DeadlineMonitor::new(deadline, DEADLINE_EMA_ALPHA)));
        self.negotiated = Some(negotiated);
        self.format = Some(format);
        Ok(())
    }

    fn start(&mut self, handler: Box<dyn TransferHandler>) -> SinkResult<()> {
        if self.stream.is_some() {
            return Err(SinkError::AlreadyRunning);
        }
        let (Some(format), Some(negotiated), Some(monitor)) =
            (self.format, self.negotiated.as_ref(), self.monitor.clone())
        else {
            return Err(SinkError::NotConfigured);
        };

        let transport = Transport::new(DoubleBuffer::new(format.half_frames), self.status.clone());
        let slot = HandlerSlot::new(handler);
        let config = negotiated.stream_config.clone();

        let stream = match negotiated.sample_format {
            cpal::SampleFormat::I16 => self.build_stream::<i16>(&config, transport, slot.clone(), monitor),
            cpal::SampleFormat::F32 => self.build_stream::<f32>(&config, transport, slot.clone(), monitor),
            cpal::SampleFormat::I32 => self.build_stream::<i32>(&config, transport, slot.clone(), monitor),
            cpal::SampleFormat::U16 => self.build_stream::<u16>(&config, transport, slot.clone(), monitor),
            other => return Err(SinkError::UnsupportedFormat(format!("{other:?}"))),
        }
        .map_err(|e| SinkError::Device(e.to_string()))?;

        stream.play().map_err(|e| SinkError::Device(e.to_string()))?;
        log::info!("streaming {}", format);

        self.slot = Some(slot);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> SinkResult<()> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| SinkError::Device(e.to_string()))?;
            log::info!("stream stopped");
        }
        Ok(())
    }

    fn status(&self) -> Arc<TransferStatus> {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_fault_from_cpal() {
        assert_eq!(
            StreamFault::from(cpal::StreamError::DeviceNotAvailable),
            StreamFault::DeviceLost
        );

        let backend = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError { description: "xrun".to_string() },
        };
        assert!(matches!(StreamFault::from(backend), StreamFault::Backend(msg) if msg.contains("xrun")));
    }

    #[test]
    fn test_errors_map_into_sink_error() {
        assert!(matches!(SinkError::from(EnumError::NoDevicesFound), SinkError::Device(_)));
        assert!(matches!(
            SinkError::from(NegotiationError::NoCompatibleConfiguration),
            SinkError::UnsupportedFormat(_)
        ));
    }

    fn diagnostics(misses: u64, overruns: u64, contended: u64) -> SinkDiagnostics {
        let monitor = DeadlineMonitor::new(std::time::Duration::from_nanos(1), 0.1);
        for _ in 0..misses {
            monitor.record_fill_duration_nanos(2);
        }
        SinkDiagnostics {
            deadline: monitor.snapshot(false),
            half_events: 0,
            full_events: 0,
            overruns,
            contended,
        }
    }

    #[test]
    fn test_new_faults_counted_between_reports() {
        let first = diagnostics(1, 0, 0);
        let quiet = diagnostics(1, 0, 0);
        let noisy = diagnostics(3, 1, 1);

        assert_eq!(first.new_faults_since(&diagnostics(0, 0, 0)), 1);
        assert_eq!(quiet.new_faults_since(&first), 0);
        assert_eq!(noisy.new_faults_since(&quiet), 4);
    }

    #[test]
    fn test_i16_converts_for_every_device_format() {
        assert_eq!(i16::MAX.to_sample::<i16>(), i16::MAX);
        assert!((i16::MAX.to_sample::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(0i16.to_sample::<f32>(), 0.0);
        assert_eq!(0i16.to_sample::<u16>(), 32_768);
        assert_eq!(i16::MIN.to_sample::<i32>(), i32::MIN);
    }
}
