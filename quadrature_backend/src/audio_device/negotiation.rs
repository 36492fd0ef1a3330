use crate::audio_device::enumeration::{DeviceInfo, OutputRange};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use quadrature_core::StreamFormat;
use std::fmt;

/// Device formats the sink can convert its `i16` stream into, best first.
pub const CONVERTIBLE_FORMATS: [SampleFormat; 4] =
    [SampleFormat::I16, SampleFormat::F32, SampleFormat::I32, SampleFormat::U16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRatePriority {
    /// Fail unless the device runs at the requested rate.
    Exact,
    /// Fall back to the nearest rate the device offers. The tone scales with it.
    Closest,
}

#[derive(Debug, Clone)]
pub struct ConfigurationRequest {
    pub sample_rate: u32,
    pub sample_rate_priority: SampleRatePriority,

    pub channels: u16,

    /// Frames per device callback; `None` leaves it to the host.
    pub buffer_size: Option<u32>,

    pub sample_format: SampleFormat,
    pub allow_format_conversion: bool,
}

impl ConfigurationRequest {
    pub fn for_stream(format: &StreamFormat) -> Self {
        Self {
            sample_rate: format.sample_rate,
            sample_rate_priority: SampleRatePriority::Closest,
            channels: format.channels,
            buffer_size: None,
            sample_format: SampleFormat::I16,
            allow_format_conversion: true,
        }
    }

    pub fn with_sample_rate_priority(mut self, priority: SampleRatePriority) -> Self {
        self.sample_rate_priority = priority;
        self
    }

    pub fn with_buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn allow_format_conversion(mut self, allow: bool) -> Self {
        self.allow_format_conversion = allow;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NegotiatedConfig {
    pub sample_rate: u32,
    pub requested_sample_rate: u32,
    pub channels: u16,
    pub buffer_size: BufferSize,
    pub sample_format: SampleFormat,
    pub stream_config: StreamConfig,

    pub sample_rate_matched: bool,
    pub format_matched: bool,
}

impl NegotiatedConfig {
    /// Factor by which every generated frequency is scaled when the device
    /// runs at a different rate than the tuning word was computed for.
    pub fn rate_ratio(&self) -> f64 {
        f64::from(self.sample_rate) / f64::from(self.requested_sample_rate)
    }
}

impl fmt::Display for NegotiatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch @ {}Hz, buffer: {:?}, format: {:?}",
            self.channels,
            self.sample_rate,
            self.buffer_size,
            self.sample_format
        )
    }
}

#[derive(Debug, Clone)]
pub enum NegotiationError {
    SampleRateNotSupported { requested: u32, available: Vec<(u32, u32)> },
    ChannelsNotSupported { requested: u16, available: Vec<u16> },
    FormatNotSupported { requested: SampleFormat, available: Vec<SampleFormat> },
    NoCompatibleConfiguration,
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleRateNotSupported { requested, available } => {
                write!(f, "Sample rate {} not supported. Available ranges: {:?}", requested, available)
            }
            Self::ChannelsNotSupported { requested, available } => {
                write!(f, "Channel count {} not supported. Available: {:?}", requested, available)
            }
            Self::FormatNotSupported { requested, available } => {
                write!(f, "Sample format {:?} not supported. Available: {:?}", requested, available)
            }
            Self::NoCompatibleConfiguration => {
                write!(f, "No compatible configuration found for device")
            }
        }
    }
}

impl std::error::Error for NegotiationError {}

pub type NegotiationResult<T> = Result<T, NegotiationError>;

pub struct ConfigNegotiator;
impl ConfigNegotiator {
    pub fn negotiate(
        device_info: &DeviceInfo,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<NegotiatedConfig> {
        let candidates = Self::candidate_ranges(device_info, request)?;
        let sample_rate = Self::negotiate_sample_rate(&candidates, request)?;
        let sample_format = Self::negotiate_sample_format(&candidates, sample_rate, request)?;
        let buffer_size = request.buffer_size.map_or(BufferSize::Default, BufferSize::Fixed);

        let stream_config = StreamConfig {
            channels: request.channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: buffer_size.clone(),
        };

        Ok(NegotiatedConfig {
            sample_rate,
            requested_sample_rate: request.sample_rate,
            channels: request.channels,
            buffer_size,
            sample_format,
            stream_config,
            sample_rate_matched: sample_rate == request.sample_rate,
            format_matched: sample_format == request.sample_format,
        })
    }

    /// Ranges with the requested channel count in a format we can produce.
    fn candidate_ranges(
        device_info: &DeviceInfo,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<Vec<OutputRange>> {
        let with_channels: Vec<OutputRange> = device_info.ranges
            .iter()
            .filter(|range| range.channels == request.channels)
            .copied()
            .collect();

        if with_channels.is_empty() {
            return Err(NegotiationError::ChannelsNotSupported {
                requested: request.channels,
                available: device_info.supported_channels.clone(),
            });
        }

        let usable: Vec<OutputRange> = with_channels
            .iter()
            .filter(|range| Self::is_format_usable(range.sample_format, request))
            .copied()
            .collect();

        if usable.is_empty() {
            return Err(NegotiationError::FormatNotSupported {
                requested: request.sample_format,
                available: with_channels.iter().map(|range| range.sample_format).collect(),
            });
        }

        Ok(usable)
    }

    fn is_format_usable(format: SampleFormat, request: &ConfigurationRequest) -> bool {
        format == request.sample_format
            || (request.allow_format_conversion && CONVERTIBLE_FORMATS.contains(&format))
    }

    fn negotiate_sample_rate(
        candidates: &[OutputRange],
        request: &ConfigurationRequest,
    ) -> NegotiationResult<u32> {
        let requested = request.sample_rate;
        if candidates.iter().any(|range| range.contains_rate(requested)) {
            return Ok(requested);
        }

        match request.sample_rate_priority {
            SampleRatePriority::Exact => Err(NegotiationError::SampleRateNotSupported {
                requested,
                available: candidates
                    .iter()
                    .map(|range| (range.min_sample_rate, range.max_sample_rate))
                    .collect(),
            }),
            SampleRatePriority::Closest => Self::find_closest_sample_rate(candidates, requested)
                .ok_or(NegotiationError::NoCompatibleConfiguration),
        }
    }

    pub fn find_closest_sample_rate(ranges: &[OutputRange], target: u32) -> Option<u32> {
        ranges
            .iter()
            .map(|range| target.clamp(range.min_sample_rate, range.max_sample_rate))
            .min_by_key(|&rate| (i64::from(rate) - i64::from(target)).abs())
    }

    fn negotiate_sample_format(
        candidates: &[OutputRange],
        sample_rate: u32,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<SampleFormat> {
        let at_rate: Vec<SampleFormat> = candidates
            .iter()
            .filter(|range| range.contains_rate(sample_rate))
            .map(|range| range.sample_format)
            .collect();

        if at_rate.contains(&request.sample_format) {
            return Ok(request.sample_format);
        }

        CONVERTIBLE_FORMATS
            .iter()
            .copied()
            .find(|format| at_rate.contains(format))
            .ok_or(NegotiationError::NoCompatibleConfiguration)
    }
}
