use cpal::traits::{DeviceTrait, HostTrait};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub id: cpal::HostId,
    pub name: String,
    pub is_available: bool,
    pub is_default: bool,
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, if self.is_default { "default" } else { "available" })
    }
}

/// One supported output configuration range as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRange {
    pub channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub sample_format: cpal::SampleFormat,
}

impl OutputRange {
    pub fn contains_rate(&self, rate: u32) -> bool {
        rate >= self.min_sample_rate && rate <= self.max_sample_rate
    }
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host_id: cpal::HostId,
    pub is_default: bool,

    pub ranges: Vec<OutputRange>,
    pub supported_sample_rates: Vec<u32>,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub default_sample_rate: u32,

    pub supported_channels: Vec<u16>,
    pub max_channels: u16,
    pub default_channels: u16,

    pub supported_sample_formats: Vec<cpal::SampleFormat>,
    pub default_sample_format: cpal::SampleFormat,

    pub(crate) device_index: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}ch @ {}Hz{}]",
            self.name,
            self.default_channels,
            self.default_sample_rate,
            if self.is_default { " (default)" } else { "" }
        )
    }
}

pub type EnumResult<T> = Result<T, EnumError>;

#[derive(Debug)]
pub enum EnumError {
    NoDevicesFound,
    QueryFailed(String),
    InvalidDeviceIndex(usize),
}

impl fmt::Display for EnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevicesFound => write!(f, "No audio output devices found"),
            Self::QueryFailed(msg) => write!(f, "Device query failed: {}", msg),
            Self::InvalidDeviceIndex(idx) => write!(f, "Invalid device index: {}", idx),
        }
    }
}

impl std::error::Error for EnumError {}

/// Output devices across every host cpal can reach on this platform.
pub struct DeviceEnumerator {
    hosts: Vec<HostInfo>,
    devices: Vec<(cpal::Device, DeviceInfo)>,
}

impl DeviceEnumerator {
    pub fn new() -> EnumResult<Self> {
        let hosts = Self::enumerate_hosts();
        let devices = Self::scan_output_devices(&hosts)?;

        log::debug!("found {} output device(s) on {} host(s)", devices.len(), hosts.len());
        Ok(Self { hosts, devices })
    }

    pub fn enumerate_hosts() -> Vec<HostInfo> {
        let default_host_id = cpal::default_host().id();

        cpal::available_hosts()
            .into_iter()
            .map(|host_id| HostInfo {
                id: host_id,
                name: host_id.name().to_string(),
                is_available: cpal::host_from_id(host_id).is_ok(),
                is_default: host_id == default_host_id,
            })
            .collect()
    }

    fn scan_output_devices(hosts: &[HostInfo]) -> EnumResult<Vec<(cpal::Device, DeviceInfo)>> {
        let mut all_devices = Vec::new();
        let mut device_index = 0;

        for host_info in hosts {
            if !host_info.is_available {
                continue;
            }

            let host = match cpal::host_from_id(host_info.id) {
                Ok(h) => h,
                Err(_) => continue,
            };

            let default_name = host.default_output_device().and_then(|d| d.name().ok());

            let devices = match host.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    log::warn!("{}: cannot list output devices: {}", host_info.name, e);
                    continue;
                }
            };

            for device in devices {
                let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
                let is_default = default_name.as_deref() == Some(device_name.as_str());

                match Self::query_device_info(&device, host_info.id, is_default, device_index) {
                    Ok(info) => {
                        all_devices.push((device, info));
                        device_index += 1;
                    }
                    Err(e) => log::debug!("skipping {}: {}", device_name, e),
                }
            }
        }

        if all_devices.is_empty() {
            return Err(EnumError::NoDevicesFound);
        }

        Ok(all_devices)
    }

    fn query_device_info(
        device: &cpal::Device,
        host_id: cpal::HostId,
        is_default: bool,
        device_index: usize,
    ) -> EnumResult<DeviceInfo> {
        let name = device.name()
            .map_err(|e| EnumError::QueryFailed(format!("Failed to get device name: {}", e)))?;

        let default_config = device.default_output_config()
            .map_err(|e| EnumError::QueryFailed(format!("Failed to get default config: {}", e)))?;

        let configs = device.supported_output_configs()
            .map_err(|e| EnumError::QueryFailed(format!("Failed to get supported configs: {}", e)))?;

        let ranges: Vec<OutputRange> = configs
            .map(|range| OutputRange {
                channels: range.channels(),
                min_sample_rate: range.min_sample_rate().0,
                max_sample_rate: range.max_sample_rate().0,
                sample_format: range.sample_format(),
            })
            .collect();

        Ok(Self::summarize(
            name,
            host_id,
            is_default,
            device_index,
            ranges,
            (
                default_config.sample_rate().0,
                default_config.channels(),
                default_config.sample_format(),
            ),
        ))
    }

    /// Fold the raw ranges into the summary fields of a [`DeviceInfo`].
    pub(crate) fn summarize(
        name: String,
        host_id: cpal::HostId,
        is_default: bool,
        device_index: usize,
        ranges: Vec<OutputRange>,
        (default_sample_rate, default_channels, default_sample_format): (u32, u16, cpal::SampleFormat),
    ) -> DeviceInfo {
        let mut sample_rates = Vec::new();
        let mut min_sample_rate = u32::MAX;
        let mut max_sample_rate = 0u32;
        let mut supported_channels = Vec::new();
        let mut max_channels = 0u16;
        let mut sample_formats = Vec::new();

        for range in &ranges {
            min_sample_rate = min_sample_rate.min(range.min_sample_rate);
            max_sample_rate = max_sample_rate.max(range.max_sample_rate);

            // Common sample rates within this range
            for &rate in &[8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000] {
                if range.contains_rate(rate) {
                    sample_rates.push(rate);
                }
            }

            if !supported_channels.contains(&range.channels) {
                supported_channels.push(range.channels);
            }
            max_channels = max_channels.max(range.channels);

            if !sample_formats.contains(&range.sample_format) {
                sample_formats.push(range.sample_format);
            }
        }

        sample_rates.sort_unstable();
        sample_rates.dedup();
        supported_channels.sort_unstable();

        if ranges.is_empty() {
            min_sample_rate = default_sample_rate;
            max_sample_rate = default_sample_rate;
        }

        DeviceInfo {
            name,
            host_id,
            is_default,
            ranges,
            supported_sample_rates: sample_rates,
            min_sample_rate,
            max_sample_rate,
            default_sample_rate,
            supported_channels,
            max_channels,
            default_channels,
            supported_sample_formats: sample_formats,
            default_sample_format,
            device_index,
        }
    }

    pub fn available_hosts(&self) -> Vec<&HostInfo> {
        self.hosts.iter().filter(|h| h.is_available).collect()
    }

    /// Get all discovered output devices
    pub fn output_devices(&self) -> Vec<&DeviceInfo> {
        self.devices.iter().map(|(_, info)| info).collect()
    }

    /// The default output device of the default host, else any default output.
    pub fn default_output_device(&self) -> EnumResult<&DeviceInfo> {
        let default_host = self.hosts.iter().find(|h| h.is_default).map(|h| h.id);

        self.devices
            .iter()
            .map(|(_, info)| info)
            .filter(|info| info.is_default)
            .max_by_key(|info| Some(info.host_id) == default_host)
            .ok_or(EnumError::NoDevicesFound)
    }

    /// Select a device and return the actual CPAL device handle
    pub fn select_device(&self, device_info: &DeviceInfo) -> EnumResult<&cpal::Device> {
        self.devices
            .iter()
            .find(|(_, info)| info.device_index == device_info.device_index)
            .map(|(device, _)| device)
            .ok_or(EnumError::InvalidDeviceIndex(device_info.device_index))
    }

    /// Log a formatted list of all output devices
    pub fn log_device_list(&self) {
        for host in self.available_hosts() {
            log::info!("audio host: {}", host);
        }
        for (idx, device) in self.output_devices().iter().enumerate() {
            log::info!(
                "  [{}] {} - {}..{} Hz, channels {:?}, formats {:?}",
                idx,
                device,
                device.min_sample_rate,
                device.max_sample_rate,
                device.supported_channels,
                device.supported_sample_formats,
            );
        }
    }
}
