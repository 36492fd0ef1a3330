pub mod enumeration;
pub mod negotiation;

pub use enumeration::{DeviceEnumerator, DeviceInfo, EnumError, HostInfo, OutputRange};
pub use negotiation::{
    ConfigNegotiator, ConfigurationRequest, NegotiatedConfig, NegotiationError, SampleRatePriority,
};
