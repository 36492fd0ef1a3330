use thiserror::Error;

/// Configuration-time failures. None of these can occur once streaming has started.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("wavetable size {0} must be a power of two between 4 and 65536")]
    InvalidTableSize(usize),

    #[error("sample rate and channel count must be non-zero (got {sample_rate} Hz, {channels} channels)")]
    ZeroRate { sample_rate: u32, channels: u16 },

    #[error("only stereo output is supported, got {0} channels")]
    UnsupportedChannelCount(u16),

    #[error("amplitude {0} must be positive")]
    InvalidAmplitude(i16),

    #[error("half buffer must hold at least one stereo frame")]
    EmptyHalfBuffer,

    #[error("tone frequency {frequency} Hz is at or above Nyquist for {sample_rate} Hz")]
    AboveNyquist { frequency: u32, sample_rate: u32 },

    #[error("tuning word for {frequency} Hz does not fit in 32 bits")]
    TuningWordOverflow { frequency: u32 },

    #[error("clock error fraction {0} must lie in [0, 1)")]
    InvalidClockError(f64),
}

/// Failures reported by a [`StreamingSink`](crate::sink::StreamingSink).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SinkError {
    #[error("sink has not been configured")]
    NotConfigured,

    #[error("sink is already running")]
    AlreadyRunning,

    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("device error: {0}")]
    Device(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type SinkResult<T> = Result<T, SinkError>;
