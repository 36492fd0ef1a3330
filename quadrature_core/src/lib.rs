//! Direct digital synthesis of a quadrature (cosine left, sine right) tone,
//! streamed through an event-driven double buffer.
//!
//! ```text
//!   Wavetable ─┐
//!              ├─> BufferFiller ─> StreamScheduler <── HalfComplete / FullComplete
//! PhaseAccumulator                       │                        ▲
//!                                        ▼                        │
//!                                  DoubleBuffer ──> Transport ─> StreamingSink
//! ```
//!
//! Everything here is device independent. A sink that drains to real audio
//! hardware lives in the backend crate.

pub mod buffer;
pub mod config;
pub mod error;
pub mod filler;
pub mod phase;
pub mod scheduler;
pub mod sink;
pub mod transport;
pub mod wavetable;

pub use buffer::{DoubleBuffer, Half};
pub use config::{FrequencyReport, ToneConfig};
pub use error::{ConfigError, ConfigResult, SinkError, SinkResult};
pub use filler::BufferFiller;
pub use phase::{PhaseAccumulator, actual_frequency, compute_tuning_word};
pub use scheduler::StreamScheduler;
pub use sink::{LoopbackSink, SampleFormat, StreamFormat, StreamingSink};
pub use transport::{TransferEvent, TransferHandler, TransferStatus, Transport};
pub use wavetable::Wavetable;
