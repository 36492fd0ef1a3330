//! Host audio backend for the quadrature tone generator.
//!
//! Finds an output device, negotiates a stereo stream for the requested
//! [`StreamFormat`](quadrature_core::StreamFormat) and runs the transfer
//! handler from the device callback.

pub mod audio_device;
pub mod cpal_sink;
pub mod rt_processing;

pub use cpal_sink::{CpalSink, SinkDiagnostics, StreamFault};
