//! Error types for loudness measurement.
//!
//! This module defines all error types that can occur during meter
//! construction, reconfiguration, frame processing and measurement queries.

use thiserror::Error;

/// Main error type for loudness measurement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeterError {
    /// Invalid sample rate provided.
    #[error("Invalid sample rate: {rate} Hz (must be >= 8000 Hz)")]
    InvalidSampleRate {
        /// The invalid sample rate value.
        rate: u32,
    },

    /// Invalid channel count.
    #[error("Invalid channel count: {count} (must be between 1 and 64)")]
    InvalidChannelCount {
        /// The invalid channel count value.
        count: u32,
    },

    /// A measurement was queried whose enabling mode bit was not set at
    /// construction.
    #[error("Measurement '{measurement}' requires a mode bit that was not set")]
    InvalidMode {
        /// The measurement that was queried.
        measurement: &'static str,
    },

    /// A channel index at or beyond the configured channel count.
    #[error("Invalid channel index: {index} (meter has {channels} channels)")]
    InvalidChannelIndex {
        /// The out-of-range index.
        index: u32,
        /// The configured channel count.
        channels: u32,
    },

    /// Reconfiguration requested with parameters equal to the current ones.
    #[error("Parameters unchanged: sample rate and channel count already current")]
    NoChange,

    /// Loudness range requested across meters whose block storage strategies
    /// differ. Percentiles cannot be interpolated across a precise list and
    /// a histogram; build every merged meter with the same storage choice.
    #[error("Mixed block storage: loudness range requires all meters precise or all histogram")]
    MixedStorage,

    /// Heap allocation failed while growing the block history or building a
    /// temporary sort buffer.
    #[error("Out of memory while recording loudness blocks")]
    OutOfMemory,

    /// Interleaved buffer length is not a multiple of the channel count.
    #[error("Buffer size mismatch: {len} samples is not a multiple of {channels} channels")]
    BufferSizeMismatch {
        /// Length of the provided sample slice.
        len: usize,
        /// The configured channel count.
        channels: u32,
    },
}

/// Result type for loudness operations.
pub type Result<T> = std::result::Result<T, MeterError>;

impl MeterError {
    /// Create an invalid sample rate error.
    pub fn invalid_sample_rate(rate: u32) -> Self {
        MeterError::InvalidSampleRate { rate }
    }

    /// Create an invalid channel count error.
    pub fn invalid_channel_count(count: u32) -> Self {
        MeterError::InvalidChannelCount { count }
    }

    /// Create an invalid mode error for the named measurement.
    pub fn invalid_mode(measurement: &'static str) -> Self {
        MeterError::InvalidMode { measurement }
    }

    /// Create an invalid channel index error.
    pub fn invalid_channel_index(index: u32, channels: u32) -> Self {
        MeterError::InvalidChannelIndex { index, channels }
    }

    /// Create a buffer size mismatch error.
    pub fn buffer_size_mismatch(len: usize, channels: u32) -> Self {
        MeterError::BufferSizeMismatch { len, channels }
    }
}
