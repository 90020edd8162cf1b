//! Error types for the recording layer

use thiserror::Error;

/// Result type for recording operations
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors that can occur while building, converting or storing recordings
#[derive(Error, Debug)]
pub enum RecordError {
    /// Spike times of a train are not non-decreasing, or fall outside the train window
    #[error("Invalid spike times for neuron {neuron}: {reason}")]
    InvalidSpikeTimes {
        /// Neuron owning the train
        neuron: u32,
        /// What was wrong with the times
        reason: String,
    },

    /// Requested run index does not exist in the block
    #[error("Run {run} requested but only {available} runs are recorded")]
    RunOutOfRange {
        /// Requested run index
        run: usize,
        /// Number of segments in the block
        available: usize,
    },

    /// A conversion was asked for every signal at once
    #[error("Cannot convert \"all\" in one call: each signal has its own column layout")]
    AmbiguousSignal,

    /// The segment has no signal of the requested name
    #[error("Segment {segment} has no signal named {name:?}")]
    MissingSignal {
        /// Segment index
        segment: usize,
        /// Signal name
        name: String,
    },

    /// Unknown signal name
    #[error("Unknown signal name {0:?}")]
    UnknownSignal(String),

    /// Two arrays that must line up do not
    #[error("Shape mismatch: {reason}")]
    ShapeMismatch {
        /// Description of the mismatch
        reason: String,
    },

    /// Invalid magic number in binary format
    #[error("Invalid magic number: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Expected magic number
        expected: [u8; 4],
        /// Found magic number
        found: [u8; 4],
    },

    /// Unsupported version
    #[error("Unsupported version: {version}, supported: {supported}")]
    UnsupportedVersion {
        /// Version found
        version: u32,
        /// Supported version
        supported: u32,
    },

    /// Checksum verification failed
    #[error("Checksum verification failed: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Invalid file format or corrupted data
    #[error("Invalid format: {reason}")]
    InvalidFormat {
        /// Reason for invalid format
        reason: String,
    },

    /// Payload encoding or decoding failed
    #[error("Codec error: {source}")]
    Codec {
        #[from]
        /// Source codec error
        source: bincode::Error,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },
}

impl RecordError {
    /// Create an invalid spike times error
    pub fn invalid_spike_times(neuron: u32, reason: impl Into<String>) -> Self {
        Self::InvalidSpikeTimes {
            neuron,
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            reason: reason.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }
}
