//! Recording data model and validators for spiking network simulations
//!
//! This crate holds everything that works on *recorded* simulation output,
//! independently of the simulator that produced it:
//!
//! - [`neo`]: the block / segment / spike-train / analog-signal hierarchy
//! - [`convert`]: flattening recordings into fixed-column numeric arrays
//! - [`compare`]: structural and numeric equality of two recordings
//! - [`spike_checker`]: synfire-chain ordering checks over flat spike arrays
//! - [`legacy`]: the whitespace-delimited text dumps of older front ends
//! - [`block_file`]: a checksummed binary container for whole blocks

#![deny(missing_docs)]
#![warn(clippy::all)]

use core::fmt;
use serde::{Deserialize, Serialize};

/// Neuron identifier within a population (the `source_index` of a recording)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeuronId(pub u32);

impl NeuronId {
    /// Create a new neuron ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Core modules
pub mod error;
pub mod neo;

// Operations over recordings
pub mod compare;
pub mod convert;
pub mod spike_checker;

// File formats
pub mod block_file;
pub mod legacy;

// Re-export essential types
pub use compare::{ComparePolicy, Mismatch};
pub use error::{RecordError, Result};
pub use neo::{AnalogSignal, Block, Segment, SignalKind, SpikeTrain};
pub use spike_checker::{SpikeChecker, SpikeOrderError};

/// Record crate version for compatibility checking
pub const RECORD_VERSION: u32 = 1;

/// Magic numbers for binary formats
pub mod magic {
    /// Block container magic number: "NBLK"
    pub const NBLK: [u8; 4] = [0x4E, 0x42, 0x4C, 0x4B];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neuron_id() {
        let id = NeuronId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.to_string(), "42");
        assert!(NeuronId::new(1) < NeuronId::new(2));
    }

    #[test]
    fn test_magic_is_ascii() {
        assert_eq!(&magic::NBLK, b"NBLK");
    }
}
