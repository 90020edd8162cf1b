//! Error types for the simulation runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures that indicate contention or flaky infrastructure rather than a logic defect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransientFailure {
    /// The run did not finish within its wall-clock budget
    #[error("simulation timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout {
        /// Wall-clock time spent (ms)
        elapsed_ms: u64,
        /// Allowed wall-clock time (ms)
        budget_ms: u64,
    },

    /// The machine allocation backing the run went away
    #[error("machine job destroyed: {0}")]
    JobDestroyed(String),

    /// Communication with the machine failed
    #[error("communication failure: {0}")]
    Communication(String),
}

/// Errors that can occur in the simulation runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Recording layer error
    #[error("Record error: {source}")]
    Record {
        #[from]
        /// Source record error
        source: spyn_record::RecordError,
    },

    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Invalid network configuration
    #[error("Invalid network configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Operation not allowed in the simulator's current lifecycle state
    #[error("Invalid simulator state: {reason}")]
    InvalidState {
        /// Reason the call was refused
        reason: String,
    },

    /// Population or projection handle not known to this simulator
    #[error("Unknown {kind} {id}")]
    UnknownHandle {
        /// Handle kind
        kind: &'static str,
        /// Handle index
        id: usize,
    },

    /// Requested combination of options is not supported
    #[error("Not implemented: {reason}")]
    NotImplemented {
        /// Description of the unsupported combination
        reason: String,
    },

    /// A failure worth retrying or skipping
    #[error("Transient failure: {0}")]
    Transient(#[from] TransientFailure),
}

impl RuntimeError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create a not implemented error
    pub fn not_implemented(reason: impl Into<String>) -> Self {
        Self::NotImplemented {
            reason: reason.into(),
        }
    }

    /// The transient failure carried by this error, if any
    pub fn transient(&self) -> Option<&TransientFailure> {
        match self {
            Self::Transient(failure) => Some(failure),
            _ => None,
        }
    }

    /// True for failures worth retrying
    pub fn is_transient(&self) -> bool {
        self.transient().is_some()
    }
}
