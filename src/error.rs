//! Error types for the round-trip harness.
//!
//! Failures are split by how far they propagate:
//!
//! - **`TransportError`**: what a [`ControlPlane`](crate::pv::ControlPlane) reports for a
//!   single read or write. `Unreachable` means the endpoint could not be reached at all;
//!   `Rejected` means the endpoint answered but refused the request.
//! - **`CaseFailure`**: a failure scoped to one data-type case. The matrix records it and
//!   moves on to the next type.
//! - **`HarnessError`**: fatal. Connectivity loss, bad configuration and I/O problems stop
//!   the whole run.
//!
//! `CycleError` joins the last two so the configuration applier and the acquisition driver
//! can use `?` on transport calls. `From<TransportError>` does the classification: an
//! unreachable endpoint is fatal, a rejection only fails the case.

use crate::config::ConfigError;
use crate::frame::ShapeMismatch;
use crate::oracle::Mismatch;
use crate::params::DataType;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the fatal error type.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Error reported by a control-plane transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection to the endpoint
    #[error("endpoint {pv} unreachable: {reason}")]
    Unreachable {
        /// Full endpoint name
        pv: String,
        /// Transport detail
        reason: String,
    },

    /// The endpoint refused the request
    #[error("endpoint {pv} rejected request: {reason}")]
    Rejected {
        /// Full endpoint name
        pv: String,
        /// Why the request was refused
        reason: String,
    },
}

impl TransportError {
    /// Name of the endpoint involved
    pub fn pv(&self) -> &str {
        match self {
            TransportError::Unreachable { pv, .. } | TransportError::Rejected { pv, .. } => pv,
        }
    }
}

/// Recoverable, per-case failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseFailure {
    /// A put-with-completion was not acknowledged in time
    #[error("no completion from {pv} within {timeout:?}")]
    AckTimeout {
        /// Endpoint that was written
        pv: String,
        /// Configured acknowledgement timeout
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },

    /// The detector never reported that it was acquiring
    #[error("detector did not leave idle within {timeout:?}")]
    ArmTimeout {
        /// Configured arm timeout
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },

    /// A write was rejected or a read returned the wrong kind of value
    #[error("protocol error on {pv}: {reason}")]
    Protocol {
        /// Endpoint involved
        pv: String,
        /// Detail from the endpoint
        reason: String,
    },

    /// The read-back array came back with a different element type
    #[error("read back {actual} elements, expected {expected}")]
    TypeMismatch {
        /// Type that was injected
        expected: DataType,
        /// Type that was read back
        actual: DataType,
    },

    /// Element count or geometry differs
    #[error("{0}")]
    Shape(ShapeMismatch),

    /// Same shape, different values
    #[error("{0}")]
    ValueMismatch(Mismatch),
}

impl CaseFailure {
    /// Stable category label used in reports
    pub fn category(&self) -> &'static str {
        match self {
            CaseFailure::AckTimeout { .. } => "ACK_TIMEOUT",
            CaseFailure::ArmTimeout { .. } => "ARM_TIMEOUT",
            CaseFailure::Protocol { .. } => "PROTOCOL",
            CaseFailure::TypeMismatch { .. } => "TYPE_MISMATCH",
            CaseFailure::Shape(_) => "SHAPE_MISMATCH",
            CaseFailure::ValueMismatch(_) => "VALUE_MISMATCH",
        }
    }
}

impl From<ShapeMismatch> for CaseFailure {
    fn from(err: ShapeMismatch) -> Self {
        CaseFailure::Shape(err)
    }
}

impl From<Mismatch> for CaseFailure {
    fn from(m: Mismatch) -> Self {
        CaseFailure::ValueMismatch(m)
    }
}

/// Fatal error that aborts the whole run
#[derive(Error, Debug)]
pub enum HarnessError {
    /// An endpoint could not be reached
    #[error("Connectivity error: {0}")]
    Connectivity(TransportError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The report could not be serialised
    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),

    /// The tracing subscriber could not be installed
    #[error("Logging initialization error: {0}")]
    Logging(String),
}

/// Outcome of a failed step inside one acquisition cycle
#[derive(Error, Debug)]
pub enum CycleError {
    /// Abort the run
    #[error(transparent)]
    Fatal(#[from] HarnessError),

    /// Fail this case only
    #[error(transparent)]
    Case(#[from] CaseFailure),
}

impl From<TransportError> for CycleError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unreachable { .. } => {
                CycleError::Fatal(HarnessError::Connectivity(err))
            }
            TransportError::Rejected { pv, reason } => {
                CycleError::Case(CaseFailure::Protocol { pv, reason })
            }
        }
    }
}

impl From<ShapeMismatch> for CycleError {
    fn from(err: ShapeMismatch) -> Self {
        CycleError::Case(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::Rejected {
            pv: "13NDSA1:cam1:DataType".into(),
            reason: "invalid code 9".into(),
        };
        assert_eq!(
            err.to_string(),
            "endpoint 13NDSA1:cam1:DataType rejected request: invalid code 9"
        );
    }

    #[test]
    fn test_unreachable_is_fatal() {
        let err = TransportError::Unreachable {
            pv: "13NDSA1:cam1:Acquire".into(),
            reason: "channel disconnected".into(),
        };
        match CycleError::from(err) {
            CycleError::Fatal(HarnessError::Connectivity(inner)) => {
                assert_eq!(inner.pv(), "13NDSA1:cam1:Acquire");
            }
            other => panic!("expected fatal connectivity error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejection_fails_case_only() {
        let err = TransportError::Rejected {
            pv: "13NDSA1:cam1:ArrayIn".into(),
            reason: "busy".into(),
        };
        match CycleError::from(err) {
            CycleError::Case(failure) => assert_eq!(failure.category(), "PROTOCOL"),
            other => panic!("expected case failure, got {other:?}"),
        }
    }

    #[test]
    fn test_case_failure_serializes_with_kind() {
        let failure = CaseFailure::ArmTimeout {
            timeout: Duration::from_millis(250),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "arm_timeout");
        assert_eq!(json["timeout"], "250ms");
        assert!(failure.to_string().contains("250ms"));
    }
}
