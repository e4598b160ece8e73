//! Error taxonomy and the command acknowledgement type.
//!
//! Validation problems surface to callers as `Ack { success: false }`;
//! hardware failures fail the affected write only and engines retry on the
//! next tick.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for rig operations.
pub type RigResult<T> = Result<T, RigError>;

/// All error kinds produced by the core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RigError {
    /// A servo, timeline, track, marker or pose was not found.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What was looked up ("servo", "timeline", ...).
        kind: &'static str,
        /// The identifier that missed.
        name: String,
    },

    /// An id, alias, channel or track name is already taken.
    #[error("{kind} '{name}' already exists")]
    Duplicate {
        /// What collided ("servo id", "alias", "channel", "track").
        kind: &'static str,
        /// The colliding value.
        name: String,
    },

    /// A numeric input is outside its permitted interval.
    #[error("{what} {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// What was out of range.
        what: &'static str,
        /// The offending value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// Operation not valid in the current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// I²C or device-level write failure.
    #[error("hardware failure: {0}")]
    Hardware(String),

    /// Watchdog timeout or a limit breach caught late.
    #[error("safety violation: {0}")]
    SafetyViolation(String),
}

/// Uniform write-verb response: `{success, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the verb took effect.
    pub success: bool,
    /// Human-readable reason when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// Successful acknowledgement.
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Failed acknowledgement with a reason.
    pub fn err(reason: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(reason.to_string()),
        }
    }
}

impl From<RigResult<()>> for Ack {
    fn from(result: RigResult<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::err(e),
        }
    }
}
