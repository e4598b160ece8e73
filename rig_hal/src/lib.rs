//! # Rig HAL
//!
//! Driver layer for the 16-channel PWM expander. The expander is the only
//! piece of hardware the rig talks to; everything above this crate works in
//! logical angles and never touches the I²C bus directly.
//!
//! # Architecture
//!
//! Backends implement the [`PwmDriver`] trait ([`Pca9685Driver`] for real
//! hardware, [`SimDriver`] for tests and dry runs). A single [`ServoBus`]
//! owns the active backend and serializes every write; it also owns the
//! angle to pulse-width mapping so calibration is applied in exactly one
//! place.

pub mod driver;
pub mod pca9685;
pub mod sim;

pub use driver::{HalError, PwmDriver, ServoBus};
pub use pca9685::Pca9685Driver;
pub use sim::{SimDriver, SimState};
