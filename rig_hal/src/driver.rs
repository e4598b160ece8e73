//! `PwmDriver` trait and the single-authority `ServoBus`.
//!
//! The bus is the sole writer of pulse widths. Engines, safety recovery and
//! operator commands all funnel through one mutex here, so per-channel
//! writes are last-writer-wins with no interleaving inside a write.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use rig_common::servo::{CHANNEL_COUNT, Calibration, FULL_TRAVEL_DEG};

/// Error types for driver operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Device initialization failed.
    #[error("driver initialization failed: {0}")]
    InitFailed(String),

    /// Channel index outside the expander's range.
    #[error("channel {0} out of range (0-{max})", max = CHANNEL_COUNT - 1)]
    ChannelOutOfRange(u8),

    /// I²C bus communication error.
    #[error("i2c communication error: {0}")]
    I2c(String),
}

/// Interface for pluggable PWM expander backends.
///
/// # Lifecycle
///
/// 1. Construction opens the device.
/// 2. `set_pulse_us` / `detach` run for the life of the process.
/// 3. `shutdown` detaches every channel and releases the bus.
pub trait PwmDriver: Send {
    /// Backend identifier (e.g. `"pca9685"`, `"sim"`).
    fn name(&self) -> &'static str;

    /// Drive `channel` with a `pulse_us` microsecond high-time.
    fn set_pulse_us(&mut self, channel: u8, pulse_us: u16) -> Result<(), HalError>;

    /// Zero the duty cycle on `channel` (servo goes limp).
    fn detach(&mut self, channel: u8) -> Result<(), HalError>;

    /// Detach all channels and release the device.
    fn shutdown(&mut self) -> Result<(), HalError>;
}

/// Map a logical angle through a calibration to a pulse width.
///
/// Linear: `pulse = min_us + clamp(angle, 0, 180) / 180 * (max_us - min_us)`,
/// rounded to the nearest microsecond.
pub fn pulse_for_angle(angle_deg: f64, calibration: Calibration) -> u16 {
    let span = f64::from(calibration.max_pulse_us) - f64::from(calibration.min_pulse_us);
    let normalized = angle_deg.clamp(0.0, FULL_TRAVEL_DEG) / FULL_TRAVEL_DEG;
    (f64::from(calibration.min_pulse_us) + normalized * span).round() as u16
}

/// Single owner of the PWM expander.
///
/// Every caller serializes through the internal mutex; the bus is shared as
/// `Arc<ServoBus>` across the engines and the safety system.
pub struct ServoBus {
    driver: Mutex<Box<dyn PwmDriver>>,
    backend: &'static str,
}

impl ServoBus {
    /// Wrap a backend into the single write authority.
    pub fn new(driver: Box<dyn PwmDriver>) -> Self {
        let backend = driver.name();
        Self {
            driver: Mutex::new(driver),
            backend,
        }
    }

    /// Name of the active backend.
    #[inline]
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Drive `channel` to `angle_deg` through `calibration`.
    ///
    /// Returns the pulse width that was written.
    pub fn set_angle(
        &self,
        channel: u8,
        angle_deg: f64,
        calibration: Calibration,
    ) -> Result<u16, HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::ChannelOutOfRange(channel));
        }
        let pulse_us = pulse_for_angle(angle_deg, calibration);
        self.driver.lock().set_pulse_us(channel, pulse_us)?;
        debug!(channel, angle_deg, pulse_us, "pwm write");
        Ok(pulse_us)
    }

    /// Stop driving `channel`.
    pub fn detach(&self, channel: u8) -> Result<(), HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::ChannelOutOfRange(channel));
        }
        self.driver.lock().detach(channel)
    }

    /// Detach everything and release the device.
    pub fn shutdown(&self) -> Result<(), HalError> {
        self.driver.lock().shutdown()
    }
}
