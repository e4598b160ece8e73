//! Simulation backend.
//!
//! Records the last pulse per channel instead of touching hardware. Used by
//! the test suite and by the daemon's `--simulation` mode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use rig_common::servo::CHANNEL_COUNT;

use crate::driver::{HalError, PwmDriver};

/// Shared observable state of a [`SimDriver`].
///
/// Keep a clone of the `Arc` before handing the driver to the bus; that is
/// how tests inspect what was written.
#[derive(Default)]
pub struct SimState {
    pulses: Mutex<[Option<u16>; CHANNEL_COUNT as usize]>,
    writes: AtomicU64,
    shutdown: AtomicBool,
}

impl SimState {
    /// Last pulse width written to `channel`, `None` when detached.
    pub fn last_pulse_us(&self, channel: u8) -> Option<u16> {
        self.pulses.lock()[channel as usize]
    }

    /// Total number of `set_pulse_us` calls observed.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Whether `shutdown` ran.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// In-memory stand-in for the PWM expander.
#[derive(Default)]
pub struct SimDriver {
    state: Arc<SimState>,
}

impl SimDriver {
    /// Fresh simulator with all channels detached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observable state handle; clone before boxing the driver.
    pub fn state(&self) -> Arc<SimState> {
        Arc::clone(&self.state)
    }
}

impl PwmDriver for SimDriver {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn set_pulse_us(&mut self, channel: u8, pulse_us: u16) -> Result<(), HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::ChannelOutOfRange(channel));
        }
        self.state.pulses.lock()[channel as usize] = Some(pulse_us);
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn detach(&mut self, channel: u8) -> Result<(), HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::ChannelOutOfRange(channel));
        }
        self.state.pulses.lock()[channel as usize] = None;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        *self.state.pulses.lock() = [None; CHANNEL_COUNT as usize];
        self.state.shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_last_pulse_per_channel() {
        let mut sim = SimDriver::new();
        let probe = sim.state();
        sim.set_pulse_us(0, 1500).unwrap();
        sim.set_pulse_us(0, 1600).unwrap();
        sim.set_pulse_us(5, 900).unwrap();
        assert_eq!(probe.last_pulse_us(0), Some(1600));
        assert_eq!(probe.last_pulse_us(5), Some(900));
        assert_eq!(probe.last_pulse_us(1), None);
        assert_eq!(probe.write_count(), 3);
    }

    #[test]
    fn detach_clears_the_channel() {
        let mut sim = SimDriver::new();
        let probe = sim.state();
        sim.set_pulse_us(2, 1200).unwrap();
        sim.detach(2).unwrap();
        assert_eq!(probe.last_pulse_us(2), None);
    }

    #[test]
    fn out_of_range_channel_is_an_error() {
        let mut sim = SimDriver::new();
        assert!(sim.set_pulse_us(16, 1500).is_err());
        assert!(sim.detach(99).is_err());
    }
}
