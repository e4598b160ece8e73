//! PCA9685 backend over rppal I²C.
//!
//! 16-channel, 12-bit PWM controller. All channels share one carrier
//! frequency (50 Hz for servos); each channel gets its own on/off counts
//! out of 4096 ticks per period. Detach sets the channel's full-off bit so
//! the output idles low.

use std::thread;
use std::time::Duration;

use rppal::i2c::I2c;
use tracing::info;

use rig_common::servo::CHANNEL_COUNT;

use crate::driver::{HalError, PwmDriver};

const MODE1: u8 = 0x00;
const PRE_SCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;
const ALL_LED_OFF_L: u8 = 0xFC;

// MODE1 bits.
const MODE1_RESTART: u8 = 0x80;
const MODE1_AI: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

/// Full-off bit in LEDn_OFF_H.
const FULL_OFF: u8 = 0x10;

/// Internal oscillator frequency [Hz].
const OSC_HZ: f64 = 25_000_000.0;

const TICKS_PER_PERIOD: f64 = 4096.0;

/// Convert a pulse width to 12-bit off-counts for the given period.
fn counts_for_pulse(pulse_us: u16, period_us: f64) -> u16 {
    let counts = (f64::from(pulse_us) / period_us * TICKS_PER_PERIOD).round();
    counts.clamp(0.0, TICKS_PER_PERIOD - 1.0) as u16
}

/// Real PCA9685 device on an I²C bus.
pub struct Pca9685Driver {
    i2c: I2c,
    /// Carrier period [µs], derived from the configured frequency.
    period_us: f64,
}

impl Pca9685Driver {
    /// Open the device and program the carrier frequency.
    pub fn new(bus: u8, address: u16, frequency_hz: f64) -> Result<Self, HalError> {
        let mut i2c =
            I2c::with_bus(bus).map_err(|e| HalError::InitFailed(e.to_string()))?;
        i2c.set_slave_address(address)
            .map_err(|e| HalError::InitFailed(e.to_string()))?;

        // Prescale is only writable while the oscillator sleeps.
        let prescale = (OSC_HZ / (TICKS_PER_PERIOD * frequency_hz)).round() as u8 - 1;
        i2c.smbus_write_byte(MODE1, MODE1_AI | MODE1_SLEEP)
            .map_err(|e| HalError::InitFailed(e.to_string()))?;
        i2c.smbus_write_byte(PRE_SCALE, prescale)
            .map_err(|e| HalError::InitFailed(e.to_string()))?;
        i2c.smbus_write_byte(MODE1, MODE1_AI)
            .map_err(|e| HalError::InitFailed(e.to_string()))?;
        // Oscillator startup time per datasheet.
        thread::sleep(Duration::from_micros(500));
        i2c.smbus_write_byte(MODE1, MODE1_AI | MODE1_RESTART)
            .map_err(|e| HalError::InitFailed(e.to_string()))?;

        info!(bus, address, frequency_hz, prescale, "pca9685 initialized");
        Ok(Self {
            i2c,
            period_us: 1_000_000.0 / frequency_hz,
        })
    }

    fn channel_base(channel: u8) -> u8 {
        LED0_ON_L + 4 * channel
    }
}

impl PwmDriver for Pca9685Driver {
    fn name(&self) -> &'static str {
        "pca9685"
    }

    fn set_pulse_us(&mut self, channel: u8, pulse_us: u16) -> Result<(), HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::ChannelOutOfRange(channel));
        }
        let off = counts_for_pulse(pulse_us, self.period_us);
        let buf = [0x00, 0x00, (off & 0xFF) as u8, (off >> 8) as u8];
        self.i2c
            .block_write(Self::channel_base(channel), &buf)
            .map_err(|e| HalError::I2c(e.to_string()))
    }

    fn detach(&mut self, channel: u8) -> Result<(), HalError> {
        if channel >= CHANNEL_COUNT {
            return Err(HalError::ChannelOutOfRange(channel));
        }
        let buf = [0x00, 0x00, 0x00, FULL_OFF];
        self.i2c
            .block_write(Self::channel_base(channel), &buf)
            .map_err(|e| HalError::I2c(e.to_string()))
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        // ALL_LED full-off, then put the oscillator to sleep.
        self.i2c
            .block_write(ALL_LED_OFF_L, &[0x00, FULL_OFF])
            .map_err(|e| HalError::I2c(e.to_string()))?;
        self.i2c
            .smbus_write_byte(MODE1, MODE1_SLEEP)
            .map_err(|e| HalError::I2c(e.to_string()))?;
        info!("pca9685 shut down");
        Ok(())
    }
}
