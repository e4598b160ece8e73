//! Servo metadata, orientation and calibration types.
//!
//! A servo is addressed by a canonical id, an optional set of aliases, or
//! its hardware channel. The metadata here is what the registry persists;
//! hot runtime fields (current/target angle) live in the registry's
//! per-servo cells.

use serde::{Deserialize, Serialize};

/// Number of PWM channels on the expander.
pub const CHANNEL_COUNT: u8 = 16;

/// Full mechanical travel assumed for hobby servos [degrees].
pub const FULL_TRAVEL_DEG: f64 = 180.0;

/// Typical lower bound for hobby servo pulse widths [µs].
pub const PULSE_TYPICAL_MIN_US: u16 = 500;

/// Typical upper bound for hobby servo pulse widths [µs].
pub const PULSE_TYPICAL_MAX_US: u16 = 2500;

/// Mounting orientation correction applied at write time.
///
/// The registry stores angles in logical space; the correction is applied
/// only when producing the value handed to the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoOrientation {
    /// Logical angle equals mechanical angle.
    #[default]
    Normal,
    /// Mechanically reversed mounting: drive `180 - angle`.
    Inverted,
    /// Mirrored mounting. Currently maps like `Inverted`.
    Mirrored,
}

impl ServoOrientation {
    /// Apply the orientation remap to a logical angle.
    #[inline]
    pub fn apply(self, angle_deg: f64) -> f64 {
        match self {
            Self::Normal => angle_deg,
            Self::Inverted | Self::Mirrored => FULL_TRAVEL_DEG - angle_deg,
        }
    }
}

/// Pulse-width calibration for the angle to pulse mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Pulse width at 0° [µs].
    pub min_pulse_us: u16,
    /// Pulse width at 180° [µs].
    pub max_pulse_us: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            min_pulse_us: 750,
            max_pulse_us: 2250,
        }
    }
}

/// Full servo configuration with physical metadata.
///
/// Field defaults match a freshly registered, disabled servo centred at 90°.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoMetadata {
    /// Canonical id, e.g. `"left_eye"`.
    pub id: String,
    /// Hardware channel on the expander (0..=15).
    pub channel: u8,
    /// Physical pin number, documentation only.
    #[serde(default)]
    pub pin: Option<u8>,
    /// Mounting orientation correction.
    #[serde(default)]
    pub orientation: ServoOrientation,
    /// Mechanical advantage, metadata only.
    #[serde(default = "default_gear_ratio")]
    pub gear_ratio: f64,
    /// Operator notes.
    #[serde(default)]
    pub notes: String,

    /// Pulse width at 0° [µs].
    #[serde(default = "default_min_pulse_us")]
    pub min_pulse_us: u16,
    /// Pulse width at 180° [µs].
    #[serde(default = "default_max_pulse_us")]
    pub max_pulse_us: u16,
    /// Nominal mechanical zero reference [degrees].
    #[serde(default = "default_center_deg")]
    pub center_deg: f64,

    /// Soft limit lower bound [degrees].
    #[serde(default)]
    pub min_deg: f64,
    /// Soft limit upper bound [degrees].
    #[serde(default = "default_max_deg")]
    pub max_deg: f64,

    /// Last commanded angle in logical space [degrees].
    #[serde(default = "default_center_deg")]
    pub current_angle: f64,
    /// Pending target angle in logical space [degrees].
    #[serde(default = "default_center_deg")]
    pub target_angle: f64,
    /// When false the channel is detached (no pulse).
    #[serde(default)]
    pub enabled: bool,

    /// Alternate human-friendly names, globally unique.
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_gear_ratio() -> f64 {
    1.0
}
fn default_min_pulse_us() -> u16 {
    750
}
fn default_max_pulse_us() -> u16 {
    2250
}
fn default_center_deg() -> f64 {
    90.0
}
fn default_max_deg() -> f64 {
    FULL_TRAVEL_DEG
}

impl ServoMetadata {
    /// Create metadata for a newly registered servo with default calibration.
    pub fn new(id: impl Into<String>, channel: u8) -> Self {
        Self {
            id: id.into(),
            channel,
            pin: None,
            orientation: ServoOrientation::Normal,
            gear_ratio: 1.0,
            notes: String::new(),
            min_pulse_us: default_min_pulse_us(),
            max_pulse_us: default_max_pulse_us(),
            center_deg: default_center_deg(),
            min_deg: 0.0,
            max_deg: FULL_TRAVEL_DEG,
            current_angle: default_center_deg(),
            target_angle: default_center_deg(),
            enabled: false,
            aliases: Vec::new(),
        }
    }

    /// Clamp an angle to this servo's soft limits.
    #[inline]
    pub fn clamp_angle(&self, angle_deg: f64) -> f64 {
        angle_deg.clamp(self.min_deg, self.max_deg)
    }

    /// Apply the orientation remap for the driver write.
    #[inline]
    pub fn oriented(&self, angle_deg: f64) -> f64 {
        self.orientation.apply(angle_deg)
    }

    /// Midpoint of the soft limit interval [degrees].
    #[inline]
    pub fn midpoint_deg(&self) -> f64 {
        (self.min_deg + self.max_deg) / 2.0
    }

    /// Pulse calibration pair for the driver.
    #[inline]
    pub fn calibration(&self) -> Calibration {
        Calibration {
            min_pulse_us: self.min_pulse_us,
            max_pulse_us: self.max_pulse_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_normal_is_identity() {
        assert_eq!(ServoOrientation::Normal.apply(37.5), 37.5);
    }

    #[test]
    fn orientation_inverted_and_mirrored_flip() {
        assert_eq!(ServoOrientation::Inverted.apply(30.0), 150.0);
        assert_eq!(ServoOrientation::Mirrored.apply(30.0), 150.0);
    }

    #[test]
    fn orientation_is_an_involution() {
        for orientation in [ServoOrientation::Inverted, ServoOrientation::Mirrored] {
            for angle in [0.0, 12.5, 90.0, 180.0] {
                assert_eq!(orientation.apply(orientation.apply(angle)), angle);
            }
        }
    }

    #[test]
    fn clamp_respects_soft_limits() {
        let mut servo = ServoMetadata::new("jaw", 2);
        servo.min_deg = 60.0;
        servo.max_deg = 120.0;
        assert_eq!(servo.clamp_angle(200.0), 120.0);
        assert_eq!(servo.clamp_angle(-5.0), 60.0);
        assert_eq!(servo.clamp_angle(90.0), 90.0);
    }

    #[test]
    fn clamp_is_idempotent() {
        let mut servo = ServoMetadata::new("jaw", 2);
        servo.min_deg = 60.0;
        servo.max_deg = 120.0;
        for angle in [-20.0, 0.0, 61.0, 119.0, 180.0, 400.0] {
            let once = servo.clamp_angle(angle);
            assert_eq!(servo.clamp_angle(once), once);
        }
    }

    #[test]
    fn new_servo_defaults() {
        let servo = ServoMetadata::new("brow", 7);
        assert_eq!(servo.channel, 7);
        assert_eq!(servo.min_pulse_us, 750);
        assert_eq!(servo.max_pulse_us, 2250);
        assert_eq!(servo.center_deg, 90.0);
        assert_eq!(servo.min_deg, 0.0);
        assert_eq!(servo.max_deg, 180.0);
        assert!(!servo.enabled);
        assert!(servo.aliases.is_empty());
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let mut servo = ServoMetadata::new("left_eye", 3);
        servo.orientation = ServoOrientation::Inverted;
        servo.aliases.push("eye_l".into());
        let json = serde_json::to_string(&servo).unwrap();
        assert!(json.contains("\"inverted\""));
        let back: ServoMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, servo);
    }

    #[test]
    fn metadata_deserializes_with_defaults() {
        let servo: ServoMetadata =
            serde_json::from_str(r#"{"id": "tail", "channel": 9}"#).unwrap();
        assert_eq!(servo.max_deg, 180.0);
        assert_eq!(servo.current_angle, 90.0);
        assert_eq!(servo.orientation, ServoOrientation::Normal);
    }
}
