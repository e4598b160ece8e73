//! Property-based coverage of the core invariants.

use proptest::prelude::*;

use rig_common::servo::{Calibration, ServoMetadata, ServoOrientation};
use rig_hal::driver::pulse_for_angle;

proptest! {
    /// Clamping is idempotent for any limits and any input angle.
    #[test]
    fn clamp_is_idempotent(
        min in 0.0f64..90.0,
        span in 1.0f64..90.0,
        angle in -360.0f64..540.0,
    ) {
        let mut servo = ServoMetadata::new("s", 0);
        servo.min_deg = min;
        servo.max_deg = (min + span).min(180.0);

        let once = servo.clamp_angle(angle);
        prop_assert_eq!(servo.clamp_angle(once), once);
        prop_assert!(once >= servo.min_deg && once <= servo.max_deg);
    }

    /// Orientation is an involution for the flipped mountings.
    #[test]
    fn orientation_is_an_involution(angle in 0.0f64..=180.0) {
        for orientation in [ServoOrientation::Inverted, ServoOrientation::Mirrored] {
            let twice = orientation.apply(orientation.apply(angle));
            prop_assert!((twice - angle).abs() < 1e-12);
        }
    }

    /// The driver mapping is the documented linear formula to within 1 µs.
    #[test]
    fn pulse_mapping_matches_the_linear_formula(
        min_us in 500u16..1400,
        max_us in 1600u16..2500,
        angle in 0.0f64..=180.0,
    ) {
        let calibration = Calibration { min_pulse_us: min_us, max_pulse_us: max_us };
        let pulse = pulse_for_angle(angle, calibration);
        let expected = f64::from(min_us)
            + angle / 180.0 * (f64::from(max_us) - f64::from(min_us));
        prop_assert!((f64::from(pulse) - expected).abs() <= 1.0);
    }

    /// Pulses never leave the calibrated interval, whatever the angle.
    #[test]
    fn pulses_stay_inside_the_calibration(
        min_us in 500u16..1400,
        max_us in 1600u16..2500,
        angle in -720.0f64..720.0,
    ) {
        let calibration = Calibration { min_pulse_us: min_us, max_pulse_us: max_us };
        let pulse = pulse_for_angle(angle, calibration);
        prop_assert!(pulse >= min_us && pulse <= max_us);
    }
}
