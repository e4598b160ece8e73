//! Procedural motion preset kinds and parameters.
//!
//! `PresetParams` is one flat parameter bag shared by all generators; each
//! generator reads the subset it cares about. Field defaults match the
//! artist-facing defaults (centre 90°, ±45° depth, 1 s cycles).

use serde::{Deserialize, Serialize};

/// The eleven procedural motion generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetKind {
    /// Sinusoid around `center`.
    Sine,
    /// Linear triangle wave between `min_angle` and `max_angle`.
    #[serde(rename = "pingpong")]
    PingPong,
    /// Two-segment quadratic bounce between `min_angle` and `max_angle`.
    Bounce,
    /// Velocity-coherent random walk, reflecting at the bounds.
    RandomWalk,
    /// Cubic bezier sweep over four control points.
    BezierPath,
    /// Stepped angle sequence with per-step hold time.
    Step,
    /// Sine wave propagating across targets with decaying amplitude.
    Ripple,
    /// Two-harmonic sine mix with per-target frequency jitter.
    Swarm,
    /// Inhale / hold / exhale / hold cycle.
    Breath,
    /// Occasional impulses with drift back to centre.
    Twitch,
    /// Sine base with random impulse corruption.
    Glitch,
}

/// Parameters for motion presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetParams {
    // Universal
    /// Speed multiplier.
    pub rate: f64,
    /// Motion range [degrees].
    pub depth: f64,
    /// Centre position [degrees].
    pub center: f64,
    /// Whether the motion loops (bezier path only runs once otherwise).
    #[serde(rename = "loop")]
    pub loop_enabled: bool,

    // Sine / swarm / glitch
    /// Base frequency [Hz].
    pub frequency: f64,
    /// Phase offset [radians].
    pub phase: f64,

    // Pingpong / bounce / random walk / bezier path
    /// Lower angle bound [degrees].
    pub min_angle: f64,
    /// Upper angle bound [degrees].
    pub max_angle: f64,

    // Random walk
    /// Maximum step size per update [degrees].
    pub step_size: f64,
    /// Velocity retention in `[0, 1]`; higher is smoother.
    pub coherence: f64,
    /// PRNG seed for reproducible motion.
    pub seed: Option<u64>,

    // Bezier path
    /// Normalized control points mapped into `[min_angle, max_angle]`.
    pub control_points: Vec<f64>,

    // Step
    /// Angle sequence [degrees].
    pub sequence: Vec<f64>,
    /// Hold time per step [s].
    pub hold_time: f64,

    // Ripple
    /// Propagation speed multiplier.
    pub wave_speed: f64,
    /// Amplitude decay per target offset.
    pub decay: f64,

    // Breath
    /// Inhale duration [s].
    pub inhale_time: f64,
    /// Exhale duration [s].
    pub exhale_time: f64,
    /// Hold duration at peak and at bottom [s].
    pub hold_time_breath: f64,

    // Twitch / glitch
    /// Impulse intensity in `[0, 1]`.
    pub intensity: f64,
    /// Minimum time between twitches [s].
    pub interval_min: f64,
    /// Maximum time between twitches [s].
    pub interval_max: f64,
}

impl Default for PresetParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            depth: 45.0,
            center: 90.0,
            loop_enabled: true,
            frequency: 0.5,
            phase: 0.0,
            min_angle: 45.0,
            max_angle: 135.0,
            step_size: 5.0,
            coherence: 0.8,
            seed: None,
            control_points: vec![0.0, 0.3, 0.7, 1.0],
            sequence: vec![45.0, 90.0, 135.0, 90.0],
            hold_time: 1.0,
            wave_speed: 1.0,
            decay: 0.1,
            inhale_time: 2.0,
            exhale_time: 3.0,
            hold_time_breath: 0.5,
            intensity: 0.3,
            interval_min: 0.5,
            interval_max: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PresetKind::RandomWalk).unwrap(),
            "\"random_walk\""
        );
        assert_eq!(
            serde_json::to_string(&PresetKind::PingPong).unwrap(),
            "\"pingpong\""
        );
    }

    #[test]
    fn params_default_bag() {
        let p = PresetParams::default();
        assert_eq!(p.rate, 1.0);
        assert_eq!(p.center, 90.0);
        assert_eq!(p.control_points, vec![0.0, 0.3, 0.7, 1.0]);
        assert_eq!(p.sequence.len(), 4);
        assert!(p.loop_enabled);
    }

    #[test]
    fn params_partial_json_fills_defaults() {
        let p: PresetParams =
            serde_json::from_str(r#"{"rate": 2.0, "depth": 10.0, "seed": 7}"#).unwrap();
        assert_eq!(p.rate, 2.0);
        assert_eq!(p.depth, 10.0);
        assert_eq!(p.seed, Some(7));
        assert_eq!(p.center, 90.0);
    }
}
