//! The eleven procedural motion generators.
//!
//! Every generator maps `(elapsed, dt, params)` to an angle for one target.
//! State that survives between ticks is modelled as one variant per
//! generator family in [`GeneratorState`]; the engine dispatches on the
//! variant instead of carrying a dynamic attribute bag.
//!
//! Oscillators treat `frequency` as cycles per second, so a 1 Hz sine at
//! `rate = 1` completes a full period each second.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rig_common::preset::{PresetKind, PresetParams};

/// Per-target generator state.
pub enum GeneratorState {
    /// Pure function of elapsed time.
    Stateless,
    /// Fixed phase offset (ripple: deterministic, swarm: random).
    Phase {
        /// Offset in seconds (ripple) or radians (swarm).
        offset: f64,
    },
    /// Velocity-coherent random walk with a dedicated PRNG.
    RandomWalk {
        /// Current position [degrees].
        position: f64,
        /// Current velocity [degrees/s].
        velocity: f64,
        /// Walk PRNG, reseeded deterministically when a seed is set.
        rng: StdRng,
    },
    /// Stepped sequence cursor.
    Step {
        /// Index into `params.sequence`.
        index: usize,
        /// Elapsed time of the last advance [s].
        last_step_s: f64,
    },
    /// Next scheduled twitch.
    Twitch {
        /// Elapsed time at which the next twitch fires [s].
        next_twitch_s: f64,
    },
}

/// One subscribed target with its position and generator state.
pub struct TargetState {
    /// Servo identifier.
    pub id: String,
    /// Last emitted angle [degrees].
    pub position: f64,
    /// Generator-specific state.
    pub state: GeneratorState,
}

/// Initialize per-target state for a generator.
///
/// Ripple targets get the deterministic `0.5 * index` second offset; swarm
/// targets draw a random phase from the instance PRNG. Random walks get
/// their own PRNG so a fixed seed reproduces the exact trajectory.
pub fn init_state(
    kind: PresetKind,
    params: &PresetParams,
    index: usize,
    instance_rng: &mut StdRng,
) -> GeneratorState {
    match kind {
        PresetKind::Ripple => GeneratorState::Phase {
            offset: 0.5 * index as f64,
        },
        PresetKind::Swarm => GeneratorState::Phase {
            offset: instance_rng.gen_range(0.0..std::f64::consts::TAU),
        },
        PresetKind::RandomWalk => GeneratorState::RandomWalk {
            position: params.center,
            velocity: 0.0,
            rng: match params.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::seed_from_u64(instance_rng.r#gen()),
            },
        },
        PresetKind::Step => GeneratorState::Step {
            index: 0,
            last_step_s: 0.0,
        },
        PresetKind::Twitch => GeneratorState::Twitch {
            next_twitch_s: instance_rng.gen_range(params.interval_min..=params.interval_max),
        },
        _ => GeneratorState::Stateless,
    }
}

/// Compute the next angle for one target.
pub fn next_angle(
    kind: PresetKind,
    params: &PresetParams,
    elapsed_s: f64,
    dt_s: f64,
    target: &mut TargetState,
    instance_rng: &mut StdRng,
) -> f64 {
    let angle = match (kind, &mut target.state) {
        (PresetKind::Sine, GeneratorState::Stateless) => sine(params, elapsed_s, 0.0),
        (PresetKind::PingPong, GeneratorState::Stateless) => pingpong(params, elapsed_s),
        (PresetKind::Bounce, GeneratorState::Stateless) => bounce(params, elapsed_s),
        (PresetKind::BezierPath, GeneratorState::Stateless) => bezier_path(params, elapsed_s),
        (PresetKind::Breath, GeneratorState::Stateless) => breath(params, elapsed_s),
        (PresetKind::Glitch, GeneratorState::Stateless) => glitch(params, elapsed_s, instance_rng),
        (PresetKind::Ripple, GeneratorState::Phase { offset }) => ripple(params, elapsed_s, *offset),
        (PresetKind::Swarm, GeneratorState::Phase { offset }) => swarm(params, elapsed_s, *offset),
        (
            PresetKind::RandomWalk,
            GeneratorState::RandomWalk {
                position,
                velocity,
                rng,
            },
        ) => random_walk(params, dt_s, position, velocity, rng),
        (PresetKind::Step, GeneratorState::Step { index, last_step_s }) => {
            step(params, elapsed_s, index, last_step_s)
        }
        (PresetKind::Twitch, GeneratorState::Twitch { next_twitch_s }) => twitch(
            params,
            elapsed_s,
            target.position,
            next_twitch_s,
            instance_rng,
        ),
        // State shape mismatch can only come from construction; hold.
        _ => target.position,
    };
    target.position = angle;
    angle
}

fn sine(params: &PresetParams, elapsed_s: f64, per_target_phase: f64) -> f64 {
    let arg = std::f64::consts::TAU * elapsed_s * params.frequency * params.rate
        + params.phase
        + per_target_phase;
    params.center + arg.sin() * params.depth
}

fn pingpong(params: &PresetParams, elapsed_s: f64) -> f64 {
    let cycle = 2.0 / params.rate;
    let t = (elapsed_s % cycle) / cycle;
    let progress = if t < 0.5 { t * 2.0 } else { (1.0 - t) * 2.0 };
    params.min_angle + progress * (params.max_angle - params.min_angle)
}

fn bounce(params: &PresetParams, elapsed_s: f64) -> f64 {
    let cycle = 2.0 / params.rate;
    let t = (elapsed_s % cycle) / cycle;
    let progress = if t < 0.5 {
        2.0 * t * t
    } else {
        let t = 1.0 - t;
        1.0 - 2.0 * t * t
    };
    params.min_angle + progress * (params.max_angle - params.min_angle)
}

fn random_walk(
    params: &PresetParams,
    dt_s: f64,
    position: &mut f64,
    velocity: &mut f64,
    rng: &mut StdRng,
) -> f64 {
    *velocity = *velocity * params.coherence + gauss(rng, params.step_size * dt_s);

    let max_velocity = params.step_size * 10.0;
    *velocity = velocity.clamp(-max_velocity, max_velocity);

    *position += *velocity * dt_s * params.rate;

    // Reflect at the bounds.
    if *position < params.min_angle {
        *position = params.min_angle;
        *velocity = velocity.abs();
    } else if *position > params.max_angle {
        *position = params.max_angle;
        *velocity = -velocity.abs();
    }
    *position
}

fn bezier_path(params: &PresetParams, elapsed_s: f64) -> f64 {
    let cycle = 4.0 / params.rate;
    let t = if params.loop_enabled {
        (elapsed_s % cycle) / cycle
    } else {
        (elapsed_s / cycle).min(1.0)
    };

    let cp = &params.control_points;
    if cp.len() < 4 {
        return params.center;
    }
    let span = params.max_angle - params.min_angle;
    let p = |i: usize| params.min_angle + cp[i] * span;
    let inv = 1.0 - t;
    inv.powi(3) * p(0)
        + 3.0 * inv * inv * t * p(1)
        + 3.0 * inv * t * t * p(2)
        + t.powi(3) * p(3)
}

fn step(params: &PresetParams, elapsed_s: f64, index: &mut usize, last_step_s: &mut f64) -> f64 {
    if params.sequence.is_empty() {
        return params.center;
    }
    if elapsed_s - *last_step_s >= params.hold_time / params.rate {
        *index = (*index + 1) % params.sequence.len();
        *last_step_s = elapsed_s;
    }
    params.sequence[*index]
}

fn ripple(params: &PresetParams, elapsed_s: f64, offset_s: f64) -> f64 {
    let wave_phase = elapsed_s * params.wave_speed * params.rate - offset_s;
    let distance_decay = (-offset_s * params.decay).exp();
    let wave = (std::f64::consts::TAU * wave_phase).sin() * distance_decay;
    params.center + wave * params.depth
}

fn swarm(params: &PresetParams, elapsed_s: f64, offset_rad: f64) -> f64 {
    // Jitter the base frequency by up to ±15% per target.
    let jitter = 1.0 + (offset_rad / std::f64::consts::TAU - 0.5) * 0.3;
    let base = std::f64::consts::TAU * elapsed_s * params.frequency * jitter * params.rate;
    let primary = base.sin();
    let secondary = 0.3 * (base * 3.0 + offset_rad).sin();
    params.center + (primary + secondary) * params.depth * 0.7
}

fn breath(params: &PresetParams, elapsed_s: f64) -> f64 {
    let cycle =
        (params.inhale_time + params.exhale_time + 2.0 * params.hold_time_breath) / params.rate;
    let t = (elapsed_s % cycle) * params.rate;

    let inhale_end = params.inhale_time;
    let peak_end = inhale_end + params.hold_time_breath;
    let exhale_end = peak_end + params.exhale_time;

    let progress = if t < inhale_end {
        let p = t / params.inhale_time;
        p * p
    } else if t < peak_end {
        1.0
    } else if t < exhale_end {
        let p = 1.0 - (t - peak_end) / params.exhale_time;
        1.0 - (1.0 - p) * (1.0 - p)
    } else {
        0.0
    };

    params.center + (progress - 0.5) * params.depth * 2.0
}

fn twitch(
    params: &PresetParams,
    elapsed_s: f64,
    position: f64,
    next_twitch_s: &mut f64,
    rng: &mut StdRng,
) -> f64 {
    if elapsed_s >= *next_twitch_s {
        let amplitude = rng.gen_range(-params.depth..=params.depth) * params.intensity;
        *next_twitch_s =
            elapsed_s + rng.gen_range(params.interval_min..=params.interval_max) / params.rate;
        params.center + amplitude
    } else {
        // Drift 10% of the way back to centre each tick.
        position + (params.center - position) * 0.1
    }
}

fn glitch(params: &PresetParams, elapsed_s: f64, rng: &mut StdRng) -> f64 {
    let base = (std::f64::consts::TAU * elapsed_s * params.frequency * params.rate).sin();
    let glitch = if rng.r#gen::<f64>() < 0.05 * params.rate {
        rng.gen_range(-1.0..=1.0) * params.intensity
    } else {
        0.0
    };
    params.center + (base + glitch) * params.depth
}

/// Box-Muller sample from `N(0, std_dev)`.
fn gauss(rng: &mut StdRng, std_dev: f64) -> f64 {
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos() * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PresetParams {
        PresetParams::default()
    }

    fn target(kind: PresetKind, p: &PresetParams, rng: &mut StdRng) -> TargetState {
        TargetState {
            id: "t".into(),
            position: p.center,
            state: init_state(kind, p, 0, rng),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn sine_quarter_period_peaks() {
        // center 90, depth 45, 1 Hz, rate 1: at 0.25 s the sine tops out.
        let mut p = params();
        p.frequency = 1.0;
        p.depth = 45.0;
        p.phase = 0.0;
        let mut r = rng();
        let mut t = target(PresetKind::Sine, &p, &mut r);
        let angle = next_angle(PresetKind::Sine, &p, 0.25, 0.033, &mut t, &mut r);
        assert!((angle - 135.0).abs() < 1e-9);
    }

    #[test]
    fn pingpong_triangle_shape() {
        let p = params(); // min 45, max 135, rate 1 -> 2 s cycle
        let mut r = rng();
        let mut t = target(PresetKind::PingPong, &p, &mut r);
        let at = |t_state: &mut TargetState, r: &mut StdRng, e: f64| {
            next_angle(PresetKind::PingPong, &p, e, 0.033, t_state, r)
        };
        assert!((at(&mut t, &mut r, 0.0) - 45.0).abs() < 1e-9);
        assert!((at(&mut t, &mut r, 0.5) - 90.0).abs() < 1e-9);
        assert!((at(&mut t, &mut r, 1.5) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn bounce_is_continuous_at_the_apex() {
        let p = params();
        let mut r = rng();
        let mut t = target(PresetKind::Bounce, &p, &mut r);
        let before = next_angle(PresetKind::Bounce, &p, 0.999, 0.033, &mut t, &mut r);
        let after = next_angle(PresetKind::Bounce, &p, 1.001, 0.033, &mut t, &mut r);
        assert!((before - after).abs() < 1.0);
        assert!(before <= p.max_angle && after <= p.max_angle);
    }

    #[test]
    fn step_advances_after_hold_time() {
        let mut p = params();
        p.sequence = vec![10.0, 20.0, 30.0];
        p.hold_time = 1.0;
        let mut r = rng();
        let mut t = target(PresetKind::Step, &p, &mut r);

        assert_eq!(next_angle(PresetKind::Step, &p, 0.5, 0.033, &mut t, &mut r), 10.0);
        assert_eq!(next_angle(PresetKind::Step, &p, 1.1, 0.033, &mut t, &mut r), 20.0);
        assert_eq!(next_angle(PresetKind::Step, &p, 1.9, 0.033, &mut t, &mut r), 20.0);
        assert_eq!(next_angle(PresetKind::Step, &p, 2.2, 0.033, &mut t, &mut r), 30.0);
        // Wraps modulo the sequence length.
        assert_eq!(next_angle(PresetKind::Step, &p, 3.3, 0.033, &mut t, &mut r), 10.0);
    }

    #[test]
    fn random_walk_is_reproducible_with_a_seed() {
        let mut p = params();
        p.seed = Some(7);

        let run = || {
            let mut r = rng();
            let mut t = target(PresetKind::RandomWalk, &p, &mut r);
            (0..100)
                .map(|i| {
                    next_angle(PresetKind::RandomWalk, &p, i as f64 * 0.033, 0.033, &mut t, &mut r)
                })
                .collect::<Vec<f64>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn random_walk_stays_in_bounds() {
        let mut p = params();
        p.seed = Some(99);
        p.step_size = 50.0;
        let mut r = rng();
        let mut t = target(PresetKind::RandomWalk, &p, &mut r);
        for i in 0..1000 {
            let angle =
                next_angle(PresetKind::RandomWalk, &p, i as f64 * 0.033, 0.033, &mut t, &mut r);
            assert!(angle >= p.min_angle && angle <= p.max_angle);
        }
    }

    #[test]
    fn ripple_first_target_has_no_delay_or_decay() {
        let p = params();
        let mut r = rng();
        let mut t0 = TargetState {
            id: "a".into(),
            position: p.center,
            state: init_state(PresetKind::Ripple, &p, 0, &mut r),
        };
        // Quarter wave at wave_speed 1: sin(pi/2) = 1 -> center + depth.
        let angle = next_angle(PresetKind::Ripple, &p, 0.25, 0.033, &mut t0, &mut r);
        assert!((angle - (p.center + p.depth)).abs() < 1e-9);
    }

    #[test]
    fn ripple_amplitude_decays_with_target_index() {
        let p = params();
        let mut r = rng();
        let mut max_swing = |index: usize| {
            let mut t = TargetState {
                id: "x".into(),
                position: p.center,
                state: init_state(PresetKind::Ripple, &p, index, &mut r),
            };
            (0..200)
                .map(|i| {
                    let a =
                        next_angle(PresetKind::Ripple, &p, i as f64 * 0.01, 0.01, &mut t, &mut r);
                    (a - p.center).abs()
                })
                .fold(0.0, f64::max)
        };
        assert!(max_swing(4) < max_swing(0));
    }

    #[test]
    fn swarm_stays_within_depth_of_centre() {
        let p = params();
        let mut r = rng();
        let mut t = target(PresetKind::Swarm, &p, &mut r);
        for i in 0..500 {
            let angle = next_angle(PresetKind::Swarm, &p, i as f64 * 0.02, 0.02, &mut t, &mut r);
            // (1 + 0.3) * 0.7 = 0.91 of depth at the extreme.
            assert!((angle - p.center).abs() <= p.depth);
        }
    }

    #[test]
    fn breath_spans_center_plus_minus_depth() {
        let mut p = params();
        p.depth = 15.0;
        let mut r = rng();
        let mut t = target(PresetKind::Breath, &p, &mut r);

        // t=0: bottom of the inhale.
        let bottom = next_angle(PresetKind::Breath, &p, 0.0, 0.033, &mut t, &mut r);
        assert!((bottom - (p.center - p.depth)).abs() < 1e-9);

        // During the peak hold (inhale_time < t < inhale_time + hold).
        let peak = next_angle(PresetKind::Breath, &p, p.inhale_time + 0.1, 0.033, &mut t, &mut r);
        assert!((peak - (p.center + p.depth)).abs() < 1e-9);

        // During the bottom hold at the end of the cycle.
        let cycle = p.inhale_time + p.exhale_time + 2.0 * p.hold_time_breath;
        let rest = next_angle(PresetKind::Breath, &p, cycle - 0.1, 0.033, &mut t, &mut r);
        assert!((rest - (p.center - p.depth)).abs() < 1e-9);
    }

    #[test]
    fn twitch_drifts_back_to_centre_between_firings() {
        let mut p = params();
        p.interval_min = 100.0;
        p.interval_max = 200.0;
        let mut r = rng();
        let mut t = target(PresetKind::Twitch, &p, &mut r);
        t.position = 100.0;

        let first = next_angle(PresetKind::Twitch, &p, 0.0, 0.033, &mut t, &mut r);
        assert!((first - 99.0).abs() < 1e-9); // 100 + (90 - 100) * 0.1
        let second = next_angle(PresetKind::Twitch, &p, 0.033, 0.033, &mut t, &mut r);
        assert!(second < first);
    }

    #[test]
    fn twitch_fires_within_the_configured_envelope() {
        let mut p = params();
        p.interval_min = 0.0;
        p.interval_max = 0.1;
        p.depth = 10.0;
        p.intensity = 0.5;
        let mut r = rng();
        let mut t = target(PresetKind::Twitch, &p, &mut r);

        // Force a firing by jumping past any scheduled time.
        let fired = next_angle(PresetKind::Twitch, &p, 10.0, 0.033, &mut t, &mut r);
        assert!((fired - p.center).abs() <= p.depth * p.intensity + 1e-9);
    }

    #[test]
    fn bezier_one_shot_holds_its_endpoint() {
        let mut p = params();
        p.loop_enabled = false;
        let mut r = rng();
        let mut t = target(PresetKind::BezierPath, &p, &mut r);
        // Past the 4 s cycle the curve parks at the final control point.
        let end = next_angle(PresetKind::BezierPath, &p, 10.0, 0.033, &mut t, &mut r);
        assert!((end - p.max_angle).abs() < 1e-9);
    }

    #[test]
    fn glitch_base_is_a_sine_between_impulses() {
        let mut p = params();
        p.intensity = 0.0; // impulses contribute nothing
        p.frequency = 1.0;
        let mut r = rng();
        let mut t = target(PresetKind::Glitch, &p, &mut r);
        let angle = next_angle(PresetKind::Glitch, &p, 0.25, 0.033, &mut t, &mut r);
        assert!((angle - (p.center + p.depth)).abs() < 1e-9);
    }
}
