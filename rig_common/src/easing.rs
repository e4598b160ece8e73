//! Easing functions for keyframe interpolation.
//!
//! Easing is attributed to the destination keyframe: the segment leading
//! into keyframe `b` is shaped by `b.ease`. `EaseIn`/`EaseOut`/`EaseInOut`
//! blend between quadratic and cubic curves by `tension` (0 = quad,
//! 1 = cubic). The cubic-bezier variant is a plain Bernstein polynomial in
//! `t` over the control point y-coordinates, not a parametric curve solved
//! for `x = t`; the x-coordinates are accepted and ignored.

use serde::{Deserialize, Serialize};

/// Easing curve applied to the normalized interpolation parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EaseType {
    /// No shaping.
    #[default]
    Linear,
    /// Accelerate from rest.
    EaseIn,
    /// Decelerate to rest.
    EaseOut,
    /// Accelerate then decelerate.
    EaseInOut,
    /// Bernstein polynomial over supplied control points.
    CubicBezier,
    /// Four-segment bouncing parabola.
    Bounce,
    /// Exponentially damped sine overshoot.
    Elastic,
}

#[inline]
fn ease_in_quad(t: f64) -> f64 {
    t * t
}

#[inline]
fn ease_out_quad(t: f64) -> f64 {
    t * (2.0 - t)
}

fn ease_in_out_quad(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        -1.0 + (4.0 - 2.0 * t) * t
    }
}

#[inline]
fn ease_in_cubic(t: f64) -> f64 {
    t * t * t
}

fn ease_out_cubic(t: f64) -> f64 {
    let t = t - 1.0;
    t * t * t + 1.0
}

fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        let t = t - 1.0;
        1.0 + t * (2.0 * t) * (2.0 * t)
    }
}

/// Four-segment piecewise parabola, coefficient 7.5625.
fn bounce_out(t: f64) -> f64 {
    const N: f64 = 7.5625;
    if t < 1.0 / 2.75 {
        N * t * t
    } else if t < 2.0 / 2.75 {
        let t = t - 1.5 / 2.75;
        N * t * t + 0.75
    } else if t < 2.5 / 2.75 {
        let t = t - 2.25 / 2.75;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / 2.75;
        N * t * t + 0.984375
    }
}

/// `2^(-10t) * sin((t - 0.1) * 5π) + 1`; endpoints pass through.
fn elastic_out(t: f64) -> f64 {
    if t == 0.0 || t == 1.0 {
        return t;
    }
    (2.0_f64).powf(-10.0 * t) * ((t - 0.1) * 5.0 * std::f64::consts::PI).sin() + 1.0
}

/// Bernstein cubic over `(0, cp1.y, cp2.y, 1)`.
fn cubic_bezier(t: f64, cp1: (f64, f64), cp2: (f64, f64)) -> f64 {
    let (_, y1) = cp1;
    let (_, y2) = cp2;
    let inv = 1.0 - t;
    3.0 * inv * inv * t * y1 + 3.0 * inv * t * t * y2 + t * t * t
}

/// Apply the selected easing to `t`, clamped to `[0, 1]`.
///
/// `tension` blends quad (0) and cubic (1) for the in/out families and is
/// ignored elsewhere. The bezier control points are only consulted for
/// [`EaseType::CubicBezier`].
pub fn apply(
    ease: EaseType,
    t: f64,
    tension: f64,
    bezier_cp1: (f64, f64),
    bezier_cp2: (f64, f64),
) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let tension = tension.clamp(0.0, 1.0);
    match ease {
        EaseType::Linear => t,
        EaseType::EaseIn => blend(ease_in_quad(t), ease_in_cubic(t), tension),
        EaseType::EaseOut => blend(ease_out_quad(t), ease_out_cubic(t), tension),
        EaseType::EaseInOut => blend(ease_in_out_quad(t), ease_in_out_cubic(t), tension),
        EaseType::Bounce => bounce_out(t),
        EaseType::Elastic => elastic_out(t),
        EaseType::CubicBezier => cubic_bezier(t, bezier_cp1, bezier_cp2),
    }
}

#[inline]
fn blend(quad: f64, cubic: f64, tension: f64) -> f64 {
    quad * (1.0 - tension) + cubic * tension
}
