//! Timeline data model: keyframes, tracks, markers and transport state.
//!
//! Keyframes within a track are kept in non-decreasing time order; ties are
//! permitted and the later-inserted keyframe acts as a step discontinuity.

use serde::{Deserialize, Serialize};

use crate::easing::EaseType;
use crate::error::{RigError, RigResult};

/// One keyframe with timing and easing attributed to its incoming segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Time position [ms], non-negative.
    pub time_ms: f64,
    /// Target value (angle for servo tracks) [degrees].
    pub value: f64,
    /// Easing shaping the segment that ends at this keyframe.
    #[serde(default)]
    pub ease: EaseType,
    /// Quad/cubic blend factor in `[0, 1]` for the in/out families.
    #[serde(default)]
    pub tension: f64,
    /// First bezier control point, only read for `CubicBezier`.
    #[serde(default = "default_cp1")]
    pub bezier_cp1: (f64, f64),
    /// Second bezier control point, only read for `CubicBezier`.
    #[serde(default = "default_cp2")]
    pub bezier_cp2: (f64, f64),
}

fn default_cp1() -> (f64, f64) {
    (0.25, 0.1)
}
fn default_cp2() -> (f64, f64) {
    (0.25, 1.0)
}

impl Keyframe {
    /// A linear keyframe at `time_ms` with the given value.
    pub fn linear(time_ms: f64, value: f64) -> Self {
        Self {
            time_ms,
            value,
            ease: EaseType::Linear,
            tension: 0.0,
            bezier_cp1: default_cp1(),
            bezier_cp2: default_cp2(),
        }
    }

    /// A keyframe with explicit easing and tension.
    pub fn eased(time_ms: f64, value: f64, ease: EaseType, tension: f64) -> Self {
        Self {
            ease,
            tension,
            ..Self::linear(time_ms, value)
        }
    }
}

/// Animation track driving a single servo target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Track name, unique within its timeline.
    pub name: String,
    /// Servo identifier this track drives.
    pub target: String,
    /// Keyframes in non-decreasing `time_ms` order.
    pub keyframes: Vec<Keyframe>,
    /// Disabled tracks never render.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// If any track is soloed, only soloed tracks render.
    #[serde(default)]
    pub solo: bool,
    /// Muted tracks never render.
    #[serde(default)]
    pub muted: bool,
}

fn default_true() -> bool {
    true
}

impl Track {
    /// An empty track for `target`.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            keyframes: Vec::new(),
            enabled: true,
            solo: false,
            muted: false,
        }
    }

    /// Insert a keyframe preserving time order.
    ///
    /// Equal times insert after existing entries, so the newest keyframe
    /// wins the tie and reads as a step.
    pub fn insert_sorted(&mut self, keyframe: Keyframe) {
        let at = self
            .keyframes
            .partition_point(|k| k.time_ms <= keyframe.time_ms);
        self.keyframes.insert(at, keyframe);
    }
}

/// Navigation marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Time position [ms].
    pub time_ms: f64,
    /// Label, unique within the timeline.
    pub label: String,
    /// Display color.
    #[serde(default = "default_marker_color")]
    pub color: String,
}

fn default_marker_color() -> String {
    "#FF6B6B".to_string()
}

/// Transport state of the timeline engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineState {
    /// Transport idle at the playhead origin.
    #[default]
    Stopped,
    /// Playhead advancing with wall clock.
    Playing,
    /// Playhead frozen, position retained.
    Paused,
    /// Capturing live keyframes.
    Recording,
}

/// A complete timeline with tracks and playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Timeline name.
    pub name: String,
    /// Film-style timebase [frames/s]. Mutually exclusive with `bpm`.
    pub fps: Option<f64>,
    /// Music-style timebase [beats/min]. Mutually exclusive with `fps`.
    pub bpm: Option<f64>,
    /// Total duration [ms], positive.
    pub duration_ms: f64,
    /// Tracks, one servo target each.
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Navigation markers sorted by time.
    #[serde(default)]
    pub markers: Vec<Marker>,
    /// Loop the `[loop_start_ms, loop_end_ms)` window during playback.
    #[serde(rename = "loop", default)]
    pub loop_enabled: bool,
    /// Loop window start [ms].
    #[serde(default)]
    pub loop_start_ms: f64,
    /// Loop window end [ms].
    pub loop_end_ms: f64,
}

impl Timeline {
    /// Create a timeline; defaults to a 30 fps timebase when neither
    /// `fps` nor `bpm` is given.
    pub fn new(
        name: impl Into<String>,
        fps: Option<f64>,
        bpm: Option<f64>,
        duration_ms: f64,
    ) -> RigResult<Self> {
        if duration_ms <= 0.0 {
            return Err(RigError::OutOfRange {
                what: "duration_ms",
                value: duration_ms,
                min: f64::MIN_POSITIVE,
                max: f64::INFINITY,
            });
        }
        let (fps, bpm) = match (fps, bpm) {
            (None, None) => (Some(30.0), None),
            (fps, bpm) => (fps, bpm),
        };
        Ok(Self {
            name: name.into(),
            fps,
            bpm,
            duration_ms,
            tracks: Vec::new(),
            markers: Vec::new(),
            loop_enabled: false,
            loop_start_ms: 0.0,
            loop_end_ms: duration_ms,
        })
    }

    /// Timebase resolution [ms]: frame interval for `fps`, sixteenth-note
    /// grid for `bpm`.
    pub fn timebase_ms(&self) -> f64 {
        if let Some(fps) = self.fps {
            1000.0 / fps
        } else if let Some(bpm) = self.bpm {
            60_000.0 / (bpm * 4.0)
        } else {
            1000.0 / 30.0
        }
    }

    /// Look up a track by name.
    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    /// Look up a track mutably by name.
    pub fn track_mut(&mut self, name: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.name == name)
    }

    /// Validate the loop window against the duration.
    pub fn validate_loop(&self, start_ms: f64, end_ms: f64) -> RigResult<()> {
        if start_ms < 0.0 || start_ms >= end_ms || end_ms > self.duration_ms {
            return Err(RigError::OutOfRange {
                what: "loop window",
                value: start_ms,
                min: 0.0,
                max: self.duration_ms,
            });
        }
        Ok(())
    }
}
