//! Serializable status snapshots for the periodic push and the `status`
//! verb.

use std::collections::BTreeMap;

use serde::Serialize;

use rig_common::preset::PresetKind;
use rig_common::safety::{EmergencyMode, SafetyState};
use rig_common::servo::ServoMetadata;
use rig_common::timeline::TimelineState;

use crate::rig::Rig;
use crate::safety::DEFAULT_SAFE_POSE;

/// Safety subsystem snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SafetySnapshot {
    /// Current safety state.
    pub state: SafetyState,
    /// Mode used when an emergency stop gives none.
    pub default_mode: EmergencyMode,
    /// Whether the watchdog is armed.
    pub watchdog_armed: bool,
    /// Watchdog timeout [ms].
    pub watchdog_timeout_ms: u64,
    /// Available pose names.
    pub safe_poses: Vec<String>,
    /// Pose used by default recovery.
    pub default_pose: String,
    /// Entries in the emergency log.
    pub recent_emergencies: usize,
    /// Entries in the fault log.
    pub recent_faults: usize,
}

/// Per-timeline summary.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineSummary {
    /// Total duration [ms].
    pub duration_ms: f64,
    /// Film timebase, if set.
    pub fps: Option<f64>,
    /// Music timebase, if set.
    pub bpm: Option<f64>,
    /// Track count.
    pub tracks: usize,
    /// Marker count.
    pub markers: usize,
    /// Loop flag.
    #[serde(rename = "loop")]
    pub loop_enabled: bool,
    /// Loop window start [ms].
    pub loop_start_ms: f64,
    /// Loop window end [ms].
    pub loop_end_ms: f64,
}

/// Timeline engine snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TransportSnapshot {
    /// Transport state.
    pub state: TimelineState,
    /// Active timeline name.
    pub active_timeline: Option<String>,
    /// Playhead position [ms].
    pub current_time_ms: f64,
    /// Speed multiplier.
    pub playback_speed: f64,
    /// Edit-time quantization flag.
    pub quantize_enabled: bool,
    /// Quantization grid [ms].
    pub quantize_grid_ms: f64,
    /// Summaries keyed by timeline name.
    pub timelines: BTreeMap<String, TimelineSummary>,
}

/// One preset definition for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct PresetDefinitionInfo {
    /// Generator family.
    pub kind: PresetKind,
    /// Operator description.
    pub description: String,
    /// Targets used when `play` gets none.
    pub default_targets: Vec<String>,
}

/// Preset engine snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PresetSnapshot {
    /// Running instance names.
    pub running: Vec<String>,
    /// Known definitions.
    pub definitions: BTreeMap<String, PresetDefinitionInfo>,
}

/// Full rig snapshot: registry, safety, timeline, presets.
#[derive(Debug, Clone, Serialize)]
pub struct RigStatus {
    /// Servo metadata with live angles folded in.
    pub servos: Vec<ServoMetadata>,
    /// Alias to canonical id mapping.
    pub aliases: BTreeMap<String, String>,
    /// Safety subsystem.
    pub safety: SafetySnapshot,
    /// Timeline engine.
    pub timeline: TransportSnapshot,
    /// Preset engine.
    pub presets: PresetSnapshot,
}

impl RigStatus {
    /// Snapshot every subsystem of `rig`.
    pub fn collect(rig: &Rig) -> Self {
        let safety = rig.safety();
        let timeline = rig.timeline();
        let presets = rig.presets();

        let timelines = timeline
            .timeline_names()
            .into_iter()
            .filter_map(|name| {
                timeline.timeline(&name).map(|tl| {
                    (
                        name,
                        TimelineSummary {
                            duration_ms: tl.duration_ms,
                            fps: tl.fps,
                            bpm: tl.bpm,
                            tracks: tl.tracks.len(),
                            markers: tl.markers.len(),
                            loop_enabled: tl.loop_enabled,
                            loop_start_ms: tl.loop_start_ms,
                            loop_end_ms: tl.loop_end_ms,
                        },
                    )
                })
            })
            .collect();

        let (quantize_enabled, quantize_grid_ms) = timeline.quantize_settings();

        Self {
            servos: rig.registry().snapshot(),
            aliases: rig.registry().aliases(),
            safety: SafetySnapshot {
                state: safety.state(),
                default_mode: safety.default_mode(),
                watchdog_armed: safety.watchdog_armed(),
                watchdog_timeout_ms: safety.watchdog_timeout_ms(),
                safe_poses: safety.pose_names(),
                default_pose: DEFAULT_SAFE_POSE.to_string(),
                recent_emergencies: safety.emergency_log().len(),
                recent_faults: safety.fault_log().len(),
            },
            timeline: TransportSnapshot {
                state: timeline.state(),
                active_timeline: timeline.active(),
                current_time_ms: timeline.current_time_ms(),
                playback_speed: timeline.speed(),
                quantize_enabled,
                quantize_grid_ms,
                timelines,
            },
            presets: PresetSnapshot {
                running: presets.running(),
                definitions: presets
                    .definitions()
                    .into_iter()
                    .map(|(name, def)| {
                        (
                            name,
                            PresetDefinitionInfo {
                                kind: def.kind,
                                description: def.description,
                                default_targets: def.default_targets,
                            },
                        )
                    })
                    .collect(),
            },
        }
    }
}
