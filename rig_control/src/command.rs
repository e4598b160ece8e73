//! Protocol-agnostic operator verbs.
//!
//! Adapters (HTTP, WebSocket, a REPL) decode their payloads into
//! [`Command`] and hand it to [`CommandProcessor::dispatch`]. Every write
//! verb answers with an [`Ack`]; every verb except `status` pets the
//! watchdog, so a connected operator keeps the rig alive.

use serde::{Deserialize, Serialize};
use tracing::debug;

use rig_common::easing::EaseType;
use rig_common::error::Ack;
use rig_common::preset::{PresetKind, PresetParams};
use rig_common::safety::EmergencyMode;
use rig_common::servo::ServoOrientation;

use crate::rig::Rig;
use crate::status::RigStatus;

fn default_gear_ratio() -> f64 {
    1.0
}

/// One operator verb with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verb")]
pub enum Command {
    /// Full snapshot of registry, safety, timeline and running presets.
    #[serde(rename = "status")]
    Status,

    /// Register a servo.
    #[serde(rename = "servo.register")]
    ServoRegister {
        id: String,
        channel: u8,
        #[serde(default)]
        pin: Option<u8>,
        #[serde(default)]
        orientation: ServoOrientation,
        #[serde(default = "default_gear_ratio")]
        gear_ratio: f64,
        #[serde(default)]
        notes: String,
    },

    /// Calibrate the pulse mapping.
    #[serde(rename = "servo.calibrate")]
    ServoCalibrate {
        id: String,
        min_us: u16,
        max_us: u16,
        center_deg: f64,
    },

    /// Set the soft limit interval.
    #[serde(rename = "servo.set_limits")]
    ServoSetLimits { id: String, min_deg: f64, max_deg: f64 },

    /// Drive a servo through clamp, orientation and the bus.
    #[serde(rename = "servo.set_angle")]
    ServoSetAngle { id: String, angle: f64 },

    /// Re-attach a servo and re-drive its last angle.
    #[serde(rename = "servo.enable")]
    ServoEnable { id: String },

    /// Detach a servo.
    #[serde(rename = "servo.disable")]
    ServoDisable { id: String },

    /// Rename a servo.
    #[serde(rename = "servo.rename")]
    ServoRename { old_id: String, new_id: String },

    /// Add a servo alias.
    #[serde(rename = "servo.alias")]
    ServoAlias { id: String, alias: String },

    /// Drive a safe pose (default `park`).
    #[serde(rename = "safety.safe_pose")]
    SafetySafePose {
        #[serde(default)]
        pose: Option<String>,
    },

    /// Run the preflight sweep.
    #[serde(rename = "safety.preflight")]
    SafetyPreflight,

    /// Emergency stop with an optional mode override.
    #[serde(rename = "safety.emergency_stop")]
    SafetyEmergencyStop {
        #[serde(default)]
        mode: Option<EmergencyMode>,
    },

    /// Clear an emergency or fault state.
    #[serde(rename = "safety.reset")]
    SafetyReset,

    /// Start a preset.
    #[serde(rename = "preset.play")]
    PresetPlay {
        name: String,
        #[serde(default)]
        targets: Option<Vec<String>>,
        #[serde(default)]
        rate: Option<f64>,
        #[serde(rename = "loop", default)]
        loop_enabled: Option<bool>,
    },

    /// Stop a preset.
    #[serde(rename = "preset.stop")]
    PresetStop { name: String },

    /// Pause a preset.
    #[serde(rename = "preset.pause")]
    PresetPause { name: String },

    /// Resume a paused preset.
    #[serde(rename = "preset.resume")]
    PresetResume { name: String },

    /// Stop every running preset.
    #[serde(rename = "preset.stop_all")]
    PresetStopAll,

    /// Define a custom preset.
    #[serde(rename = "preset.define")]
    PresetDefine {
        name: String,
        targets: Vec<String>,
        kind: PresetKind,
        #[serde(default)]
        params: PresetParams,
    },

    /// Create a timeline.
    #[serde(rename = "timeline.new")]
    TimelineNew {
        name: String,
        #[serde(default)]
        fps: Option<f64>,
        #[serde(default)]
        bpm: Option<f64>,
        duration_ms: f64,
    },

    /// Add a track.
    #[serde(rename = "timeline.track_add")]
    TrackAdd {
        timeline: String,
        track: String,
        target: String,
    },

    /// Add a keyframe.
    #[serde(rename = "timeline.keyframe_add")]
    KeyframeAdd {
        timeline: String,
        track: String,
        time_ms: f64,
        value: f64,
        #[serde(default)]
        ease: EaseType,
        #[serde(default)]
        tension: f64,
    },

    /// Start playback, optionally switching timelines.
    #[serde(rename = "timeline.play")]
    TimelinePlay {
        #[serde(default)]
        timeline: Option<String>,
    },

    /// Pause playback.
    #[serde(rename = "timeline.pause")]
    TimelinePause,

    /// Stop playback and reset the playhead.
    #[serde(rename = "timeline.stop")]
    TimelineStop,

    /// Move the playhead.
    #[serde(rename = "timeline.scrub")]
    TimelineScrub { time_ms: f64 },

    /// Change playback speed.
    #[serde(rename = "timeline.set_speed")]
    TimelineSetSpeed { rate: f64 },

    /// Configure the loop window.
    #[serde(rename = "timeline.loop_set")]
    TimelineLoopSet {
        timeline: String,
        enabled: bool,
        #[serde(default)]
        start_ms: f64,
        #[serde(default)]
        end_ms: Option<f64>,
    },

    /// Scrub to a marker by label.
    #[serde(rename = "timeline.jump")]
    TimelineJump { label: String },
}

/// Outcome of a dispatched command.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// Write-verb acknowledgement.
    Ack(Ack),
    /// `status` snapshot.
    Status(Box<RigStatus>),
}

impl CommandOutput {
    /// The acknowledgement, treating a status reply as success.
    pub fn ack(&self) -> Ack {
        match self {
            Self::Ack(ack) => ack.clone(),
            Self::Status(_) => Ack::ok(),
        }
    }
}

/// Dispatches [`Command`]s against a [`Rig`].
pub struct CommandProcessor {
    rig: std::sync::Arc<Rig>,
}

impl CommandProcessor {
    /// Bind the dispatcher to a rig.
    pub fn new(rig: std::sync::Arc<Rig>) -> Self {
        Self { rig }
    }

    /// Execute one verb. Validation failures come back as
    /// `Ack { success: false }`, never as a panic.
    pub fn dispatch(&self, command: Command) -> CommandOutput {
        debug!(?command, "dispatching command");
        let rig = &self.rig;

        // Every verb is operator activity; status is read-only and does
        // not count as liveness.
        if !matches!(command, Command::Status) {
            rig.safety().watchdog_pet();
        }

        match command {
            Command::Status => CommandOutput::Status(Box::new(rig.status())),

            Command::ServoRegister {
                id,
                channel,
                pin,
                orientation,
                gear_ratio,
                notes,
            } => CommandOutput::Ack(
                rig.register_servo(&id, channel, pin, orientation, gear_ratio, &notes)
                    .into(),
            ),
            Command::ServoCalibrate {
                id,
                min_us,
                max_us,
                center_deg,
            } => CommandOutput::Ack(
                rig.registry().calibrate(&id, min_us, max_us, center_deg).into(),
            ),
            Command::ServoSetLimits { id, min_deg, max_deg } => CommandOutput::Ack(
                rig.registry().set_soft_limits(&id, min_deg, max_deg).into(),
            ),
            Command::ServoSetAngle { id, angle } => {
                CommandOutput::Ack(rig.set_angle(&id, angle).map(|_| ()).into())
            }
            Command::ServoEnable { id } => CommandOutput::Ack(rig.enable_servo(&id).into()),
            Command::ServoDisable { id } => CommandOutput::Ack(rig.disable_servo(&id).into()),
            Command::ServoRename { old_id, new_id } => {
                CommandOutput::Ack(rig.registry().rename(&old_id, &new_id).into())
            }
            Command::ServoAlias { id, alias } => {
                CommandOutput::Ack(rig.registry().alias(&id, &alias).into())
            }

            Command::SafetySafePose { pose } => CommandOutput::Ack(
                rig.safety()
                    .go_safe_pose(pose.as_deref())
                    .map(|_| ())
                    .into(),
            ),
            Command::SafetyPreflight => {
                // Best-effort: the report itself carries the outcome.
                let report = rig.safety().preflight();
                debug!(status = ?report.overall_status, "preflight dispatched");
                CommandOutput::Ack(Ack::ok())
            }
            Command::SafetyEmergencyStop { mode } => {
                CommandOutput::Ack(rig.safety().emergency_stop(mode, None).into())
            }
            Command::SafetyReset => CommandOutput::Ack(rig.safety().reset().into()),

            Command::PresetPlay {
                name,
                targets,
                rate,
                loop_enabled,
            } => CommandOutput::Ack(
                rig.presets().play(&name, targets, rate, loop_enabled).into(),
            ),
            Command::PresetStop { name } => CommandOutput::Ack(rig.presets().stop(&name).into()),
            Command::PresetPause { name } => CommandOutput::Ack(rig.presets().pause(&name).into()),
            Command::PresetResume { name } => {
                CommandOutput::Ack(rig.presets().resume(&name).into())
            }
            Command::PresetStopAll => {
                rig.presets().stop_all();
                CommandOutput::Ack(Ack::ok())
            }
            Command::PresetDefine {
                name,
                targets,
                kind,
                params,
            } => CommandOutput::Ack(rig.presets().define(&name, targets, kind, params).into()),

            Command::TimelineNew {
                name,
                fps,
                bpm,
                duration_ms,
            } => CommandOutput::Ack(
                rig.timeline().timeline_new(&name, fps, bpm, duration_ms).into(),
            ),
            Command::TrackAdd {
                timeline,
                track,
                target,
            } => CommandOutput::Ack(rig.timeline().track_add(&timeline, &track, &target).into()),
            Command::KeyframeAdd {
                timeline,
                track,
                time_ms,
                value,
                ease,
                tension,
            } => CommandOutput::Ack(
                rig.timeline()
                    .keyframe_add(&timeline, &track, time_ms, value, ease, tension)
                    .into(),
            ),
            Command::TimelinePlay { timeline } => {
                CommandOutput::Ack(rig.timeline().play(timeline.as_deref()).into())
            }
            Command::TimelinePause => CommandOutput::Ack(rig.timeline().pause().into()),
            Command::TimelineStop => CommandOutput::Ack(rig.timeline().stop().into()),
            Command::TimelineScrub { time_ms } => {
                CommandOutput::Ack(rig.timeline().scrub(time_ms).into())
            }
            Command::TimelineSetSpeed { rate } => {
                CommandOutput::Ack(rig.timeline().set_speed(rate).into())
            }
            Command::TimelineLoopSet {
                timeline,
                enabled,
                start_ms,
                end_ms,
            } => CommandOutput::Ack(
                rig.timeline()
                    .loop_set(&timeline, enabled, start_ms, end_ms)
                    .into(),
            ),
            Command::TimelineJump { label } => {
                CommandOutput::Ack(rig.timeline().jump(&label).into())
            }
        }
    }
}
