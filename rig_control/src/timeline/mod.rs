//! Timeline engine: multi-track keyframe playback, editing and live
//! recording.
//!
//! The transport runs at 60 Hz and derives `current_time_ms` from the wall
//! clock, not the tick count, so a stretched tick drifts the playhead
//! forward consistently instead of slowing the animation. Rendering goes
//! through the same clamp→orient→driver path as everything else;
//! last-writer-wins against the preset engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use rig_common::easing::{self, EaseType};
use rig_common::error::{RigError, RigResult};
use rig_common::events::{Event, EventBus};
use rig_common::timeline::{Keyframe, Marker, Timeline, TimelineState, Track};

use crate::join_with_timeout;
use crate::output::OutputStage;

/// Update cadence of the transport ticker (60 Hz).
pub const TIMELINE_TICK: Duration = Duration::from_micros(16_666);

/// Interpolate a track's value at `time_ms`.
///
/// Before the first keyframe the value holds at `keyframes[0].value`, after
/// the last at the final value. Between a bracketing pair the normalized
/// parameter is shaped by the destination keyframe's easing. Returns `None`
/// for an empty track.
pub fn interpolate_track(track: &Track, time_ms: f64) -> Option<f64> {
    let keyframes = &track.keyframes;
    let first = keyframes.first()?;
    let last = keyframes.last()?;

    if time_ms <= first.time_ms {
        return Some(first.value);
    }
    if time_ms >= last.time_ms {
        return Some(last.value);
    }

    for pair in keyframes.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.time_ms <= time_ms && time_ms <= b.time_ms {
            if b.time_ms == a.time_ms {
                // Tied keyframes read as a step to the later one.
                return Some(b.value);
            }
            let u = (time_ms - a.time_ms) / (b.time_ms - a.time_ms);
            let eased = easing::apply(b.ease, u, b.tension, b.bezier_cp1, b.bezier_cp2);
            return Some(a.value + (b.value - a.value) * eased);
        }
    }
    None
}

struct Transport {
    state: TimelineState,
    current_time_ms: f64,
    speed: f64,
    /// Wall-clock anchor while playing.
    anchor: Option<Instant>,
    /// Timeline position at the anchor [ms].
    anchor_ms: f64,
}

impl Transport {
    fn new() -> Self {
        Self {
            state: TimelineState::Stopped,
            current_time_ms: 0.0,
            speed: 1.0,
            anchor: None,
            anchor_ms: 0.0,
        }
    }

    /// Playhead position derived from the wall clock while playing.
    fn position_ms(&self) -> f64 {
        match self.anchor {
            Some(anchor) => {
                self.anchor_ms + anchor.elapsed().as_secs_f64() * 1000.0 * self.speed
            }
            None => self.current_time_ms,
        }
    }

    fn rebase(&mut self, position_ms: f64) {
        self.current_time_ms = position_ms;
        self.anchor_ms = position_ms;
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }
}

struct Quantize {
    enabled: bool,
    grid_ms: f64,
}

struct RecordSession {
    started: Instant,
    /// `(timeline track name, servo target)` pairs being captured.
    tracks: Vec<(String, String)>,
}

/// Timeline storage plus the 60 Hz transport.
pub struct TimelineEngine {
    output: Arc<OutputStage>,
    events: Arc<EventBus>,
    timelines: RwLock<HashMap<String, Timeline>>,
    active: RwLock<Option<String>>,
    transport: Mutex<Transport>,
    quantize: Mutex<Quantize>,
    record: Mutex<Option<RecordSession>>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimelineEngine {
    /// Engine with no timelines and a stopped transport.
    pub fn new(output: Arc<OutputStage>, events: Arc<EventBus>) -> Self {
        Self {
            output,
            events,
            timelines: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            transport: Mutex::new(Transport::new()),
            quantize: Mutex::new(Quantize {
                enabled: false,
                grid_ms: 100.0,
            }),
            record: Mutex::new(None),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    // ── Editing ─────────────────────────────────────────────────────

    /// Create a timeline. The first one becomes active.
    pub fn timeline_new(
        &self,
        name: &str,
        fps: Option<f64>,
        bpm: Option<f64>,
        duration_ms: f64,
    ) -> RigResult<()> {
        let mut timelines = self.timelines.write();
        if timelines.contains_key(name) {
            return Err(RigError::Duplicate {
                kind: "timeline",
                name: name.to_string(),
            });
        }
        let timeline = Timeline::new(name, fps, bpm, duration_ms)?;
        info!(name, duration_ms, "created timeline");
        timelines.insert(name.to_string(), timeline);
        drop(timelines);

        let mut active = self.active.write();
        if active.is_none() {
            *active = Some(name.to_string());
        }
        Ok(())
    }

    /// Add a track driving `target`. Unknown targets warn but succeed.
    pub fn track_add(&self, timeline: &str, track_name: &str, target: &str) -> RigResult<()> {
        if self.output.registry().resolve(target).is_none() {
            warn!(timeline, track_name, target, "track target not in registry");
        }
        let mut timelines = self.timelines.write();
        let tl = timelines.get_mut(timeline).ok_or_else(|| RigError::NotFound {
            kind: "timeline",
            name: timeline.to_string(),
        })?;
        if tl.track(track_name).is_some() {
            return Err(RigError::Duplicate {
                kind: "track",
                name: track_name.to_string(),
            });
        }
        tl.tracks.push(Track::new(track_name, target));
        info!(timeline, track_name, target, "added track");
        Ok(())
    }

    /// Insert a keyframe, quantized when the grid is enabled and clamped to
    /// the target's soft limits when the target resolves.
    pub fn keyframe_add(
        &self,
        timeline: &str,
        track_name: &str,
        time_ms: f64,
        value: f64,
        ease: EaseType,
        tension: f64,
    ) -> RigResult<()> {
        if time_ms < 0.0 {
            return Err(RigError::OutOfRange {
                what: "time_ms",
                value: time_ms,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        let time_ms = self.quantize_time(time_ms);

        let mut timelines = self.timelines.write();
        let tl = timelines.get_mut(timeline).ok_or_else(|| RigError::NotFound {
            kind: "timeline",
            name: timeline.to_string(),
        })?;
        let track = tl.track_mut(track_name).ok_or_else(|| RigError::NotFound {
            kind: "track",
            name: track_name.to_string(),
        })?;

        let mut value = value;
        if let Some((view, _)) = self.output.registry().resolve(&track.target) {
            let clamped = view.clamp_angle(value);
            if clamped != value {
                warn!(
                    track = track_name,
                    value, clamped, "keyframe value clamped to soft limits"
                );
                value = clamped;
            }
        }

        track.insert_sorted(Keyframe::eased(time_ms, value, ease, tension));
        debug!(timeline, track_name, time_ms, value, "added keyframe");
        Ok(())
    }

    /// Enable or disable edit-time quantization.
    pub fn set_quantize(&self, enabled: bool, grid_ms: f64) -> RigResult<()> {
        if grid_ms <= 0.0 {
            return Err(RigError::OutOfRange {
                what: "quantize grid",
                value: grid_ms,
                min: f64::MIN_POSITIVE,
                max: f64::INFINITY,
            });
        }
        let mut quantize = self.quantize.lock();
        quantize.enabled = enabled;
        quantize.grid_ms = grid_ms;
        info!(enabled, grid_ms, "quantization updated");
        Ok(())
    }

    /// Round `time_ms` to the nearest grid multiple when enabled.
    pub fn quantize_time(&self, time_ms: f64) -> f64 {
        let quantize = self.quantize.lock();
        if !quantize.enabled {
            return time_ms;
        }
        (time_ms / quantize.grid_ms).round() * quantize.grid_ms
    }

    /// Remove interior keyframes within `tolerance_deg` of the linear
    /// interpolation between their preserved neighbours. First and last
    /// keyframes always survive. Returns the number removed.
    pub fn simplify_track(
        &self,
        timeline: &str,
        track_name: &str,
        tolerance_deg: f64,
    ) -> RigResult<usize> {
        let mut timelines = self.timelines.write();
        let tl = timelines.get_mut(timeline).ok_or_else(|| RigError::NotFound {
            kind: "timeline",
            name: timeline.to_string(),
        })?;
        let track = tl.track_mut(track_name).ok_or_else(|| RigError::NotFound {
            kind: "track",
            name: track_name.to_string(),
        })?;

        let keyframes = &track.keyframes;
        if keyframes.len() < 3 {
            return Ok(0);
        }

        let original = keyframes.len();
        let mut kept: Vec<Keyframe> = vec![keyframes[0].clone()];
        for i in 1..keyframes.len() - 1 {
            let prev = kept.last().expect("kept is never empty");
            let current = &keyframes[i];
            let next = &keyframes[i + 1];

            let span = next.time_ms - prev.time_ms;
            if span <= 0.0 {
                kept.push(current.clone());
                continue;
            }
            let ratio = (current.time_ms - prev.time_ms) / span;
            let interpolated = prev.value + (next.value - prev.value) * ratio;
            if (current.value - interpolated).abs() > tolerance_deg {
                kept.push(current.clone());
            }
        }
        kept.push(keyframes[keyframes.len() - 1].clone());

        let removed = original - kept.len();
        track.keyframes = kept;
        info!(timeline, track_name, removed, "simplified track");
        Ok(removed)
    }

    /// Replace a timeline's markers. Labels must be unique.
    pub fn markers_set(&self, timeline: &str, mut markers: Vec<Marker>) -> RigResult<()> {
        for (i, marker) in markers.iter().enumerate() {
            if markers[..i].iter().any(|m| m.label == marker.label) {
                return Err(RigError::Duplicate {
                    kind: "marker",
                    name: marker.label.clone(),
                });
            }
        }
        markers.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));

        let mut timelines = self.timelines.write();
        let tl = timelines.get_mut(timeline).ok_or_else(|| RigError::NotFound {
            kind: "timeline",
            name: timeline.to_string(),
        })?;
        info!(timeline, count = markers.len(), "set markers");
        tl.markers = markers;
        Ok(())
    }

    /// Scrub to a marker on the active timeline.
    pub fn jump(&self, label: &str) -> RigResult<()> {
        let time_ms = {
            let active = self.active_name()?;
            let timelines = self.timelines.read();
            let tl = timelines.get(&active).ok_or_else(|| RigError::NotFound {
                kind: "timeline",
                name: active.clone(),
            })?;
            tl.markers
                .iter()
                .find(|m| m.label == label)
                .map(|m| m.time_ms)
                .ok_or_else(|| RigError::NotFound {
                    kind: "marker",
                    name: label.to_string(),
                })?
        };
        self.scrub(time_ms)
    }

    /// Set the loop window on a timeline.
    pub fn loop_set(
        &self,
        timeline: &str,
        enabled: bool,
        start_ms: f64,
        end_ms: Option<f64>,
    ) -> RigResult<()> {
        let mut timelines = self.timelines.write();
        let tl = timelines.get_mut(timeline).ok_or_else(|| RigError::NotFound {
            kind: "timeline",
            name: timeline.to_string(),
        })?;
        let end_ms = end_ms.unwrap_or(tl.duration_ms);
        tl.validate_loop(start_ms, end_ms)?;
        tl.loop_enabled = enabled;
        tl.loop_start_ms = start_ms;
        tl.loop_end_ms = end_ms;
        info!(timeline, enabled, start_ms, end_ms, "loop updated");
        Ok(())
    }

    // ── Transport ───────────────────────────────────────────────────

    /// Transport state.
    pub fn state(&self) -> TimelineState {
        self.transport.lock().state
    }

    /// Playhead position [ms].
    pub fn current_time_ms(&self) -> f64 {
        self.transport.lock().position_ms()
    }

    /// Playback speed multiplier.
    pub fn speed(&self) -> f64 {
        self.transport.lock().speed
    }

    /// Active timeline name.
    pub fn active(&self) -> Option<String> {
        self.active.read().clone()
    }

    fn active_name(&self) -> RigResult<String> {
        self.active
            .read()
            .clone()
            .ok_or_else(|| RigError::InvalidTransition("no active timeline".to_string()))
    }

    /// Start playback, optionally switching the active timeline.
    pub fn play(&self, timeline: Option<&str>) -> RigResult<()> {
        if let Some(name) = timeline {
            if !self.timelines.read().contains_key(name) {
                return Err(RigError::NotFound {
                    kind: "timeline",
                    name: name.to_string(),
                });
            }
            *self.active.write() = Some(name.to_string());
        }
        let active = self.active_name()?;

        let position = {
            let mut transport = self.transport.lock();
            transport.anchor_ms = transport.current_time_ms;
            transport.anchor = Some(Instant::now());
            transport.state = TimelineState::Playing;
            transport.current_time_ms
        };
        info!(timeline = %active, from_ms = position, "timeline playing");
        self.emit_transport(TimelineState::Playing, position);
        Ok(())
    }

    /// Pause playback, keeping the playhead position.
    pub fn pause(&self) -> RigResult<()> {
        let position = {
            let mut transport = self.transport.lock();
            if transport.state != TimelineState::Playing {
                return Err(RigError::InvalidTransition(format!(
                    "cannot pause from {:?}",
                    transport.state
                )));
            }
            let position = transport.position_ms();
            transport.current_time_ms = position;
            transport.anchor = None;
            transport.state = TimelineState::Paused;
            position
        };
        info!(at_ms = position, "timeline paused");
        self.emit_transport(TimelineState::Paused, position);
        Ok(())
    }

    /// Stop playback and reset the playhead to zero.
    pub fn stop(&self) -> RigResult<()> {
        {
            let mut transport = self.transport.lock();
            transport.state = TimelineState::Stopped;
            transport.current_time_ms = 0.0;
            transport.anchor = None;
            transport.anchor_ms = 0.0;
        }
        *self.record.lock() = None;
        info!("timeline stopped");
        self.emit_transport(TimelineState::Stopped, 0.0);
        Ok(())
    }

    /// Move the playhead to `time_ms`, clamped to the active timeline's
    /// duration. When not playing, servo positions are recomputed at the
    /// new time.
    pub fn scrub(&self, time_ms: f64) -> RigResult<()> {
        let active = self.active_name()?;
        let duration = {
            let timelines = self.timelines.read();
            timelines
                .get(&active)
                .ok_or_else(|| RigError::NotFound {
                    kind: "timeline",
                    name: active.clone(),
                })?
                .duration_ms
        };
        let clamped = time_ms.clamp(0.0, duration);

        let render = {
            let mut transport = self.transport.lock();
            transport.rebase(clamped);
            transport.state != TimelineState::Playing
        };
        if render {
            self.render_at(&active, clamped);
        }
        self.emit_transport(self.state(), clamped);
        Ok(())
    }

    /// Change the playback speed, preserving the playhead position.
    pub fn set_speed(&self, rate: f64) -> RigResult<()> {
        if rate <= 0.0 {
            return Err(RigError::OutOfRange {
                what: "speed",
                value: rate,
                min: f64::MIN_POSITIVE,
                max: f64::INFINITY,
            });
        }
        let mut transport = self.transport.lock();
        let position = transport.position_ms();
        transport.rebase(position);
        transport.speed = rate;
        info!(rate, "playback speed changed");
        Ok(())
    }

    // ── Live recording ──────────────────────────────────────────────

    /// Start capturing live keyframes for `targets` into `{target}_live`
    /// tracks on the active timeline.
    pub fn record_live_start(&self, targets: &[String]) -> RigResult<()> {
        let active = self.active_name()?;
        let mut session_tracks = Vec::new();
        {
            let mut timelines = self.timelines.write();
            let tl = timelines.get_mut(&active).ok_or_else(|| RigError::NotFound {
                kind: "timeline",
                name: active.clone(),
            })?;
            for target in targets {
                let existing = tl
                    .tracks
                    .iter()
                    .find(|t| &t.target == target)
                    .map(|t| t.name.clone());
                let track_name = match existing {
                    Some(name) => name,
                    None => {
                        let name = format!("{target}_live");
                        if tl.track(&name).is_some() {
                            warn!(%target, track = %name, "live track name collision, skipping");
                            continue;
                        }
                        tl.tracks.push(Track::new(name.clone(), target.clone()));
                        name
                    }
                };
                session_tracks.push((track_name, target.clone()));
            }
        }

        if session_tracks.is_empty() {
            return Err(RigError::InvalidTransition(
                "no recordable targets".to_string(),
            ));
        }

        info!(targets = session_tracks.len(), "live recording started");
        *self.record.lock() = Some(RecordSession {
            started: Instant::now(),
            tracks: session_tracks,
        });
        self.transport.lock().state = TimelineState::Recording;
        self.emit_transport(TimelineState::Recording, 0.0);
        Ok(())
    }

    /// Stop recording. Returns the number of keyframes captured across
    /// the session's tracks.
    pub fn record_live_stop(&self) -> RigResult<usize> {
        {
            let transport = self.transport.lock();
            if transport.state != TimelineState::Recording {
                return Err(RigError::InvalidTransition(format!(
                    "cannot stop recording from {:?}",
                    transport.state
                )));
            }
        }
        let session = self.record.lock().take();
        let mut captured = 0;
        if let Some(session) = session {
            if let Ok(active) = self.active_name() {
                let timelines = self.timelines.read();
                if let Some(tl) = timelines.get(&active) {
                    for (track_name, _) in &session.tracks {
                        if let Some(track) = tl.track(track_name) {
                            captured += track.keyframes.len();
                        }
                    }
                }
            }
        }
        {
            let mut transport = self.transport.lock();
            transport.state = TimelineState::Stopped;
            transport.current_time_ms = 0.0;
            transport.anchor = None;
        }
        info!(captured, "live recording stopped");
        self.emit_transport(TimelineState::Stopped, 0.0);
        Ok(captured)
    }

    fn record_tick(&self) {
        let record = self.record.lock();
        let Some(session) = record.as_ref() else {
            return;
        };
        let time_ms = session.started.elapsed().as_secs_f64() * 1000.0;
        let Ok(active) = self.active_name() else {
            return;
        };

        let mut timelines = self.timelines.write();
        let Some(tl) = timelines.get_mut(&active) else {
            return;
        };
        for (track_name, target) in &session.tracks {
            let Some((view, _)) = self.output.registry().resolve(target) else {
                continue;
            };
            let value = view.angles.current();
            if let Some(track) = tl.track_mut(track_name) {
                track.insert_sorted(Keyframe::linear(time_ms, value));
            }
        }
    }

    // ── Ticking & rendering ─────────────────────────────────────────

    /// One transport tick: advance the playhead, handle looping and the
    /// end of the timeline, render, or capture live keyframes.
    pub fn tick(&self) {
        let state = self.state();
        match state {
            TimelineState::Playing => self.playback_tick(),
            TimelineState::Recording => self.record_tick(),
            TimelineState::Stopped | TimelineState::Paused => {}
        }
    }

    fn playback_tick(&self) {
        let Ok(active) = self.active_name() else {
            return;
        };
        let (loop_enabled, loop_start, loop_end, duration) = {
            let timelines = self.timelines.read();
            let Some(tl) = timelines.get(&active) else {
                return;
            };
            (tl.loop_enabled, tl.loop_start_ms, tl.loop_end_ms, tl.duration_ms)
        };

        let mut finished = false;
        let position = {
            let mut transport = self.transport.lock();
            if transport.state != TimelineState::Playing {
                return;
            }
            let mut position = transport.position_ms();
            if loop_enabled {
                if position >= loop_end && loop_end > loop_start {
                    // Snap to the loop start and rebase the wall clock.
                    position = loop_start;
                    transport.rebase(loop_start);
                }
            } else if position >= duration {
                transport.state = TimelineState::Stopped;
                transport.current_time_ms = 0.0;
                transport.anchor = None;
                finished = true;
            }
            transport.current_time_ms = position;
            position
        };

        if finished {
            info!(timeline = %active, "timeline finished");
            self.emit_transport(TimelineState::Stopped, 0.0);
            return;
        }
        self.render_at(&active, position);
    }

    /// Render every eligible track of `timeline` at `time_ms`.
    fn render_at(&self, timeline: &str, time_ms: f64) {
        let timelines = self.timelines.read();
        let Some(tl) = timelines.get(timeline) else {
            return;
        };

        let any_solo = tl.tracks.iter().any(|t| t.solo && t.enabled);
        for track in &tl.tracks {
            if !track.enabled || track.muted || (any_solo && !track.solo) {
                continue;
            }
            let Some(value) = interpolate_track(track, time_ms) else {
                continue;
            };
            let Some((view, _)) = self.output.registry().resolve(&track.target) else {
                continue;
            };
            if let Err(e) = self.output.drive_if_enabled(&view, value) {
                debug!(target = %track.target, error = %e, "timeline write failed");
            }
        }
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Timeline names, sorted.
    pub fn timeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timelines.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Clone of one timeline.
    pub fn timeline(&self, name: &str) -> Option<Timeline> {
        self.timelines.read().get(name).cloned()
    }

    /// Quantization settings `(enabled, grid_ms)`.
    pub fn quantize_settings(&self) -> (bool, f64) {
        let quantize = self.quantize.lock();
        (quantize.enabled, quantize.grid_ms)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start the 60 Hz transport thread.
    pub fn spawn(self: Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let engine = Arc::clone(&self);
        let handle = std::thread::Builder::new()
            .name("timeline-transport".into())
            .spawn(move || {
                while engine.running.load(Ordering::Acquire) {
                    std::thread::sleep(TIMELINE_TICK);
                    engine.tick();
                }
            })
            .expect("spawn timeline transport thread");
        *self.thread.lock() = Some(handle);
        info!("timeline transport started");
    }

    /// Stop the transport thread.
    pub fn cleanup(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            join_with_timeout(handle, Duration::from_secs(2), "timeline-transport");
        }
        let _ = self.stop();
        info!("timeline engine stopped");
    }

    fn emit_transport(&self, state: TimelineState, time_ms: f64) {
        self.events.emit(&Event::TimelineStatus { state, time_ms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_common::servo::ServoOrientation;
    use rig_hal::{ServoBus, SimDriver, SimState};

    use crate::registry::ServoRegistry;

    fn engine() -> (Arc<TimelineEngine>, Arc<SimState>, Arc<OutputStage>) {
        let sim = SimDriver::new();
        let probe = sim.state();
        let bus = Arc::new(ServoBus::new(Box::new(sim)));
        let registry = Arc::new(ServoRegistry::in_memory());
        let output = Arc::new(OutputStage::new(registry, bus));
        let events = Arc::new(EventBus::new());
        let engine = Arc::new(TimelineEngine::new(Arc::clone(&output), events));
        (engine, probe, output)
    }

    fn enabled_servo(output: &OutputStage, id: &str, channel: u8) {
        output
            .registry()
            .register(id, channel, None, ServoOrientation::Normal, 1.0, "")
            .unwrap();
        output.drive_by_identifier(id, 90.0).unwrap();
    }

    fn linear_track(engine: &TimelineEngine, timeline: &str, track: &str, target: &str) {
        engine.timeline_new(timeline, None, None, 1000.0).unwrap();
        engine.track_add(timeline, track, target).unwrap();
    }

    #[test]
    fn duplicate_timelines_and_tracks_are_rejected() {
        let (engine, _, _) = engine();
        engine.timeline_new("a", None, None, 1000.0).unwrap();
        assert!(matches!(
            engine.timeline_new("a", None, None, 500.0),
            Err(RigError::Duplicate { .. })
        ));

        engine.track_add("a", "t", "jaw").unwrap();
        assert!(matches!(
            engine.track_add("a", "t", "jaw"),
            Err(RigError::Duplicate { .. })
        ));
        assert!(matches!(
            engine.track_add("missing", "t", "jaw"),
            Err(RigError::NotFound { .. })
        ));
    }

    #[test]
    fn interpolation_holds_outside_the_keyframe_span() {
        let mut track = Track::new("t", "jaw");
        track.insert_sorted(Keyframe::linear(100.0, 50.0));
        track.insert_sorted(Keyframe::linear(200.0, 70.0));

        assert_eq!(interpolate_track(&track, 0.0), Some(50.0));
        assert_eq!(interpolate_track(&track, 500.0), Some(70.0));
        assert_eq!(interpolate_track(&track, 150.0), Some(60.0));
        assert_eq!(interpolate_track(&Track::new("e", "x"), 0.0), None);
    }

    #[test]
    fn interpolation_is_continuous_at_interior_keyframes() {
        let mut track = Track::new("t", "jaw");
        track.insert_sorted(Keyframe::linear(0.0, 10.0));
        track.insert_sorted(Keyframe::eased(400.0, 80.0, EaseType::EaseInOut, 0.5));
        track.insert_sorted(Keyframe::eased(1000.0, 30.0, EaseType::Bounce, 0.0));

        for kf_time in [400.0, 1000.0] {
            let at = interpolate_track(&track, kf_time).unwrap();
            let just_before = interpolate_track(&track, kf_time - 1e-6).unwrap();
            assert!(
                (at - just_before).abs() < 1e-3,
                "discontinuity at {kf_time}: {just_before} vs {at}"
            );
        }
    }

    #[test]
    fn ease_in_out_midpoint_matches_the_linear_midpoint() {
        let mut track = Track::new("t", "jaw");
        track.insert_sorted(Keyframe::linear(0.0, 60.0));
        track.insert_sorted(Keyframe::eased(1000.0, 120.0, EaseType::EaseInOut, 0.0));
        assert_eq!(interpolate_track(&track, 500.0), Some(90.0));
    }

    #[test]
    fn keyframes_clamp_to_servo_soft_limits() {
        let (engine, _, output) = engine();
        enabled_servo(&output, "jaw", 0);
        output.registry().set_soft_limits("jaw", 60.0, 120.0).unwrap();
        linear_track(&engine, "a", "t", "jaw");

        engine
            .keyframe_add("a", "t", 0.0, 200.0, EaseType::Linear, 0.0)
            .unwrap();
        let tl = engine.timeline("a").unwrap();
        assert_eq!(tl.track("t").unwrap().keyframes[0].value, 120.0);
    }

    #[test]
    fn negative_keyframe_time_is_rejected() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        assert!(matches!(
            engine.keyframe_add("a", "t", -5.0, 90.0, EaseType::Linear, 0.0),
            Err(RigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn quantize_rounds_to_nearest_grid_and_is_idempotent() {
        let (engine, _, _) = engine();
        engine.set_quantize(true, 100.0).unwrap();

        assert_eq!(engine.quantize_time(149.0), 100.0);
        assert_eq!(engine.quantize_time(150.0), 200.0);
        assert_eq!(engine.quantize_time(0.0), 0.0);
        for t in [0.0, 37.0, 149.0, 150.0, 951.0] {
            let once = engine.quantize_time(t);
            assert_eq!(engine.quantize_time(once), once);
        }

        engine.set_quantize(false, 100.0).unwrap();
        assert_eq!(engine.quantize_time(149.0), 149.0);
        assert!(engine.set_quantize(true, 0.0).is_err());
    }

    #[test]
    fn simplify_removes_collinear_interior_keyframes() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        for (time, value) in [(0.0, 0.0), (250.0, 25.0), (500.0, 50.0), (750.0, 74.0), (1000.0, 100.0)] {
            engine
                .keyframe_add("a", "t", time, value, EaseType::Linear, 0.0)
                .unwrap();
        }

        let removed = engine.simplify_track("a", "t", 2.0).unwrap();
        assert_eq!(removed, 3);

        let tl = engine.timeline("a").unwrap();
        let kfs = &tl.track("t").unwrap().keyframes;
        assert_eq!(kfs.first().unwrap().time_ms, 0.0);
        assert_eq!(kfs.last().unwrap().time_ms, 1000.0);
    }

    #[test]
    fn simplify_round_trip_property() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        let originals = [
            (0.0, 0.0),
            (100.0, 12.0),
            (200.0, 18.0),
            (300.0, 45.0),
            (400.0, 46.0),
            (500.0, 90.0),
        ];
        for (time, value) in originals {
            engine
                .keyframe_add("a", "t", time, value, EaseType::Linear, 0.0)
                .unwrap();
        }
        let tolerance = 5.0;
        engine.simplify_track("a", "t", tolerance).unwrap();

        let tl = engine.timeline("a").unwrap();
        let track = tl.track("t").unwrap();
        // Every original sample still reconstructs within tolerance of the
        // simplified polyline (plus interpolation slack between survivors).
        for (time, value) in originals {
            let rebuilt = interpolate_track(track, time).unwrap();
            assert!(
                (rebuilt - value).abs() <= tolerance + 1e-9,
                "at {time} ms: {rebuilt} vs {value}"
            );
        }
    }

    #[test]
    fn markers_must_have_unique_labels() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        let marker = |time_ms: f64, label: &str| Marker {
            time_ms,
            label: label.to_string(),
            color: "#FF6B6B".to_string(),
        };
        assert!(matches!(
            engine.markers_set("a", vec![marker(0.0, "x"), marker(10.0, "x")]),
            Err(RigError::Duplicate { .. })
        ));
        engine
            .markers_set("a", vec![marker(500.0, "mid"), marker(0.0, "start")])
            .unwrap();
        let tl = engine.timeline("a").unwrap();
        assert_eq!(tl.markers[0].label, "start");
    }

    #[test]
    fn jump_scrubs_to_the_marker() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        engine
            .markers_set(
                "a",
                vec![Marker {
                    time_ms: 640.0,
                    label: "hit".to_string(),
                    color: "#FF6B6B".to_string(),
                }],
            )
            .unwrap();

        engine.jump("hit").unwrap();
        assert_eq!(engine.current_time_ms(), 640.0);
        assert!(matches!(engine.jump("nope"), Err(RigError::NotFound { .. })));
    }

    #[test]
    fn scrub_renders_positions_while_stopped() {
        let (engine, probe, output) = engine();
        enabled_servo(&output, "jaw", 0);
        linear_track(&engine, "a", "t", "jaw");
        engine.keyframe_add("a", "t", 0.0, 60.0, EaseType::Linear, 0.0).unwrap();
        engine
            .keyframe_add("a", "t", 1000.0, 120.0, EaseType::Linear, 0.0)
            .unwrap();

        engine.scrub(500.0).unwrap();

        // 90° over default 750-2250 calibration -> 1500 µs.
        assert_eq!(probe.last_pulse_us(0), Some(1500));
        assert_eq!(engine.current_time_ms(), 500.0);

        // Scrub clamps to the duration.
        engine.scrub(5000.0).unwrap();
        assert_eq!(engine.current_time_ms(), 1000.0);
    }

    #[test]
    fn transport_state_machine() {
        let (engine, _, _) = engine();
        assert!(matches!(engine.play(None), Err(RigError::InvalidTransition(_))));
        assert!(matches!(engine.pause(), Err(RigError::InvalidTransition(_))));

        linear_track(&engine, "a", "t", "jaw");
        engine.play(None).unwrap();
        assert_eq!(engine.state(), TimelineState::Playing);
        engine.pause().unwrap();
        assert_eq!(engine.state(), TimelineState::Paused);
        engine.play(None).unwrap();
        engine.stop().unwrap();
        assert_eq!(engine.state(), TimelineState::Stopped);
        assert_eq!(engine.current_time_ms(), 0.0);
    }

    #[test]
    fn set_speed_preserves_the_playhead() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        engine.scrub(500.0).unwrap();
        engine.set_speed(4.0).unwrap();
        assert_eq!(engine.current_time_ms(), 500.0);
        assert_eq!(engine.speed(), 4.0);
        assert!(engine.set_speed(0.0).is_err());
        assert!(engine.set_speed(-1.0).is_err());
    }

    #[test]
    fn non_looping_playback_stops_at_the_end() {
        let (engine, _, _) = engine();
        engine.timeline_new("short", None, None, 50.0).unwrap();
        engine.play(Some("short")).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        engine.tick();
        assert_eq!(engine.state(), TimelineState::Stopped);
        assert_eq!(engine.current_time_ms(), 0.0);
    }

    #[test]
    fn looping_playback_snaps_to_the_loop_start() {
        let (engine, _, _) = engine();
        engine.timeline_new("looped", None, None, 1000.0).unwrap();
        engine.loop_set("looped", true, 0.0, Some(100.0)).unwrap();
        engine.play(Some("looped")).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        engine.tick();
        assert_eq!(engine.state(), TimelineState::Playing);
        // Snapped back inside the loop window.
        assert!(engine.current_time_ms() < 100.0);
    }

    #[test]
    fn loop_window_is_validated() {
        let (engine, _, _) = engine();
        linear_track(&engine, "a", "t", "jaw");
        assert!(engine.loop_set("a", true, 500.0, Some(400.0)).is_err());
        assert!(engine.loop_set("a", true, 0.0, Some(2000.0)).is_err());
        assert!(engine.loop_set("a", true, 0.0, None).is_ok());
    }

    #[test]
    fn solo_gates_rendering_to_solo_tracks() {
        let (engine, probe, output) = engine();
        enabled_servo(&output, "jaw", 0);
        enabled_servo(&output, "brow", 1);
        engine.timeline_new("a", None, None, 1000.0).unwrap();
        engine.track_add("a", "jaw_track", "jaw").unwrap();
        engine.track_add("a", "brow_track", "brow").unwrap();
        engine.keyframe_add("a", "jaw_track", 0.0, 10.0, EaseType::Linear, 0.0).unwrap();
        engine
            .keyframe_add("a", "brow_track", 0.0, 170.0, EaseType::Linear, 0.0)
            .unwrap();

        // Solo the brow track; the jaw track must not render.
        {
            let mut timelines = engine.timelines.write();
            timelines.get_mut("a").unwrap().track_mut("brow_track").unwrap().solo = true;
        }
        let jaw_before = probe.last_pulse_us(0);
        engine.scrub(0.0).unwrap();
        assert_eq!(probe.last_pulse_us(0), jaw_before);
        assert_ne!(probe.last_pulse_us(1), jaw_before);
    }

    #[test]
    fn muted_tracks_do_not_render() {
        let (engine, probe, output) = engine();
        enabled_servo(&output, "jaw", 0);
        engine.timeline_new("a", None, None, 1000.0).unwrap();
        engine.track_add("a", "t", "jaw").unwrap();
        engine.keyframe_add("a", "t", 0.0, 10.0, EaseType::Linear, 0.0).unwrap();
        {
            let mut timelines = engine.timelines.write();
            timelines.get_mut("a").unwrap().track_mut("t").unwrap().muted = true;
        }
        let before = probe.write_count();
        engine.scrub(0.0).unwrap();
        assert_eq!(probe.write_count(), before);
    }

    #[test]
    fn live_recording_captures_current_angles() {
        let (engine, _, output) = engine();
        enabled_servo(&output, "jaw", 0);
        engine.timeline_new("a", None, None, 10_000.0).unwrap();

        engine.record_live_start(&["jaw".to_string()]).unwrap();
        assert_eq!(engine.state(), TimelineState::Recording);

        output.drive_by_identifier("jaw", 100.0).unwrap();
        engine.tick();
        std::thread::sleep(Duration::from_millis(20));
        output.drive_by_identifier("jaw", 110.0).unwrap();
        engine.tick();

        let captured = engine.record_live_stop().unwrap();
        assert_eq!(captured, 2);
        assert_eq!(engine.state(), TimelineState::Stopped);

        let tl = engine.timeline("a").unwrap();
        let track = tl.track("jaw_live").unwrap();
        assert_eq!(track.keyframes.len(), 2);
        assert!(track.keyframes[0].time_ms <= track.keyframes[1].time_ms);
        assert_eq!(track.keyframes[0].value, 100.0);
        assert_eq!(track.keyframes[1].value, 110.0);
    }

    #[test]
    fn record_stop_requires_recording_state() {
        let (engine, _, _) = engine();
        assert!(matches!(
            engine.record_live_stop(),
            Err(RigError::InvalidTransition(_))
        ));
    }

    #[test]
    fn record_reuses_an_existing_track_for_the_target() {
        let (engine, _, output) = engine();
        enabled_servo(&output, "jaw", 0);
        engine.timeline_new("a", None, None, 10_000.0).unwrap();
        engine.track_add("a", "jaw_main", "jaw").unwrap();

        engine.record_live_start(&["jaw".to_string()]).unwrap();
        engine.tick();
        engine.record_live_stop().unwrap();

        let tl = engine.timeline("a").unwrap();
        // No new _live track; the existing one captured the keyframe.
        assert!(tl.track("jaw_live").is_none());
        assert_eq!(tl.track("jaw_main").unwrap().keyframes.len(), 1);
    }
}
