//! Preset engine: procedural motion over subscribed servo targets.
//!
//! One background ticker at 30 Hz updates every running, non-paused
//! instance with the wall-clock delta since the previous tick and writes
//! the result through the clamp→orient→driver path. Writes are
//! last-writer-wins against the timeline engine, with no arbitration.

pub mod generators;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use rig_common::error::{RigError, RigResult};
use rig_common::events::{Event, EventBus};
use rig_common::preset::{PresetKind, PresetParams};

use crate::join_with_timeout;
use crate::output::OutputStage;
use generators::{GeneratorState, TargetState, init_state, next_angle};

/// Update cadence of the preset ticker (30 Hz).
pub const PRESET_TICK: Duration = Duration::from_micros(33_333);

/// Reusable preset recipe: a generator plus parameter defaults.
#[derive(Clone)]
pub struct PresetDefinition {
    /// Generator family.
    pub kind: PresetKind,
    /// Parameter defaults applied at play time.
    pub params: PresetParams,
    /// Targets used when `play` gets none.
    pub default_targets: Vec<String>,
    /// Operator description.
    pub description: String,
}

/// A running preset: definition snapshot plus live per-target state.
pub struct PresetInstance {
    /// Instance name (same as the definition that spawned it).
    pub name: String,
    /// Generator family.
    pub kind: PresetKind,
    /// Effective parameters (rate/loop overrides applied).
    pub params: PresetParams,
    started: Instant,
    /// Cleared by `stop`; a stopped instance is removed on the next sweep.
    pub running: bool,
    /// Paused instances produce no driver writes.
    pub paused: bool,
    rng: StdRng,
    targets: Vec<TargetState>,
}

impl PresetInstance {
    /// Build an instance and seed all per-target state.
    pub fn new(
        name: impl Into<String>,
        target_ids: Vec<String>,
        kind: PresetKind,
        params: PresetParams,
    ) -> Self {
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let targets = target_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| TargetState {
                id,
                position: params.center,
                state: init_state(kind, &params, index, &mut rng),
            })
            .collect();
        Self {
            name: name.into(),
            kind,
            params,
            started: Instant::now(),
            running: true,
            paused: false,
            rng,
            targets,
        }
    }

    /// Seconds since `play`.
    pub fn elapsed_s(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Subscribed target ids.
    pub fn target_ids(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.id.clone()).collect()
    }

    /// Advance every target by `dt` seconds of wall clock and return the
    /// new `(target, angle)` pairs. Paused or stopped instances return
    /// nothing.
    pub fn update(&mut self, dt_s: f64) -> Vec<(String, f64)> {
        let elapsed = self.elapsed_s();
        self.update_at(elapsed, dt_s)
    }

    /// Deterministic variant of [`update`](Self::update) with an explicit
    /// elapsed time.
    pub fn update_at(&mut self, elapsed_s: f64, dt_s: f64) -> Vec<(String, f64)> {
        if !self.running || self.paused {
            return Vec::new();
        }
        let (kind, params, rng) = (self.kind, &self.params, &mut self.rng);
        self.targets
            .iter_mut()
            .map(|target| {
                let angle = next_angle(kind, params, elapsed_s, dt_s, target, rng);
                (target.id.clone(), angle)
            })
            .collect()
    }
}

/// Engine owning the definitions, running instances and the 30 Hz ticker.
pub struct PresetEngine {
    output: Arc<OutputStage>,
    events: Arc<EventBus>,
    definitions: RwLock<HashMap<String, PresetDefinition>>,
    instances: Mutex<HashMap<String, PresetInstance>>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PresetEngine {
    /// Engine with the built-in artist definitions loaded.
    pub fn new(output: Arc<OutputStage>, events: Arc<EventBus>) -> Self {
        Self {
            output,
            events,
            definitions: RwLock::new(builtin_definitions()),
            instances: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    // ── Definitions ─────────────────────────────────────────────────

    /// Register a custom preset definition. Unknown targets are a warning,
    /// not a failure; they may be registered later.
    pub fn define(
        &self,
        name: &str,
        targets: Vec<String>,
        kind: PresetKind,
        params: PresetParams,
    ) -> RigResult<()> {
        for target in &targets {
            if self.output.registry().resolve(target).is_none() {
                warn!(preset = name, %target, "preset target not in registry");
            }
        }
        let definition = PresetDefinition {
            kind,
            params,
            default_targets: targets,
            description: format!("Custom preset: {kind:?}"),
        };
        info!(name, "created preset definition");
        self.definitions.write().insert(name.to_string(), definition);
        Ok(())
    }

    /// All known definitions, sorted by name.
    pub fn definitions(&self) -> BTreeMap<String, PresetDefinition> {
        self.definitions
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ── Playback controls ───────────────────────────────────────────

    /// Start (or restart) a preset. A prior instance under the same name
    /// is stopped first.
    pub fn play(
        &self,
        name: &str,
        targets: Option<Vec<String>>,
        rate: Option<f64>,
        loop_enabled: Option<bool>,
    ) -> RigResult<()> {
        let definition = self
            .definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RigError::NotFound {
                kind: "preset",
                name: name.to_string(),
            })?;

        let targets = targets.unwrap_or_else(|| definition.default_targets.clone());
        if targets.is_empty() {
            return Err(RigError::InvalidTransition(format!(
                "no targets specified for preset '{name}'"
            )));
        }
        for target in &targets {
            if self.output.registry().resolve(target).is_none() {
                warn!(preset = name, %target, "playing preset with unknown target");
            }
        }

        let mut params = definition.params.clone();
        if let Some(rate) = rate {
            if rate <= 0.0 {
                return Err(RigError::OutOfRange {
                    what: "rate",
                    value: rate,
                    min: f64::MIN_POSITIVE,
                    max: f64::INFINITY,
                });
            }
            params.rate = rate;
        }
        if let Some(loop_enabled) = loop_enabled {
            params.loop_enabled = loop_enabled;
        }

        let instance = PresetInstance::new(name, targets, definition.kind, params);
        info!(
            name,
            targets = instance.targets.len(),
            rate = instance.params.rate,
            "preset started"
        );
        self.instances.lock().insert(name.to_string(), instance);
        self.emit_status();
        Ok(())
    }

    /// Stop and discard a running instance.
    pub fn stop(&self, name: &str) -> RigResult<()> {
        let removed = self.instances.lock().remove(name);
        match removed {
            Some(_) => {
                info!(name, "preset stopped");
                self.emit_status();
                Ok(())
            }
            None => Err(RigError::NotFound {
                kind: "preset",
                name: name.to_string(),
            }),
        }
    }

    /// Pause a running instance in place.
    pub fn pause(&self, name: &str) -> RigResult<()> {
        let mut instances = self.instances.lock();
        let instance = instances.get_mut(name).ok_or_else(|| RigError::NotFound {
            kind: "preset",
            name: name.to_string(),
        })?;
        if instance.paused {
            return Err(RigError::InvalidTransition(format!(
                "preset '{name}' is already paused"
            )));
        }
        instance.paused = true;
        info!(name, "preset paused");
        Ok(())
    }

    /// Resume a paused instance.
    pub fn resume(&self, name: &str) -> RigResult<()> {
        let mut instances = self.instances.lock();
        let instance = instances.get_mut(name).ok_or_else(|| RigError::NotFound {
            kind: "preset",
            name: name.to_string(),
        })?;
        if !instance.paused {
            return Err(RigError::InvalidTransition(format!(
                "preset '{name}' is not paused"
            )));
        }
        instance.paused = false;
        info!(name, "preset resumed");
        Ok(())
    }

    /// Stop every running instance.
    pub fn stop_all(&self) {
        let names: Vec<String> = self.instances.lock().keys().cloned().collect();
        for name in names {
            let _ = self.stop(&name);
        }
    }

    /// Names of currently running instances, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .lock()
            .values()
            .filter(|i| i.running)
            .map(|i| i.name.clone())
            .collect();
        names.sort();
        names
    }

    // ── Ticking ─────────────────────────────────────────────────────

    /// One engine tick: advance every instance by `dt` seconds and drive
    /// the results. Per-write failures are logged; the next tick retries.
    pub fn tick(&self, dt_s: f64) {
        let mut instances = self.instances.lock();
        for instance in instances.values_mut() {
            for (target, angle) in instance.update(dt_s) {
                let Some((view, _)) = self.output.registry().resolve(&target) else {
                    continue;
                };
                if let Err(e) = self.output.drive_if_enabled(&view, angle) {
                    debug!(%target, error = %e, "preset write failed");
                }
            }
        }
    }

    /// Start the 30 Hz ticker thread.
    pub fn spawn(self: Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let engine = Arc::clone(&self);
        let handle = std::thread::Builder::new()
            .name("preset-engine".into())
            .spawn(move || {
                let mut last = Instant::now();
                while engine.running.load(Ordering::Acquire) {
                    std::thread::sleep(PRESET_TICK);
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f64();
                    last = now;
                    engine.tick(dt);
                }
            })
            .expect("spawn preset engine thread");
        *self.thread.lock() = Some(handle);
        info!("preset engine ticker started");
    }

    /// Stop the ticker and every instance.
    pub fn cleanup(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            join_with_timeout(handle, Duration::from_secs(2), "preset-engine");
        }
        self.stop_all();
        info!("preset engine stopped");
    }

    fn emit_status(&self) {
        self.events.emit(&Event::PresetStatus {
            running: self.running(),
        });
    }
}

/// The built-in artist definitions.
fn builtin_definitions() -> HashMap<String, PresetDefinition> {
    let mut defs = HashMap::new();

    defs.insert(
        "breathe".to_string(),
        PresetDefinition {
            kind: PresetKind::Breath,
            params: PresetParams {
                rate: 0.3,
                depth: 15.0,
                inhale_time: 3.0,
                exhale_time: 4.0,
                hold_time_breath: 0.8,
                ..Default::default()
            },
            default_targets: Vec::new(),
            description: "Gentle breathing motion".to_string(),
        },
    );
    defs.insert(
        "twitch".to_string(),
        PresetDefinition {
            kind: PresetKind::Twitch,
            params: PresetParams {
                intensity: 0.4,
                interval_min: 1.0,
                interval_max: 5.0,
                depth: 10.0,
                ..Default::default()
            },
            default_targets: Vec::new(),
            description: "Occasional nervous twitches".to_string(),
        },
    );
    defs.insert(
        "quiver".to_string(),
        PresetDefinition {
            kind: PresetKind::Sine,
            params: PresetParams {
                frequency: 8.0,
                depth: 2.0,
                rate: 1.0,
                ..Default::default()
            },
            default_targets: Vec::new(),
            description: "High-frequency micro-movements".to_string(),
        },
    );
    defs.insert(
        "nod".to_string(),
        PresetDefinition {
            kind: PresetKind::PingPong,
            params: PresetParams {
                rate: 0.5,
                min_angle: 75.0,
                max_angle: 105.0,
                ..Default::default()
            },
            default_targets: Vec::new(),
            description: "Gentle nodding motion".to_string(),
        },
    );
    defs.insert(
        "ripple".to_string(),
        PresetDefinition {
            kind: PresetKind::Ripple,
            params: PresetParams {
                wave_speed: 1.5,
                depth: 20.0,
                decay: 0.1,
                ..Default::default()
            },
            default_targets: Vec::new(),
            description: "Wave propagating across servos".to_string(),
        },
    );
    defs.insert(
        "swarm".to_string(),
        PresetDefinition {
            kind: PresetKind::Swarm,
            params: PresetParams {
                frequency: 0.7,
                depth: 25.0,
                rate: 0.8,
                ..Default::default()
            },
            default_targets: Vec::new(),
            description: "Coordinated group movement".to_string(),
        },
    );

    defs
}
