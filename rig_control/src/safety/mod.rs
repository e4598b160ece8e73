//! Safety system: state escalation, emergency modes, safe poses,
//! watchdog supervision and the preflight sweep.
//!
//! Everything here is best-effort: partial success is reported, never
//! raised. The watchdog timeout path must never panic out of the safety
//! thread.

pub mod watchdog;

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{error, info, warn};

use rig_common::error::{RigError, RigResult};
use rig_common::events::{Event, EventBus};
use rig_common::safety::{
    AngleCheck, EmergencyMode, PreflightReport, PreflightStatus, SafePose, SafetyState, ServoCheck,
};

use crate::output::OutputStage;
use watchdog::Watchdog;

/// Settle time between preflight writes.
const PREFLIGHT_SETTLE: Duration = Duration::from_millis(100);

/// Margin inside the soft limits for the preflight sweep [degrees].
const PREFLIGHT_MARGIN_DEG: f64 = 5.0;

/// Ring buffer depth for the emergency and fault logs.
const LOG_DEPTH: usize = 100;

/// Pose every recovery path falls back to.
pub const DEFAULT_SAFE_POSE: &str = "park";

type StateCallback = Arc<dyn Fn(SafetyState) + Send + Sync>;
type RecoveryAction = Arc<dyn Fn() + Send + Sync>;

/// One entry in the emergency or fault log.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyLogEntry {
    /// Seconds since the UNIX epoch.
    pub timestamp_s: u64,
    /// Human-readable description.
    pub detail: String,
}

impl SafetyLogEntry {
    fn now(detail: String) -> Self {
        Self {
            timestamp_s: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            detail,
        }
    }
}

/// Watchdog, emergency stops, safe poses and preflight.
pub struct SafetySystem {
    /// Handle to ourselves for the watchdog thread; never upgraded after
    /// the system is dropped.
    weak: Weak<SafetySystem>,
    output: Arc<OutputStage>,
    events: Arc<EventBus>,
    state: Mutex<SafetyState>,
    default_mode: Mutex<EmergencyMode>,
    /// Custom poses; `park` and `retract` are synthesized on demand.
    poses: RwLock<HashMap<String, SafePose>>,
    watchdog: Watchdog,
    emergency_log: Mutex<VecDeque<SafetyLogEntry>>,
    fault_log: Mutex<VecDeque<SafetyLogEntry>>,
    state_callbacks: RwLock<Vec<(SafetyState, StateCallback)>>,
}

impl SafetySystem {
    /// Build over the shared write path.
    pub fn new(output: Arc<OutputStage>, events: Arc<EventBus>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            output,
            events,
            state: Mutex::new(SafetyState::Normal),
            default_mode: Mutex::new(EmergencyMode::SafePose),
            poses: RwLock::new(HashMap::new()),
            watchdog: Watchdog::new(),
            emergency_log: Mutex::new(VecDeque::new()),
            fault_log: Mutex::new(VecDeque::new()),
            state_callbacks: RwLock::new(Vec::new()),
        })
    }

    // ── State machine ───────────────────────────────────────────────

    /// Current safety state.
    pub fn state(&self) -> SafetyState {
        *self.state.lock()
    }

    /// Raise severity; transitions are monotonic, lower targets are a no-op.
    pub fn escalate(&self, to: SafetyState) {
        let changed = {
            let mut state = self.state.lock();
            if to > *state {
                *state = to;
                true
            } else {
                false
            }
        };
        if changed {
            warn!(state = ?to, "safety state escalated");
            self.trigger_state_callbacks(to);
        }
    }

    /// Return to `Normal`; only valid from `Emergency` or `Fault`.
    pub fn reset(&self) -> RigResult<()> {
        {
            let mut state = self.state.lock();
            if !state.is_clearable() {
                return Err(RigError::InvalidTransition(format!(
                    "cannot reset safety state from {state:?}"
                )));
            }
            *state = SafetyState::Normal;
        }
        info!("safety state reset to normal");
        self.trigger_state_callbacks(SafetyState::Normal);
        Ok(())
    }

    /// Run a callback whenever the state changes to `state`.
    pub fn add_state_callback(&self, state: SafetyState, callback: StateCallback) {
        self.state_callbacks.write().push((state, callback));
    }

    fn trigger_state_callbacks(&self, state: SafetyState) {
        let callbacks = self.state_callbacks.read().clone();
        for (wanted, callback) in callbacks {
            if wanted == state
                && catch_unwind(AssertUnwindSafe(|| callback(state))).is_err()
            {
                error!("safety state callback panicked, skipping");
            }
        }
    }

    // ── Safe poses ──────────────────────────────────────────────────

    /// Store a custom pose. Angles outside the current soft limits are
    /// silently clamped and the clamped value is what gets stored.
    pub fn add_safe_pose(
        &self,
        name: &str,
        description: &str,
        servo_angles: impl IntoIterator<Item = (String, f64)>,
        priority: i32,
    ) {
        let registry = self.output.registry();
        let clamped = servo_angles
            .into_iter()
            .map(|(id, angle)| {
                let safe = registry.clamp_angle(&id, angle);
                if safe != angle {
                    warn!(%id, angle, safe, "pose angle clamped to soft limits");
                }
                (id, safe)
            })
            .collect();
        let pose = SafePose {
            name: name.to_string(),
            description: description.to_string(),
            servo_angles: clamped,
            priority,
        };
        info!(name, servos = pose.servo_angles.len(), "added safe pose");
        self.poses.write().insert(name.to_string(), pose);
    }

    /// Look up a pose; `park` and `retract` are built in and always track
    /// the current registry contents unless overridden.
    pub fn pose(&self, name: &str) -> Option<SafePose> {
        if let Some(pose) = self.poses.read().get(name) {
            return Some(pose.clone());
        }
        self.builtin_pose(name)
    }

    /// Names of all poses, built-ins included.
    pub fn pose_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.poses.read().keys().cloned().collect();
        for builtin in [DEFAULT_SAFE_POSE, "retract"] {
            if !names.iter().any(|n| n == builtin) {
                names.push(builtin.to_string());
            }
        }
        names.sort();
        names
    }

    fn builtin_pose(&self, name: &str) -> Option<SafePose> {
        let registry = self.output.registry();
        match name {
            DEFAULT_SAFE_POSE => Some(SafePose {
                name: DEFAULT_SAFE_POSE.to_string(),
                description: "Default park position, all servos centred".to_string(),
                servo_angles: registry
                    .snapshot()
                    .into_iter()
                    .map(|meta| {
                        let angle = meta.clamp_angle(90.0);
                        (meta.id, angle)
                    })
                    .collect(),
                priority: 1,
            }),
            "retract" => Some(SafePose {
                name: "retract".to_string(),
                description: "Retracted position, servos at safe minimums".to_string(),
                servo_angles: registry
                    .snapshot()
                    .into_iter()
                    .map(|meta| {
                        let angle = meta.clamp_angle(meta.midpoint_deg().min(45.0));
                        (meta.id, angle)
                    })
                    .collect(),
                priority: 2,
            }),
            _ => None,
        }
    }

    /// Move every servo in the pose to its stored angle.
    ///
    /// Returns the number of servos successfully moved; per-servo failures
    /// are logged and skipped.
    pub fn go_safe_pose(&self, pose_name: Option<&str>) -> RigResult<usize> {
        let name = pose_name.unwrap_or(DEFAULT_SAFE_POSE);
        let pose = self.pose(name).ok_or_else(|| RigError::NotFound {
            kind: "safe pose",
            name: name.to_string(),
        })?;

        info!(pose = name, servos = pose.servo_angles.len(), "executing safe pose");
        let mut moved = 0;
        for (servo_id, angle) in &pose.servo_angles {
            match self.output.drive_by_identifier(servo_id, *angle) {
                Ok(_) => moved += 1,
                Err(e) => warn!(%servo_id, error = %e, "safe pose write failed"),
            }
        }
        Ok(moved)
    }

    // ── Emergency stop ──────────────────────────────────────────────

    /// Default mode used when `emergency_stop` gets no explicit mode.
    pub fn default_mode(&self) -> EmergencyMode {
        *self.default_mode.lock()
    }

    /// Execute an emergency stop. Best-effort; always escalates to
    /// `Emergency` even when individual servo actions fail.
    pub fn emergency_stop(&self, mode: Option<EmergencyMode>, pose: Option<&str>) -> RigResult<()> {
        let mode = mode.unwrap_or_else(|| self.default_mode());
        self.escalate(SafetyState::Emergency);
        warn!(?mode, "EMERGENCY STOP");

        match mode {
            EmergencyMode::Detach => {
                let detached = self.detach_all();
                self.log_emergency(format!("detach: {detached} servos released"));
            }
            EmergencyMode::Hold => {
                // Positions stay wherever they are; no writes, no pet.
                self.log_emergency("hold: positions frozen".to_string());
            }
            EmergencyMode::SafePose => {
                let moved = self.go_safe_pose(pose)?;
                self.log_emergency(format!(
                    "safe_pose '{}': {moved} servos moved",
                    pose.unwrap_or(DEFAULT_SAFE_POSE)
                ));
            }
        }

        self.events.emit(&Event::EmergencyStop {
            mode,
            state: self.state(),
        });
        Ok(())
    }

    fn detach_all(&self) -> usize {
        let registry = self.output.registry();
        let mut detached = 0;
        for meta in registry.snapshot() {
            if !meta.enabled {
                continue;
            }
            match registry.resolve(&meta.id) {
                Some((view, _)) => match self.output.detach(&view) {
                    Ok(()) => detached += 1,
                    Err(e) => warn!(id = %meta.id, error = %e, "detach failed"),
                },
                None => warn!(id = %meta.id, "servo vanished during detach-all"),
            }
        }
        info!(detached, "detached servos");
        detached
    }

    // ── Watchdog ────────────────────────────────────────────────────

    /// Arm the watchdog. The recovery action defaults to driving the
    /// `park` pose; the `Fault` transition and logging happen regardless.
    pub fn watchdog_start(&self, timeout_ms: u64, recovery: Option<RecoveryAction>) {
        let action: RecoveryAction = recovery.unwrap_or_else(|| {
            let weak = self.weak.clone();
            Arc::new(move || {
                if let Some(safety) = weak.upgrade() {
                    if let Err(e) = safety.go_safe_pose(None) {
                        error!(error = %e, "watchdog recovery pose failed");
                    }
                }
            })
        });
        let weak = self.weak.clone();
        self.watchdog.start(
            timeout_ms,
            Arc::new(move || {
                if let Some(safety) = weak.upgrade() {
                    safety.on_watchdog_timeout(&action);
                }
            }),
        );
    }

    fn on_watchdog_timeout(&self, recovery: &RecoveryAction) {
        let violation = RigError::SafetyViolation(format!(
            "watchdog starved for more than {} ms",
            self.watchdog.timeout_ms()
        ));
        error!(error = %violation, "watchdog timeout, running recovery");
        recovery();
        self.escalate(SafetyState::Fault);
        self.log_fault(violation.to_string());
    }

    /// Refresh the watchdog activity timestamp.
    #[inline]
    pub fn watchdog_pet(&self) {
        self.watchdog.pet();
    }

    /// Direct access to the watchdog timer.
    #[inline]
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Disarm the watchdog.
    pub fn watchdog_stop(&self) {
        self.watchdog.stop();
    }

    /// Whether the watchdog is armed.
    pub fn watchdog_armed(&self) -> bool {
        self.watchdog.is_armed()
    }

    /// Configured watchdog timeout [ms].
    pub fn watchdog_timeout_ms(&self) -> u64 {
        self.watchdog.timeout_ms()
    }

    // ── Preflight ───────────────────────────────────────────────────

    /// Sweep every registered servo through three in-limit angles and
    /// re-centre it, reporting per-angle success.
    pub fn preflight(&self) -> PreflightReport {
        let registry = self.output.registry();
        let mut report = PreflightReport {
            overall_status: PreflightStatus::Pass,
            servo_checks: Default::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        info!("starting preflight check");
        for meta in registry.snapshot() {
            let Some((view, _)) = registry.resolve(&meta.id) else {
                continue;
            };
            let sweep = [
                view.min_deg + PREFLIGHT_MARGIN_DEG,
                view.midpoint_deg(),
                view.max_deg - PREFLIGHT_MARGIN_DEG,
            ];

            let mut checks = Vec::with_capacity(sweep.len());
            for angle in sweep {
                let ok = match self.output.drive(&view, angle) {
                    Ok(_) => true,
                    Err(e) => {
                        report
                            .errors
                            .push(format!("servo '{}' failed angle test at {angle}°: {e}", view.id));
                        false
                    }
                };
                checks.push(AngleCheck {
                    angle_deg: angle,
                    oriented_deg: view.oriented(view.clamp_angle(angle)),
                    ok,
                });
                std::thread::sleep(PREFLIGHT_SETTLE);
            }

            let recentered = match self.output.drive(&view, view.center_deg) {
                Ok(_) => true,
                Err(e) => {
                    report.warnings.push(format!(
                        "could not return servo '{}' to centre: {e}",
                        view.id
                    ));
                    false
                }
            };

            let passed = checks.iter().all(|c| c.ok);
            report.servo_checks.insert(
                view.id.clone(),
                ServoCheck {
                    passed,
                    checks,
                    recentered,
                },
            );
        }

        report.overall_status = if !report.errors.is_empty() {
            PreflightStatus::Fail
        } else if !report.warnings.is_empty() {
            PreflightStatus::Warning
        } else {
            PreflightStatus::Pass
        };
        info!(
            status = ?report.overall_status,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "preflight complete"
        );
        report
    }

    // ── Logs & shutdown ─────────────────────────────────────────────

    fn log_emergency(&self, detail: String) {
        push_capped(&mut self.emergency_log.lock(), SafetyLogEntry::now(detail));
    }

    fn log_fault(&self, detail: String) {
        push_capped(&mut self.fault_log.lock(), SafetyLogEntry::now(detail));
    }

    /// Recent emergency entries, oldest first.
    pub fn emergency_log(&self) -> Vec<SafetyLogEntry> {
        self.emergency_log.lock().iter().cloned().collect()
    }

    /// Recent fault entries, oldest first.
    pub fn fault_log(&self) -> Vec<SafetyLogEntry> {
        self.fault_log.lock().iter().cloned().collect()
    }

    /// Stop the watchdog thread and release every servo.
    pub fn cleanup(&self) {
        self.watchdog.shutdown();
        let _ = self.emergency_stop(Some(EmergencyMode::Detach), None);
    }
}

fn push_capped(log: &mut VecDeque<SafetyLogEntry>, entry: SafetyLogEntry) {
    if log.len() == LOG_DEPTH {
        log.pop_front();
    }
    log.push_back(entry);
}
