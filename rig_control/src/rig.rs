//! The rig facade: one owner wiring the bus, registry, safety system and
//! both engines together.
//!
//! Construction order matters: the bus wraps the driver, the output stage
//! binds registry to bus, and everything above shares the output stage.
//! `cleanup` is idempotent and safe to call from a signal handler path.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use rig_common::error::RigResult;
use rig_common::events::{Event, EventBus};
use rig_common::servo::ServoOrientation;
use rig_hal::{PwmDriver, ServoBus};

use crate::output::OutputStage;
use crate::preset::PresetEngine;
use crate::registry::ServoRegistry;
use crate::safety::SafetySystem;
use crate::status::RigStatus;
use crate::timeline::TimelineEngine;

/// Fully wired rig.
pub struct Rig {
    bus: Arc<ServoBus>,
    registry: Arc<ServoRegistry>,
    output: Arc<OutputStage>,
    events: Arc<EventBus>,
    safety: Arc<SafetySystem>,
    presets: Arc<PresetEngine>,
    timeline: Arc<TimelineEngine>,
    cleaned: AtomicBool,
}

impl Rig {
    /// Wire a rig over `driver`, loading the registry from `registry_path`
    /// when given.
    pub fn new(driver: Box<dyn PwmDriver>, registry_path: Option<PathBuf>) -> Arc<Self> {
        let bus = Arc::new(ServoBus::new(driver));
        let registry = Arc::new(match registry_path {
            Some(path) => ServoRegistry::open(path),
            None => ServoRegistry::in_memory(),
        });
        let events = Arc::new(EventBus::new());
        let output = Arc::new(OutputStage::new(Arc::clone(&registry), Arc::clone(&bus)));
        let safety = SafetySystem::new(Arc::clone(&output), Arc::clone(&events));
        let presets = Arc::new(PresetEngine::new(Arc::clone(&output), Arc::clone(&events)));
        let timeline = Arc::new(TimelineEngine::new(Arc::clone(&output), Arc::clone(&events)));

        info!(backend = bus.backend(), servos = registry.len(), "rig assembled");
        Arc::new(Self {
            bus,
            registry,
            output,
            events,
            safety,
            presets,
            timeline,
            cleaned: AtomicBool::new(false),
        })
    }

    /// Start the preset and timeline worker threads.
    pub fn start(&self) {
        Arc::clone(&self.presets).spawn();
        Arc::clone(&self.timeline).spawn();
    }

    // ── Subsystem access ────────────────────────────────────────────

    /// The single hardware authority.
    pub fn bus(&self) -> &Arc<ServoBus> {
        &self.bus
    }

    /// The servo registry.
    pub fn registry(&self) -> &Arc<ServoRegistry> {
        &self.registry
    }

    /// The shared clamp→orient→drive path.
    pub fn output(&self) -> &Arc<OutputStage> {
        &self.output
    }

    /// The event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The safety system.
    pub fn safety(&self) -> &Arc<SafetySystem> {
        &self.safety
    }

    /// The preset engine.
    pub fn presets(&self) -> &Arc<PresetEngine> {
        &self.presets
    }

    /// The timeline engine.
    pub fn timeline(&self) -> &Arc<TimelineEngine> {
        &self.timeline
    }

    // ── Servo verbs ─────────────────────────────────────────────────

    /// Register a servo and announce it.
    pub fn register_servo(
        &self,
        id: &str,
        channel: u8,
        pin: Option<u8>,
        orientation: ServoOrientation,
        gear_ratio: f64,
        notes: &str,
    ) -> RigResult<()> {
        let view = self
            .registry
            .register(id, channel, pin, orientation, gear_ratio, notes)?;
        self.events.emit(&Event::ServoRegistered {
            id: view.id,
            channel: view.channel,
        });
        Ok(())
    }

    /// Drive a servo; returns the stored (clamped) angle.
    pub fn set_angle(&self, identifier: &str, angle_deg: f64) -> RigResult<f64> {
        let stored = self.output.drive_by_identifier(identifier, angle_deg)?;
        if let Some((view, _)) = self.registry.resolve(identifier) {
            self.events.emit(&Event::ServoUpdate {
                id: view.id,
                angle: stored,
            });
        }
        Ok(stored)
    }

    /// Re-attach a servo and re-drive its last angle.
    pub fn enable_servo(&self, identifier: &str) -> RigResult<()> {
        let view = self.registry.set_enabled(identifier, true)?;
        let last = view.angles.current();
        self.output.drive(&view, last)?;
        self.events.emit(&Event::ServoEnabled { id: view.id });
        Ok(())
    }

    /// Detach a servo; the channel stops pulsing.
    pub fn disable_servo(&self, identifier: &str) -> RigResult<()> {
        let view = self.registry.set_enabled(identifier, false)?;
        self.output.detach(&view)?;
        self.events.emit(&Event::ServoDisabled { id: view.id });
        Ok(())
    }

    /// Full status snapshot.
    pub fn status(&self) -> RigStatus {
        RigStatus::collect(self)
    }

    /// Stop workers, drop the watchdog, detach everything and release the
    /// device. Idempotent.
    pub fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("rig shutting down");
        self.presets.cleanup();
        self.timeline.cleanup();
        self.safety.cleanup();
        if let Err(e) = self.bus.shutdown() {
            tracing::warn!(error = %e, "bus shutdown failed");
        }
        info!("rig stopped");
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.cleanup();
    }
}
