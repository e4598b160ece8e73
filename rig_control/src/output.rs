//! The clamp→orient→drive write path.
//!
//! Every angle that reaches the hardware goes through here: operator
//! commands, safety recovery and both engines. Orientation is applied only
//! to the value handed to the bus; the stored angle stays in logical space.

use std::sync::Arc;

use tracing::debug;

use rig_common::error::{RigError, RigResult};
use rig_hal::ServoBus;

use crate::registry::{ServoRegistry, ServoView};

/// Shared output stage over the registry and the bus.
pub struct OutputStage {
    registry: Arc<ServoRegistry>,
    bus: Arc<ServoBus>,
}

impl OutputStage {
    /// Bind the write path to a registry and a bus.
    pub fn new(registry: Arc<ServoRegistry>, bus: Arc<ServoBus>) -> Self {
        Self { registry, bus }
    }

    /// The registry behind this stage.
    #[inline]
    pub fn registry(&self) -> &Arc<ServoRegistry> {
        &self.registry
    }

    /// The bus behind this stage.
    #[inline]
    pub fn bus(&self) -> &Arc<ServoBus> {
        &self.bus
    }

    /// Authoritative write: clamp, orient, drive, store.
    ///
    /// Driving a channel attaches it, so the enabled flag flips on. The
    /// stored angle only updates when the hardware write succeeded.
    /// Returns the stored (clamped, unoriented) angle.
    pub fn drive(&self, view: &ServoView, angle_deg: f64) -> RigResult<f64> {
        let clamped = view.clamp_angle(angle_deg);
        let oriented = view.oriented(clamped);
        self.bus
            .set_angle(view.channel, oriented, view.calibration)
            .map_err(|e| RigError::Hardware(e.to_string()))?;
        view.angles.set_current(clamped);
        view.angles.set_target(clamped);
        view.angles.set_enabled(true);
        Ok(clamped)
    }

    /// Engine write: like [`drive`](Self::drive) but skips detached servos
    /// instead of re-attaching them. Returns `None` when skipped.
    pub fn drive_if_enabled(&self, view: &ServoView, angle_deg: f64) -> RigResult<Option<f64>> {
        if !view.angles.enabled() {
            debug!(id = %view.id, "skipping write to detached servo");
            return Ok(None);
        }
        self.drive(view, angle_deg).map(Some)
    }

    /// Resolve an identifier and drive it.
    pub fn drive_by_identifier(&self, identifier: &str, angle_deg: f64) -> RigResult<f64> {
        let (view, _) = self
            .registry
            .resolve(identifier)
            .ok_or_else(|| RigError::NotFound {
                kind: "servo",
                name: identifier.to_string(),
            })?;
        self.drive(&view, angle_deg)
    }

    /// Detach a servo's channel and clear its enabled flag.
    pub fn detach(&self, view: &ServoView) -> RigResult<()> {
        self.bus
            .detach(view.channel)
            .map_err(|e| RigError::Hardware(e.to_string()))?;
        view.angles.set_enabled(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_common::servo::ServoOrientation;
    use rig_hal::SimDriver;

    fn stage() -> (Arc<OutputStage>, Arc<rig_hal::SimState>) {
        let sim = SimDriver::new();
        let probe = sim.state();
        let bus = Arc::new(ServoBus::new(Box::new(sim)));
        let registry = Arc::new(ServoRegistry::in_memory());
        (Arc::new(OutputStage::new(registry, bus)), probe)
    }

    #[test]
    fn drive_clamps_stores_and_orients() {
        let (stage, probe) = stage();
        stage
            .registry()
            .register("eye", 3, None, ServoOrientation::Inverted, 1.0, "")
            .unwrap();
        stage.registry().set_soft_limits("eye", 60.0, 120.0).unwrap();
        stage.registry().calibrate("eye", 1000, 2000, 90.0).unwrap();

        let (view, _) = stage.registry().resolve("eye").unwrap();
        let stored = stage.drive(&view, 200.0).unwrap();

        // Clamped to 120, oriented to 60, mapped over 1000-2000 µs.
        assert_eq!(stored, 120.0);
        assert_eq!(view.angles.current(), 120.0);
        assert!(view.angles.enabled());
        let expected = 1000 + (60.0 / 180.0 * 1000.0_f64).round() as u16;
        assert_eq!(probe.last_pulse_us(3), Some(expected));
    }

    #[test]
    fn drive_if_enabled_skips_detached_servos() {
        let (stage, probe) = stage();
        stage
            .registry()
            .register("eye", 3, None, ServoOrientation::Normal, 1.0, "")
            .unwrap();
        let (view, _) = stage.registry().resolve("eye").unwrap();

        // Freshly registered servos are detached.
        assert_eq!(stage.drive_if_enabled(&view, 90.0).unwrap(), None);
        assert_eq!(probe.write_count(), 0);

        stage.drive(&view, 90.0).unwrap();
        assert_eq!(stage.drive_if_enabled(&view, 100.0).unwrap(), Some(100.0));
        assert_eq!(probe.write_count(), 2);
    }

    #[test]
    fn detach_clears_enabled_and_pulse() {
        let (stage, probe) = stage();
        stage
            .registry()
            .register("eye", 3, None, ServoOrientation::Normal, 1.0, "")
            .unwrap();
        let (view, _) = stage.registry().resolve("eye").unwrap();
        stage.drive(&view, 90.0).unwrap();

        stage.detach(&view).unwrap();
        assert!(!view.angles.enabled());
        assert_eq!(probe.last_pulse_us(3), None);
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        let (stage, _) = stage();
        assert!(matches!(
            stage.drive_by_identifier("ghost", 90.0),
            Err(RigError::NotFound { .. })
        ));
    }
}
