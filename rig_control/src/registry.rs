//! Servo registry: naming, calibration, soft limits and orientation.
//!
//! The registry is read-mostly: structural mutation (register, rename,
//! alias, calibrate, limits) takes the writer lock and persists, while the
//! hot per-servo angle fields live in lock-free [`AngleCell`]s so engine
//! writes never tear a concurrent read.
//!
//! Identifier resolution precedence is fixed: canonical id, then alias,
//! then the decimal form of a channel. A numeric alias therefore shadows
//! the channel it happens to spell.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rig_common::error::{RigError, RigResult};
use rig_common::servo::{
    CHANNEL_COUNT, Calibration, FULL_TRAVEL_DEG, PULSE_TYPICAL_MAX_US, PULSE_TYPICAL_MIN_US,
    ServoMetadata, ServoOrientation,
};

// ─── Hot runtime state ──────────────────────────────────────────────

/// Lock-free current/target angle and attach state for one servo.
///
/// Angles are stored as `f64` bit patterns in atomics; engines update them
/// every tick while readers snapshot without taking the registry lock.
pub struct AngleCell {
    current: AtomicU64,
    target: AtomicU64,
    enabled: AtomicBool,
}

impl AngleCell {
    fn new(angle_deg: f64, enabled: bool) -> Self {
        Self {
            current: AtomicU64::new(angle_deg.to_bits()),
            target: AtomicU64::new(angle_deg.to_bits()),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Last commanded angle [degrees].
    #[inline]
    pub fn current(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Acquire))
    }

    /// Store a commanded angle [degrees].
    #[inline]
    pub fn set_current(&self, angle_deg: f64) {
        self.current.store(angle_deg.to_bits(), Ordering::Release);
    }

    /// Pending target angle [degrees].
    #[inline]
    pub fn target(&self) -> f64 {
        f64::from_bits(self.target.load(Ordering::Acquire))
    }

    /// Store a pending target angle [degrees].
    #[inline]
    pub fn set_target(&self, angle_deg: f64) {
        self.target.store(angle_deg.to_bits(), Ordering::Release);
    }

    /// Whether the channel is attached.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Attach or detach the channel flag.
    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

// ─── Resolution ─────────────────────────────────────────────────────

/// Which table answered an identifier lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Matched the canonical id table.
    ById,
    /// Matched the alias table.
    ByAlias,
    /// Parsed as a decimal channel number.
    ByChannel,
}

/// Cheap snapshot of one servo for the write path.
///
/// Carries everything the clamp→orient→driver pipeline needs plus a handle
/// to the live angle cells.
#[derive(Clone)]
pub struct ServoView {
    /// Canonical id.
    pub id: String,
    /// Hardware channel.
    pub channel: u8,
    /// Mounting orientation correction.
    pub orientation: ServoOrientation,
    /// Soft limit lower bound [degrees].
    pub min_deg: f64,
    /// Soft limit upper bound [degrees].
    pub max_deg: f64,
    /// Nominal centre [degrees].
    pub center_deg: f64,
    /// Pulse calibration.
    pub calibration: Calibration,
    /// Live angle cells, shared with the registry.
    pub angles: Arc<AngleCell>,
}

impl ServoView {
    /// Clamp an angle to this servo's soft limits.
    #[inline]
    pub fn clamp_angle(&self, angle_deg: f64) -> f64 {
        angle_deg.clamp(self.min_deg, self.max_deg)
    }

    /// Apply the orientation remap for the driver write.
    #[inline]
    pub fn oriented(&self, angle_deg: f64) -> f64 {
        self.orientation.apply(angle_deg)
    }

    /// Midpoint of the soft limit interval [degrees].
    #[inline]
    pub fn midpoint_deg(&self) -> f64 {
        (self.min_deg + self.max_deg) / 2.0
    }
}

// ─── Persistence format ─────────────────────────────────────────────

/// On-disk layout: `{servos: {id: metadata}, aliases: {alias: id}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedRegistry {
    servos: BTreeMap<String, ServoMetadata>,
    aliases: BTreeMap<String, String>,
}

// ─── Registry ───────────────────────────────────────────────────────

struct Entry {
    meta: ServoMetadata,
    angles: Arc<AngleCell>,
}

#[derive(Default)]
struct Inner {
    servos: HashMap<String, Entry>,
    channel_map: HashMap<u8, String>,
    alias_map: HashMap<String, String>,
}

impl Inner {
    /// Is `name` free across both the id and alias tables?
    fn name_is_free(&self, name: &str) -> bool {
        !self.servos.contains_key(name) && !self.alias_map.contains_key(name)
    }

    fn view_of(&self, id: &str) -> Option<ServoView> {
        self.servos.get(id).map(|entry| ServoView {
            id: entry.meta.id.clone(),
            channel: entry.meta.channel,
            orientation: entry.meta.orientation,
            min_deg: entry.meta.min_deg,
            max_deg: entry.meta.max_deg,
            center_deg: entry.meta.center_deg,
            calibration: entry.meta.calibration(),
            angles: Arc::clone(&entry.angles),
        })
    }
}

/// Servo naming, calibration, limits and orientation authority.
pub struct ServoRegistry {
    inner: RwLock<Inner>,
    persist_path: Option<PathBuf>,
}

impl ServoRegistry {
    /// In-memory registry with no persistence (tests, dry runs).
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            persist_path: None,
        }
    }

    /// Registry backed by a JSON file. A missing file starts empty; a
    /// corrupt file is logged and ignored.
    pub fn open(path: PathBuf) -> Self {
        let registry = Self {
            inner: RwLock::new(Inner::default()),
            persist_path: Some(path),
        };
        registry.load();
        registry
    }

    // ── Structural mutation ─────────────────────────────────────────

    /// Register a new servo.
    pub fn register(
        &self,
        id: &str,
        channel: u8,
        pin: Option<u8>,
        orientation: ServoOrientation,
        gear_ratio: f64,
        notes: &str,
    ) -> RigResult<ServoView> {
        let view = {
            let mut inner = self.inner.write();
            if channel >= CHANNEL_COUNT {
                return Err(RigError::OutOfRange {
                    what: "channel",
                    value: f64::from(channel),
                    min: 0.0,
                    max: f64::from(CHANNEL_COUNT - 1),
                });
            }
            if !inner.name_is_free(id) {
                return Err(RigError::Duplicate {
                    kind: "servo id",
                    name: id.to_string(),
                });
            }
            if let Some(owner) = inner.channel_map.get(&channel) {
                return Err(RigError::Duplicate {
                    kind: "channel",
                    name: format!("{channel} (assigned to '{owner}')"),
                });
            }

            let mut meta = ServoMetadata::new(id, channel);
            meta.pin = pin;
            meta.orientation = orientation;
            meta.gear_ratio = gear_ratio;
            meta.notes = notes.to_string();
            let angles = Arc::new(AngleCell::new(meta.current_angle, meta.enabled));

            inner.channel_map.insert(channel, id.to_string());
            inner.servos.insert(id.to_string(), Entry { meta, angles });
            inner.view_of(id).expect("just inserted")
        };
        info!(id, channel, "registered servo");
        self.save();
        Ok(view)
    }

    /// Rename a servo, updating channel and alias back-references.
    pub fn rename(&self, old_id: &str, new_id: &str) -> RigResult<()> {
        {
            let mut inner = self.inner.write();
            if !inner.servos.contains_key(old_id) {
                return Err(RigError::NotFound {
                    kind: "servo",
                    name: old_id.to_string(),
                });
            }
            if !inner.name_is_free(new_id) {
                return Err(RigError::Duplicate {
                    kind: "servo id",
                    name: new_id.to_string(),
                });
            }

            let mut entry = inner.servos.remove(old_id).expect("checked above");
            entry.meta.id = new_id.to_string();
            inner.channel_map.insert(entry.meta.channel, new_id.to_string());
            for mapped in inner.alias_map.values_mut() {
                if mapped == old_id {
                    *mapped = new_id.to_string();
                }
            }
            inner.servos.insert(new_id.to_string(), entry);
        }
        info!(old_id, new_id, "renamed servo");
        self.save();
        Ok(())
    }

    /// Add a globally unique alias.
    pub fn alias(&self, id: &str, alias: &str) -> RigResult<()> {
        {
            let mut inner = self.inner.write();
            if !inner.servos.contains_key(id) {
                return Err(RigError::NotFound {
                    kind: "servo",
                    name: id.to_string(),
                });
            }
            if !inner.name_is_free(alias) {
                return Err(RigError::Duplicate {
                    kind: "alias",
                    name: alias.to_string(),
                });
            }
            inner.alias_map.insert(alias.to_string(), id.to_string());
            inner
                .servos
                .get_mut(id)
                .expect("checked above")
                .meta
                .aliases
                .push(alias.to_string());
        }
        info!(id, alias, "added alias");
        self.save();
        Ok(())
    }

    /// Set the soft limit interval.
    pub fn set_soft_limits(&self, identifier: &str, min_deg: f64, max_deg: f64) -> RigResult<()> {
        if min_deg >= max_deg {
            return Err(RigError::OutOfRange {
                what: "min_deg",
                value: min_deg,
                min: 0.0,
                max: max_deg,
            });
        }
        if !(0.0..=FULL_TRAVEL_DEG).contains(&min_deg)
            || !(0.0..=FULL_TRAVEL_DEG).contains(&max_deg)
        {
            return Err(RigError::OutOfRange {
                what: "soft limit",
                value: if (0.0..=FULL_TRAVEL_DEG).contains(&min_deg) {
                    max_deg
                } else {
                    min_deg
                },
                min: 0.0,
                max: FULL_TRAVEL_DEG,
            });
        }
        self.mutate(identifier, |meta| {
            meta.min_deg = min_deg;
            meta.max_deg = max_deg;
            info!(id = %meta.id, min_deg, max_deg, "set soft limits");
        })?;
        self.save();
        Ok(())
    }

    /// Calibrate the pulse mapping. Pulses outside the typical hobby range
    /// are a warning, not a failure.
    pub fn calibrate(
        &self,
        identifier: &str,
        min_us: u16,
        max_us: u16,
        center_deg: f64,
    ) -> RigResult<()> {
        if min_us >= max_us {
            return Err(RigError::OutOfRange {
                what: "min_pulse_us",
                value: f64::from(min_us),
                min: 0.0,
                max: f64::from(max_us),
            });
        }
        if min_us < PULSE_TYPICAL_MIN_US || max_us > PULSE_TYPICAL_MAX_US {
            warn!(
                identifier,
                min_us, max_us, "pulse calibration outside typical 500-2500 µs range"
            );
        }
        self.mutate(identifier, |meta| {
            meta.min_pulse_us = min_us;
            meta.max_pulse_us = max_us;
            meta.center_deg = center_deg;
            info!(id = %meta.id, min_us, max_us, center_deg, "calibrated servo");
        })?;
        self.save();
        Ok(())
    }

    /// Flip the attach flag, returning the view for the follow-up write.
    pub fn set_enabled(&self, identifier: &str, enabled: bool) -> RigResult<ServoView> {
        let view = self.resolve(identifier).map(|(v, _)| v).ok_or_else(|| {
            RigError::NotFound {
                kind: "servo",
                name: identifier.to_string(),
            }
        })?;
        view.angles.set_enabled(enabled);
        self.save();
        Ok(view)
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Resolve an identifier: id, then alias, then channel-as-decimal.
    ///
    /// A miss is non-fatal and returns `None`.
    pub fn resolve(&self, identifier: &str) -> Option<(ServoView, Resolution)> {
        let inner = self.inner.read();
        if inner.servos.contains_key(identifier) {
            return inner.view_of(identifier).map(|v| (v, Resolution::ById));
        }
        if let Some(id) = inner.alias_map.get(identifier) {
            return inner.view_of(id).map(|v| (v, Resolution::ByAlias));
        }
        if let Ok(channel) = identifier.parse::<u8>() {
            if let Some(id) = inner.channel_map.get(&channel) {
                return inner.view_of(id).map(|v| (v, Resolution::ByChannel));
            }
        }
        None
    }

    /// Clamp an angle to a servo's soft limits; unknown identifiers pass
    /// the angle through unchanged.
    pub fn clamp_angle(&self, identifier: &str, angle_deg: f64) -> f64 {
        match self.resolve(identifier) {
            Some((view, _)) => view.clamp_angle(angle_deg),
            None => angle_deg,
        }
    }

    /// Apply a servo's orientation remap; unknown identifiers pass the
    /// angle through unchanged.
    pub fn apply_orientation(&self, identifier: &str, angle_deg: f64) -> f64 {
        match self.resolve(identifier) {
            Some((view, _)) => view.oriented(angle_deg),
            None => angle_deg,
        }
    }

    /// Canonical ids, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().servos.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Alias to canonical id mapping.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .alias_map
            .iter()
            .map(|(a, id)| (a.clone(), id.clone()))
            .collect()
    }

    /// Channel to canonical id mapping.
    pub fn channels(&self) -> BTreeMap<u8, String> {
        self.inner
            .read()
            .channel_map
            .iter()
            .map(|(&ch, id)| (ch, id.clone()))
            .collect()
    }

    /// Number of registered servos.
    pub fn len(&self) -> usize {
        self.inner.read().servos.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().servos.is_empty()
    }

    /// Metadata snapshot for one servo with live angles folded in.
    pub fn servo_info(&self, identifier: &str) -> Option<ServoMetadata> {
        let (view, _) = self.resolve(identifier)?;
        let inner = self.inner.read();
        inner.servos.get(&view.id).map(|entry| {
            let mut meta = entry.meta.clone();
            meta.current_angle = entry.angles.current();
            meta.target_angle = entry.angles.target();
            meta.enabled = entry.angles.enabled();
            meta
        })
    }

    /// Metadata snapshot of every servo, sorted by id.
    pub fn snapshot(&self) -> Vec<ServoMetadata> {
        let inner = self.inner.read();
        let mut all: Vec<ServoMetadata> = inner
            .servos
            .values()
            .map(|entry| {
                let mut meta = entry.meta.clone();
                meta.current_angle = entry.angles.current();
                meta.target_angle = entry.angles.target();
                meta.enabled = entry.angles.enabled();
                meta
            })
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Persist the registry. Failures are logged, never raised.
    pub fn save(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let persisted = {
            let inner = self.inner.read();
            PersistedRegistry {
                servos: inner
                    .servos
                    .values()
                    .map(|entry| {
                        let mut meta = entry.meta.clone();
                        meta.current_angle = entry.angles.current();
                        meta.target_angle = entry.angles.target();
                        meta.enabled = entry.angles.enabled();
                        (meta.id.clone(), meta)
                    })
                    .collect(),
                aliases: inner
                    .alias_map
                    .iter()
                    .map(|(a, id)| (a.clone(), id.clone()))
                    .collect(),
            }
        };
        match serde_json::to_string_pretty(&persisted) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "failed to save registry");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize registry"),
        }
    }

    fn load(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                info!(path = %path.display(), "no registry file, starting empty");
                return;
            }
        };
        let persisted: PersistedRegistry = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse registry file");
                return;
            }
        };

        let mut inner = self.inner.write();
        for (id, meta) in persisted.servos {
            if meta.channel >= CHANNEL_COUNT || inner.channel_map.contains_key(&meta.channel) {
                warn!(%id, channel = meta.channel, "skipping servo with bad channel");
                continue;
            }
            let angles = Arc::new(AngleCell::new(meta.current_angle, meta.enabled));
            inner.channel_map.insert(meta.channel, id.clone());
            inner.servos.insert(id, Entry { meta, angles });
        }
        inner.alias_map = persisted.aliases.into_iter().collect();
        info!(count = inner.servos.len(), "loaded registry");
    }

    /// Resolve `identifier` to a canonical id and mutate its metadata
    /// under the writer lock.
    fn mutate(&self, identifier: &str, f: impl FnOnce(&mut ServoMetadata)) -> RigResult<()> {
        let id = self
            .resolve(identifier)
            .map(|(view, _)| view.id)
            .ok_or_else(|| RigError::NotFound {
                kind: "servo",
                name: identifier.to_string(),
            })?;
        let mut inner = self.inner.write();
        let entry = inner.servos.get_mut(&id).ok_or_else(|| RigError::NotFound {
            kind: "servo",
            name: id.clone(),
        })?;
        f(&mut entry.meta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(entries: &[(&str, u8)]) -> ServoRegistry {
        let registry = ServoRegistry::in_memory();
        for (id, channel) in entries {
            registry
                .register(id, *channel, None, ServoOrientation::Normal, 1.0, "")
                .unwrap();
        }
        registry
    }

    #[test]
    fn register_rejects_duplicates_and_bad_channels() {
        let registry = registry_with(&[("jaw", 0)]);

        let dup_id = registry.register("jaw", 1, None, ServoOrientation::Normal, 1.0, "");
        assert!(matches!(dup_id, Err(RigError::Duplicate { kind: "servo id", .. })));

        let dup_ch = registry.register("brow", 0, None, ServoOrientation::Normal, 1.0, "");
        assert!(matches!(dup_ch, Err(RigError::Duplicate { kind: "channel", .. })));

        let bad_ch = registry.register("tail", 16, None, ServoOrientation::Normal, 1.0, "");
        assert!(matches!(bad_ch, Err(RigError::OutOfRange { .. })));
    }

    #[test]
    fn resolution_precedence_id_then_alias_then_channel() {
        let registry = registry_with(&[("jaw", 0), ("brow", 5)]);
        registry.alias("jaw", "mouth").unwrap();

        let (view, how) = registry.resolve("jaw").unwrap();
        assert_eq!((view.id.as_str(), how), ("jaw", Resolution::ById));

        let (view, how) = registry.resolve("mouth").unwrap();
        assert_eq!((view.id.as_str(), how), ("jaw", Resolution::ByAlias));

        let (view, how) = registry.resolve("5").unwrap();
        assert_eq!((view.id.as_str(), how), ("brow", Resolution::ByChannel));

        assert!(registry.resolve("nothing").is_none());
    }

    #[test]
    fn numeric_alias_shadows_the_channel() {
        // Alias "5" must win over channel 5.
        let registry = registry_with(&[("jaw", 0), ("brow", 5)]);
        registry.alias("jaw", "5").unwrap();

        let (view, how) = registry.resolve("5").unwrap();
        assert_eq!(view.id, "jaw");
        assert_eq!(how, Resolution::ByAlias);
    }

    #[test]
    fn numeric_id_shadows_alias_and_channel() {
        let registry = registry_with(&[("brow", 5)]);
        registry.register("5", 2, None, ServoOrientation::Normal, 1.0, "").unwrap();

        let (view, how) = registry.resolve("5").unwrap();
        assert_eq!(view.id, "5");
        assert_eq!(how, Resolution::ById);
    }

    #[test]
    fn rename_updates_channel_and_alias_backrefs() {
        let registry = registry_with(&[("jaw", 3)]);
        registry.alias("jaw", "mouth").unwrap();

        registry.rename("jaw", "chin").unwrap();

        assert!(registry.resolve("jaw").is_none());
        let (view, _) = registry.resolve("chin").unwrap();
        assert_eq!(view.channel, 3);
        let (view, how) = registry.resolve("mouth").unwrap();
        assert_eq!((view.id.as_str(), how), ("chin", Resolution::ByAlias));
        let (view, _) = registry.resolve("3").unwrap();
        assert_eq!(view.id, "chin");
    }

    #[test]
    fn rename_rejects_missing_and_taken_names() {
        let registry = registry_with(&[("jaw", 0), ("brow", 1)]);
        assert!(matches!(
            registry.rename("tail", "x"),
            Err(RigError::NotFound { .. })
        ));
        assert!(matches!(
            registry.rename("jaw", "brow"),
            Err(RigError::Duplicate { .. })
        ));
    }

    #[test]
    fn alias_uniqueness_is_global_across_ids_and_aliases() {
        let registry = registry_with(&[("jaw", 0), ("brow", 1)]);
        registry.alias("jaw", "mouth").unwrap();

        assert!(matches!(
            registry.alias("brow", "mouth"),
            Err(RigError::Duplicate { .. })
        ));
        // An alias may not spell an existing servo id either.
        assert!(matches!(
            registry.alias("brow", "jaw"),
            Err(RigError::Duplicate { .. })
        ));
        // And a new id may not spell an existing alias.
        assert!(matches!(
            registry.register("mouth", 2, None, ServoOrientation::Normal, 1.0, ""),
            Err(RigError::Duplicate { .. })
        ));
    }

    #[test]
    fn soft_limits_validation() {
        let registry = registry_with(&[("jaw", 0)]);
        assert!(registry.set_soft_limits("jaw", 60.0, 120.0).is_ok());
        assert!(registry.set_soft_limits("jaw", 120.0, 120.0).is_err());
        assert!(registry.set_soft_limits("jaw", 130.0, 120.0).is_err());
        assert!(registry.set_soft_limits("jaw", -1.0, 120.0).is_err());
        assert!(registry.set_soft_limits("jaw", 0.0, 181.0).is_err());

        let (view, _) = registry.resolve("jaw").unwrap();
        assert_eq!((view.min_deg, view.max_deg), (60.0, 120.0));
    }

    #[test]
    fn calibrate_rejects_inverted_pulse_interval() {
        let registry = registry_with(&[("jaw", 0)]);
        assert!(registry.calibrate("jaw", 2000, 1000, 90.0).is_err());
        assert!(registry.calibrate("jaw", 1000, 2000, 85.0).is_ok());

        let info = registry.servo_info("jaw").unwrap();
        assert_eq!(info.min_pulse_us, 1000);
        assert_eq!(info.max_pulse_us, 2000);
        assert_eq!(info.center_deg, 85.0);
    }

    #[test]
    fn calibrate_outside_typical_range_is_a_warning_not_an_error() {
        let registry = registry_with(&[("jaw", 0)]);
        assert!(registry.calibrate("jaw", 400, 2600, 90.0).is_ok());
    }

    #[test]
    fn clamp_and_orientation_pass_through_unknown_ids() {
        let registry = ServoRegistry::in_memory();
        assert_eq!(registry.clamp_angle("ghost", 300.0), 300.0);
        assert_eq!(registry.apply_orientation("ghost", 30.0), 30.0);
    }

    #[test]
    fn orientation_applies_at_lookup() {
        let registry = ServoRegistry::in_memory();
        registry
            .register("eye", 1, None, ServoOrientation::Inverted, 1.0, "")
            .unwrap();
        assert_eq!(registry.apply_orientation("eye", 30.0), 150.0);
    }

    #[test]
    fn angle_cells_are_shared_between_views() {
        let registry = registry_with(&[("jaw", 0)]);
        let (a, _) = registry.resolve("jaw").unwrap();
        let (b, _) = registry.resolve("0").unwrap();
        a.angles.set_current(123.0);
        assert_eq!(b.angles.current(), 123.0);
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servos.json");

        {
            let registry = ServoRegistry::open(path.clone());
            registry
                .register("jaw", 0, Some(11), ServoOrientation::Inverted, 2.0, "lower jaw")
                .unwrap();
            registry.alias("jaw", "mouth").unwrap();
            registry.set_soft_limits("jaw", 30.0, 150.0).unwrap();
            registry.calibrate("jaw", 600, 2400, 88.0).unwrap();
            let (view, _) = registry.resolve("jaw").unwrap();
            view.angles.set_current(42.0);
            registry.save();
        }

        let reloaded = ServoRegistry::open(path);
        let info = reloaded.servo_info("mouth").unwrap();
        assert_eq!(info.id, "jaw");
        assert_eq!(info.channel, 0);
        assert_eq!(info.orientation, ServoOrientation::Inverted);
        assert_eq!((info.min_deg, info.max_deg), (30.0, 150.0));
        assert_eq!((info.min_pulse_us, info.max_pulse_us), (600, 2400));
        assert_eq!(info.current_angle, 42.0);
    }

    #[test]
    fn persisted_json_has_the_documented_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servos.json");
        let registry = ServoRegistry::open(path.clone());
        registry
            .register("jaw", 0, None, ServoOrientation::Mirrored, 1.0, "")
            .unwrap();
        registry.alias("jaw", "mouth").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["servos"]["jaw"]["orientation"], "mirrored");
        assert_eq!(value["aliases"]["mouth"], "jaw");
    }
}
