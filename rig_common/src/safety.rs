//! Safety states, emergency modes, safe poses and preflight report types.
//!
//! `SafetyState` severities are ordered; escalation only moves upward and
//! `Normal` is reachable again only through an explicit reset from
//! `Emergency` or `Fault`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Overall safety condition, ordered by severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SafetyState {
    /// All clear.
    #[default]
    Normal,
    /// Degraded but operable.
    Warning,
    /// Operator-initiated emergency stop in effect.
    Emergency,
    /// Watchdog timeout or unrecoverable condition.
    Fault,
}

impl SafetyState {
    /// Whether `reset()` may return to `Normal` from this state.
    #[inline]
    pub const fn is_clearable(self) -> bool {
        matches!(self, Self::Emergency | Self::Fault)
    }
}

/// What an emergency stop does to the servos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyMode {
    /// Turn off PWM on every enabled channel.
    Detach,
    /// Keep current positions; no writes.
    Hold,
    /// Move every servo in the selected pose to its stored angle.
    #[default]
    SafePose,
}

/// Named set of per-servo retreat angles.
///
/// Angles are clamped to the soft limits at pose creation time; the clamped
/// value is what gets stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafePose {
    /// Pose name, e.g. `"park"`.
    pub name: String,
    /// Operator description.
    pub description: String,
    /// Servo id to angle map [degrees].
    pub servo_angles: BTreeMap<String, f64>,
    /// Higher priority poses override lower ones.
    #[serde(default)]
    pub priority: i32,
}

/// Aggregate outcome of a preflight sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreflightStatus {
    /// Every write succeeded and every servo re-centred.
    Pass,
    /// All writes succeeded but at least one servo could not re-centre.
    Warning,
    /// At least one servo write failed.
    Fail,
}

/// One commanded test angle during preflight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleCheck {
    /// Logical angle commanded [degrees].
    pub angle_deg: f64,
    /// Angle after orientation remap [degrees].
    pub oriented_deg: f64,
    /// Whether the driver write succeeded.
    pub ok: bool,
}

/// Per-servo preflight outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoCheck {
    /// `true` when every angle write succeeded.
    pub passed: bool,
    /// The three sweep points, in commanded order.
    pub checks: Vec<AngleCheck>,
    /// Whether the servo was returned to `center_deg`.
    pub recentered: bool,
}

/// Full preflight report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Aggregate status.
    pub overall_status: PreflightStatus,
    /// Per-servo details, keyed by canonical id.
    pub servo_checks: BTreeMap<String, ServoCheck>,
    /// Human-readable failures.
    pub errors: Vec<String>,
    /// Human-readable degradations.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(SafetyState::Normal < SafetyState::Warning);
        assert!(SafetyState::Warning < SafetyState::Emergency);
        assert!(SafetyState::Emergency < SafetyState::Fault);
    }

    #[test]
    fn only_emergency_and_fault_clear() {
        assert!(!SafetyState::Normal.is_clearable());
        assert!(!SafetyState::Warning.is_clearable());
        assert!(SafetyState::Emergency.is_clearable());
        assert!(SafetyState::Fault.is_clearable());
    }

    #[test]
    fn emergency_mode_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EmergencyMode::SafePose).unwrap(),
            "\"safe_pose\""
        );
        assert_eq!(
            serde_json::to_string(&EmergencyMode::Detach).unwrap(),
            "\"detach\""
        );
    }
}
