// Anomaly domain models
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity with a total order: info < warning < critical < emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighRobotTemperature,
    HighJointTemperature,
    HighJointCurrent,
    LowVoltage,
    HighVoltage,
    HighTorque,
    PositionDeviation,
    EmergencyStop,
    ProtectiveStop,
    SoftLimit,
    RobotDisabled,
    TemperatureTrend,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 12] = [
        AnomalyKind::HighRobotTemperature,
        AnomalyKind::HighJointTemperature,
        AnomalyKind::HighJointCurrent,
        AnomalyKind::LowVoltage,
        AnomalyKind::HighVoltage,
        AnomalyKind::HighTorque,
        AnomalyKind::PositionDeviation,
        AnomalyKind::EmergencyStop,
        AnomalyKind::ProtectiveStop,
        AnomalyKind::SoftLimit,
        AnomalyKind::RobotDisabled,
        AnomalyKind::TemperatureTrend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::HighRobotTemperature => "high_robot_temperature",
            AnomalyKind::HighJointTemperature => "high_joint_temperature",
            AnomalyKind::HighJointCurrent => "high_joint_current",
            AnomalyKind::LowVoltage => "low_voltage",
            AnomalyKind::HighVoltage => "high_voltage",
            AnomalyKind::HighTorque => "high_torque",
            AnomalyKind::PositionDeviation => "position_deviation",
            AnomalyKind::EmergencyStop => "emergency_stop",
            AnomalyKind::ProtectiveStop => "protective_stop",
            AnomalyKind::SoftLimit => "soft_limit",
            AnomalyKind::RobotDisabled => "robot_disabled",
            AnomalyKind::TemperatureTrend => "temperature_trend",
        }
    }

    /// Accepts both `high_joint_temperature` and `high-joint-temperature`.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().replace('-', "_");
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }

    /// Robot state flags are reported as-is; their severity is already
    /// maximal (e-stop) or purely informational (disabled).
    pub fn escalates_with_duration(&self) -> bool {
        !matches!(
            self,
            AnomalyKind::EmergencyStop
                | AnomalyKind::ProtectiveStop
                | AnomalyKind::SoftLimit
                | AnomalyKind::RobotDisabled
        )
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlates repeated observations of the same physical condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnomalyIdentity {
    pub kind: AnomalyKind,
    pub joint_number: Option<u8>,
}

impl AnomalyIdentity {
    pub fn new(kind: AnomalyKind, joint_number: Option<u8>) -> Self {
        Self { kind, joint_number }
    }
}

impl fmt::Display for AnomalyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.joint_number {
            Some(joint) => write!(f, "{}_{}", self.kind, joint),
            None => write!(f, "{}_0", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyCandidate {
    pub kind: AnomalyKind,
    pub joint_number: Option<u8>,
    pub severity_raw: Severity,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub description: String,
}

impl AnomalyCandidate {
    pub fn identity(&self) -> AnomalyIdentity {
        AnomalyIdentity::new(self.kind, self.joint_number)
    }
}

/// A candidate after duration-based escalation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EscalatedAnomaly {
    #[serde(flatten)]
    pub candidate: AnomalyCandidate,
    pub severity: Severity,
    pub duration_seconds: f64,
    /// First observation of this identity since it was last cleared
    pub onset: bool,
}

impl EscalatedAnomaly {
    pub fn identity(&self) -> AnomalyIdentity {
        self.candidate.identity()
    }

    pub fn is_onset(&self) -> bool {
        self.onset
    }
}
