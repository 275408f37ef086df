// Analysis threshold tables
use serde::Deserialize;

/// Two-tier limit. Rule evaluation compares with `>=`, health scoring with `>`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierLimits {
    pub warning: f64,
    pub critical: f64,
}

impl TierLimits {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VoltageBand {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdTable {
    pub robot_temperature: TierLimits,
    pub joint_temperature: TierLimits,
    pub joint_current: TierLimits,
    pub joint_torque: TierLimits,
    pub position_deviation: TierLimits,
    pub voltage: VoltageBand,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            robot_temperature: TierLimits::new(45.0, 55.0),
            joint_temperature: TierLimits::new(40.0, 50.0),
            joint_current: TierLimits::new(2.0, 3.0),
            joint_torque: TierLimits::new(3.0, 3.5),
            position_deviation: TierLimits::new(0.5, 1.0),
            voltage: VoltageBand {
                low: 48.0,
                high: 52.0,
            },
        }
    }
}

impl ThresholdTable {
    pub fn validate(&self) -> Result<(), String> {
        let tiers = [
            ("robot_temperature", self.robot_temperature),
            ("joint_temperature", self.joint_temperature),
            ("joint_current", self.joint_current),
            ("joint_torque", self.joint_torque),
            ("position_deviation", self.position_deviation),
        ];
        for (name, tier) in tiers {
            if tier.warning >= tier.critical {
                return Err(format!(
                    "{name}: warning ({}) must be below critical ({})",
                    tier.warning, tier.critical
                ));
            }
        }
        if self.voltage.low >= self.voltage.high {
            return Err(format!(
                "voltage: low ({}) must be below high ({})",
                self.voltage.low, self.voltage.high
            ));
        }
        Ok(())
    }
}

/// Seconds of persistence after which a condition is raised to each level.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    pub warning_after_secs: f64,
    pub critical_after_secs: f64,
    pub emergency_after_secs: f64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            warning_after_secs: 30.0,
            critical_after_secs: 120.0,
            emergency_after_secs: 300.0,
        }
    }
}

impl EscalationPolicy {
    pub fn validate(&self) -> Result<(), String> {
        let ordered = 0.0 < self.warning_after_secs
            && self.warning_after_secs < self.critical_after_secs
            && self.critical_after_secs < self.emergency_after_secs;
        if ordered {
            Ok(())
        } else {
            Err(format!(
                "escalation thresholds must be positive and strictly increasing, got {}/{}/{}",
                self.warning_after_secs, self.critical_after_secs, self.emergency_after_secs
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    pub window: usize,
    pub delta_celsius: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            window: 30,
            delta_celsius: 3.0,
        }
    }
}

impl TrendSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.window < 2 || self.window % 2 != 0 {
            return Err(format!(
                "trend window must be an even number >= 2, got {}",
                self.window
            ));
        }
        if !self.delta_celsius.is_finite() || self.delta_celsius < 0.0 {
            return Err(format!(
                "trend delta must be a non-negative number, got {}",
                self.delta_celsius
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ThresholdTable::default().validate().is_ok());
        assert!(EscalationPolicy::default().validate().is_ok());
        assert!(TrendSettings::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_tier_rejected() {
        let mut table = ThresholdTable::default();
        table.joint_current = TierLimits::new(3.0, 2.0);
        let err = table.validate().unwrap_err();
        assert!(err.contains("joint_current"));
    }

    #[test]
    fn test_unordered_escalation_rejected() {
        let policy = EscalationPolicy {
            warning_after_secs: 30.0,
            critical_after_secs: 30.0,
            emergency_after_secs: 300.0,
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_odd_trend_window_rejected() {
        let settings = TrendSettings {
            window: 31,
            delta_celsius: 3.0,
        };
        assert!(settings.validate().is_err());
    }
}
