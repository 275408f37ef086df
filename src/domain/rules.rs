// Static threshold rules: one sample in, anomaly candidates out
use super::anomaly::{AnomalyCandidate, AnomalyIdentity, AnomalyKind, Severity};
use super::sample::{JointSample, RobotSample};
use super::thresholds::{ThresholdTable, TierLimits};

/// Stateless evaluator. Output order is fixed: robot temperature, joint
/// temperature, current, voltage, torque, position deviation, robot state.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    thresholds: ThresholdTable,
}

impl RuleEvaluator {
    pub fn new(thresholds: ThresholdTable) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, sample: &RobotSample) -> Vec<AnomalyCandidate> {
        let mut candidates = Vec::new();
        let t = &self.thresholds;

        if let Some(temp) = sample.robot_temperature {
            if let Some((severity, threshold)) = classify(temp, t.robot_temperature) {
                candidates.push(AnomalyCandidate {
                    kind: AnomalyKind::HighRobotTemperature,
                    joint_number: None,
                    severity_raw: severity,
                    value: Some(temp),
                    threshold: Some(threshold),
                    description: format!("Robot temperature {}: {:.1}°C", level(severity), temp),
                });
            }
        }

        self.check_joints(sample, &mut candidates, |joint| {
            let temp = joint.temperature?;
            let (severity, threshold) = classify(temp, t.joint_temperature)?;
            Some(joint_candidate(
                joint,
                AnomalyKind::HighJointTemperature,
                severity,
                temp,
                threshold,
                format!("temperature {} {:.1}°C", level(severity), temp),
            ))
        });

        self.check_joints(sample, &mut candidates, |joint| {
            let current = joint.current?.abs();
            let (severity, threshold) = classify(current, t.joint_current)?;
            Some(joint_candidate(
                joint,
                AnomalyKind::HighJointCurrent,
                severity,
                current,
                threshold,
                format!("current {} {:.2}A (possible overload)", level(severity), current),
            ))
        });

        self.check_joints(sample, &mut candidates, |joint| {
            let voltage = joint.voltage?;
            if voltage < t.voltage.low {
                Some(joint_candidate(
                    joint,
                    AnomalyKind::LowVoltage,
                    Severity::Warning,
                    voltage,
                    t.voltage.low,
                    format!("voltage low {:.1}V", voltage),
                ))
            } else if voltage > t.voltage.high {
                Some(joint_candidate(
                    joint,
                    AnomalyKind::HighVoltage,
                    Severity::Warning,
                    voltage,
                    t.voltage.high,
                    format!("voltage high {:.1}V", voltage),
                ))
            } else {
                None
            }
        });

        self.check_joints(sample, &mut candidates, |joint| {
            let torque = joint.torque?.abs();
            let (severity, threshold) = classify(torque, t.joint_torque)?;
            Some(joint_candidate(
                joint,
                AnomalyKind::HighTorque,
                severity,
                torque,
                threshold,
                format!("torque {} {:.2} (possible mechanical wear)", level(severity), torque),
            ))
        });

        self.check_joints(sample, &mut candidates, |joint| {
            let deviation = joint.position_deviation()?;
            let (severity, threshold) = classify(deviation, t.position_deviation)?;
            Some(joint_candidate(
                joint,
                AnomalyKind::PositionDeviation,
                severity,
                deviation,
                threshold,
                format!("position deviation {} {:.3}° (possible backlash)", level(severity), deviation),
            ))
        });

        candidates.extend(check_robot_state(sample));
        candidates
    }

    fn check_joints<F>(&self, sample: &RobotSample, out: &mut Vec<AnomalyCandidate>, rule: F)
    where
        F: Fn(&JointSample) -> Option<AnomalyCandidate>,
    {
        out.extend(sample.joints.iter().filter_map(rule));
    }
}

/// Critical wins over warning; thresholds are inclusive.
fn classify(value: f64, limits: TierLimits) -> Option<(Severity, f64)> {
    if value >= limits.critical {
        Some((Severity::Critical, limits.critical))
    } else if value >= limits.warning {
        Some((Severity::Warning, limits.warning))
    } else {
        None
    }
}

fn level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::Emergency => "critical",
        _ => "elevated",
    }
}

fn joint_candidate(
    joint: &JointSample,
    kind: AnomalyKind,
    severity: Severity,
    value: f64,
    threshold: f64,
    detail: String,
) -> AnomalyCandidate {
    AnomalyCandidate {
        kind,
        joint_number: Some(joint.joint_number),
        severity_raw: severity,
        value: Some(value),
        threshold: Some(threshold),
        description: format!("Joint {}: {}", joint.joint_number, detail),
    }
}

/// Whether `sample` carried the reading the rule behind `identity` looks at.
/// A missing reading says nothing about whether the condition has cleared.
/// State flags are always decoded, so they always count as read.
pub fn reading_present(sample: &RobotSample, identity: &AnomalyIdentity) -> bool {
    let joint = || {
        identity
            .joint_number
            .and_then(|n| sample.joints.iter().find(|j| j.joint_number == n))
    };
    match identity.kind {
        AnomalyKind::HighRobotTemperature | AnomalyKind::TemperatureTrend => {
            sample.robot_temperature.is_some()
        }
        AnomalyKind::HighJointTemperature => joint().is_some_and(|j| j.temperature.is_some()),
        AnomalyKind::HighJointCurrent => joint().is_some_and(|j| j.current.is_some()),
        AnomalyKind::LowVoltage | AnomalyKind::HighVoltage => {
            joint().is_some_and(|j| j.voltage.is_some())
        }
        AnomalyKind::HighTorque => joint().is_some_and(|j| j.torque.is_some()),
        AnomalyKind::PositionDeviation => {
            joint().is_some_and(|j| j.position_deviation().is_some())
        }
        AnomalyKind::EmergencyStop
        | AnomalyKind::ProtectiveStop
        | AnomalyKind::SoftLimit
        | AnomalyKind::RobotDisabled => true,
    }
}

fn check_robot_state(sample: &RobotSample) -> Vec<AnomalyCandidate> {
    let flags = [
        (
            sample.emergency_stop,
            AnomalyKind::EmergencyStop,
            Severity::Emergency,
            "Emergency stop activated",
        ),
        (
            sample.protective_stop,
            AnomalyKind::ProtectiveStop,
            Severity::Critical,
            "Protective stop activated",
        ),
        (
            sample.on_soft_limit,
            AnomalyKind::SoftLimit,
            Severity::Warning,
            "Software limit reached",
        ),
        (
            !sample.enabled,
            AnomalyKind::RobotDisabled,
            Severity::Info,
            "Robot disabled",
        ),
    ];

    flags
        .into_iter()
        .filter(|(active, ..)| *active)
        .map(|(_, kind, severity, description)| AnomalyCandidate {
            kind,
            joint_number: None,
            severity_raw: severity,
            value: None,
            threshold: None,
            description: description.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn nominal_sample() -> RobotSample {
        let mut sample = RobotSample::empty(Utc::now());
        sample.robot_temperature = Some(35.0);
        for joint in sample.joints.iter_mut() {
            joint.current = Some(1.0);
            joint.temperature = Some(28.0);
            joint.voltage = Some(48.5);
            joint.torque = Some(2.0);
            joint.commanded_position = Some(10.0);
            joint.actual_position = Some(10.1);
        }
        sample
    }

    fn kinds(candidates: &[AnomalyCandidate]) -> Vec<(AnomalyKind, Option<u8>, Severity)> {
        candidates
            .iter()
            .map(|c| (c.kind, c.joint_number, c.severity_raw))
            .collect()
    }

    #[test]
    fn test_nominal_sample_has_no_candidates() {
        let evaluator = RuleEvaluator::default();
        assert!(evaluator.evaluate(&nominal_sample()).is_empty());
    }

    #[test]
    fn test_critical_joint_temperature_suppresses_warning() {
        let mut sample = nominal_sample();
        sample.joints[2].temperature = Some(50.0);

        let candidates = RuleEvaluator::default().evaluate(&sample);
        assert_eq!(
            kinds(&candidates),
            vec![(AnomalyKind::HighJointTemperature, Some(3), Severity::Critical)]
        );
        assert_eq!(candidates[0].threshold, Some(50.0));
        assert_eq!(candidates[0].value, Some(50.0));
    }

    #[test]
    fn test_current_threshold_is_inclusive_and_absolute() {
        let mut sample = nominal_sample();
        sample.joints[0].current = Some(2.0);
        sample.joints[1].current = Some(-3.0);

        let candidates = RuleEvaluator::default().evaluate(&sample);
        assert_eq!(
            kinds(&candidates),
            vec![
                (AnomalyKind::HighJointCurrent, Some(1), Severity::Warning),
                (AnomalyKind::HighJointCurrent, Some(2), Severity::Critical),
            ]
        );
        assert_eq!(candidates[1].value, Some(3.0));
    }

    #[test]
    fn test_voltage_band_reports_both_directions_as_warning() {
        let mut sample = nominal_sample();
        sample.joints[0].voltage = Some(47.9);
        sample.joints[5].voltage = Some(52.1);
        sample.joints[3].voltage = Some(52.0);

        let candidates = RuleEvaluator::default().evaluate(&sample);
        assert_eq!(
            kinds(&candidates),
            vec![
                (AnomalyKind::LowVoltage, Some(1), Severity::Warning),
                (AnomalyKind::HighVoltage, Some(6), Severity::Warning),
            ]
        );
    }

    #[test]
    fn test_torque_and_position_tiers() {
        let mut sample = nominal_sample();
        sample.joints[1].torque = Some(-3.2);
        sample.joints[4].torque = Some(3.5);
        sample.joints[2].actual_position = Some(10.5);
        sample.joints[3].actual_position = Some(8.5);

        let candidates = RuleEvaluator::default().evaluate(&sample);
        assert_eq!(
            kinds(&candidates),
            vec![
                (AnomalyKind::HighTorque, Some(2), Severity::Warning),
                (AnomalyKind::HighTorque, Some(5), Severity::Critical),
                (AnomalyKind::PositionDeviation, Some(3), Severity::Warning),
                (AnomalyKind::PositionDeviation, Some(4), Severity::Critical),
            ]
        );
    }

    #[test]
    fn test_robot_state_flags() {
        let mut sample = nominal_sample();
        sample.emergency_stop = true;
        sample.protective_stop = true;
        sample.on_soft_limit = true;
        sample.enabled = false;

        let candidates = RuleEvaluator::default().evaluate(&sample);
        assert_eq!(
            kinds(&candidates),
            vec![
                (AnomalyKind::EmergencyStop, None, Severity::Emergency),
                (AnomalyKind::ProtectiveStop, None, Severity::Critical),
                (AnomalyKind::SoftLimit, None, Severity::Warning),
                (AnomalyKind::RobotDisabled, None, Severity::Info),
            ]
        );
    }

    #[test]
    fn test_stable_ordering_across_channels() {
        let mut sample = nominal_sample();
        sample.robot_temperature = Some(46.0);
        sample.joints[0].temperature = Some(41.0);
        sample.joints[0].current = Some(2.5);
        sample.joints[0].voltage = Some(40.0);
        sample.joints[0].torque = Some(3.1);
        sample.joints[0].actual_position = Some(12.0);
        sample.on_soft_limit = true;

        let order: Vec<AnomalyKind> = RuleEvaluator::default()
            .evaluate(&sample)
            .iter()
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            order,
            vec![
                AnomalyKind::HighRobotTemperature,
                AnomalyKind::HighJointTemperature,
                AnomalyKind::HighJointCurrent,
                AnomalyKind::LowVoltage,
                AnomalyKind::HighTorque,
                AnomalyKind::PositionDeviation,
                AnomalyKind::SoftLimit,
            ]
        );
    }

    #[test]
    fn test_absent_readings_raise_nothing() {
        let sample = RobotSample::empty(Utc::now());
        assert!(RuleEvaluator::default().evaluate(&sample).is_empty());
    }

    #[test]
    fn test_reading_present_follows_the_rule_channel() {
        let mut sample = nominal_sample();
        sample.joints[2].temperature = None;
        sample.robot_temperature = None;

        let joint_temp = |n| AnomalyIdentity::new(AnomalyKind::HighJointTemperature, Some(n));
        assert!(!reading_present(&sample, &joint_temp(3)));
        assert!(reading_present(&sample, &joint_temp(2)));
        assert!(!reading_present(&sample, &joint_temp(9)));
        assert!(reading_present(
            &sample,
            &AnomalyIdentity::new(AnomalyKind::HighTorque, Some(3))
        ));
        assert!(!reading_present(
            &sample,
            &AnomalyIdentity::new(AnomalyKind::TemperatureTrend, None)
        ));
        assert!(reading_present(
            &RobotSample::empty(Utc::now()),
            &AnomalyIdentity::new(AnomalyKind::EmergencyStop, None)
        ));
    }
}
