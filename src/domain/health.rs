// Health score: fixed penalties subtracted from 100
use super::sample::RobotSample;
use super::thresholds::{ThresholdTable, TierLimits};

pub const MAX_SCORE: f64 = 100.0;
pub const MIN_SCORE: f64 = 0.0;

const ROBOT_TEMP_PENALTY: (f64, f64) = (10.0, 20.0);
const JOINT_TEMP_PENALTY: (f64, f64) = (3.0, 5.0);
const JOINT_CURRENT_PENALTY: (f64, f64) = (2.0, 5.0);
const JOINT_TORQUE_PENALTY: (f64, f64) = (2.0, 5.0);
const EMERGENCY_STOP_PENALTY: f64 = 50.0;
const PROTECTIVE_STOP_PENALTY: f64 = 30.0;

#[derive(Debug, Clone, Default)]
pub struct HealthScoreCalculator {
    thresholds: ThresholdTable,
}

impl HealthScoreCalculator {
    pub fn new(thresholds: ThresholdTable) -> Self {
        Self { thresholds }
    }

    /// 100 is nominal. Penalties stack and use strict `>` comparisons;
    /// absent readings cost nothing. Clamped to [0, 100].
    pub fn score(&self, sample: &RobotSample) -> f64 {
        let t = &self.thresholds;
        let mut penalty = 0.0;

        if let Some(temp) = sample.robot_temperature {
            penalty += tiered_penalty(temp, t.robot_temperature, ROBOT_TEMP_PENALTY);
        }

        for joint in &sample.joints {
            if let Some(temp) = joint.temperature {
                penalty += tiered_penalty(temp, t.joint_temperature, JOINT_TEMP_PENALTY);
            }
            if let Some(current) = joint.current {
                penalty += tiered_penalty(current.abs(), t.joint_current, JOINT_CURRENT_PENALTY);
            }
            if let Some(torque) = joint.torque {
                penalty += tiered_penalty(torque.abs(), t.joint_torque, JOINT_TORQUE_PENALTY);
            }
        }

        if sample.emergency_stop {
            penalty += EMERGENCY_STOP_PENALTY;
        }
        if sample.protective_stop {
            penalty += PROTECTIVE_STOP_PENALTY;
        }

        (MAX_SCORE - penalty).clamp(MIN_SCORE, MAX_SCORE)
    }
}

fn tiered_penalty(value: f64, limits: TierLimits, (warning, critical): (f64, f64)) -> f64 {
    let mut penalty = 0.0;
    if value > limits.warning {
        penalty += warning;
    }
    if value > limits.critical {
        penalty += critical;
    }
    penalty
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> RobotSample {
        let mut sample = RobotSample::empty(Utc::now());
        sample.robot_temperature = Some(30.0);
        for joint in sample.joints.iter_mut() {
            joint.temperature = Some(25.0);
            joint.current = Some(0.5);
            joint.torque = Some(1.5);
        }
        sample
    }

    #[test]
    fn test_nominal_sample_scores_full() {
        assert_eq!(HealthScoreCalculator::default().score(&sample()), 100.0);
    }

    #[test]
    fn test_robot_temperature_penalties_stack() {
        let calc = HealthScoreCalculator::default();
        let mut s = sample();
        s.robot_temperature = Some(60.0);
        assert_eq!(calc.score(&s), 70.0);

        s.robot_temperature = Some(50.0);
        assert_eq!(calc.score(&s), 90.0);
    }

    #[test]
    fn test_boundaries_are_strict() {
        let calc = HealthScoreCalculator::default();
        let mut s = sample();
        s.robot_temperature = Some(45.0);
        s.joints[0].current = Some(2.0);
        assert_eq!(calc.score(&s), 100.0);
    }

    #[test]
    fn test_joint_penalties_use_absolute_values() {
        let calc = HealthScoreCalculator::default();
        let mut s = sample();
        s.joints[0].temperature = Some(51.0);
        s.joints[1].current = Some(-3.5);
        s.joints[2].torque = Some(-3.2);
        // 8 + 7 + 2
        assert_eq!(calc.score(&s), 83.0);
    }

    #[test]
    fn test_score_is_clamped_at_zero() {
        let calc = HealthScoreCalculator::default();
        let mut s = sample();
        s.emergency_stop = true;
        s.protective_stop = true;
        s.robot_temperature = Some(70.0);
        for joint in s.joints.iter_mut() {
            joint.temperature = Some(60.0);
        }
        assert_eq!(calc.score(&s), 0.0);
    }

    #[test]
    fn test_adding_conditions_never_raises_score() {
        let calc = HealthScoreCalculator::default();
        let mut s = sample();
        let mut previous = calc.score(&s);
        let steps: Vec<Box<dyn Fn(&mut RobotSample)>> = vec![
            Box::new(|s: &mut RobotSample| s.joints[0].current = Some(2.5)),
            Box::new(|s: &mut RobotSample| s.protective_stop = true),
            Box::new(|s: &mut RobotSample| s.joints[3].torque = Some(4.0)),
            Box::new(|s: &mut RobotSample| s.robot_temperature = Some(56.0)),
            Box::new(|s: &mut RobotSample| s.emergency_stop = true),
        ];
        for step in steps {
            step(&mut s);
            let score = calc.score(&s);
            assert!(score <= previous);
            assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn test_missing_readings_cost_nothing() {
        let s = RobotSample::empty(Utc::now());
        assert_eq!(HealthScoreCalculator::default().score(&s), 100.0);
    }
}
