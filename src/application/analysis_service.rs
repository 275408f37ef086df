// Analysis engine - chains the analysis stages for one sample
use crate::domain::anomaly::{AnomalyIdentity, EscalatedAnomaly};
use crate::domain::escalation::EscalationTracker;
use crate::domain::health::HealthScoreCalculator;
use crate::domain::rules::{RuleEvaluator, reading_present};
use crate::domain::sample::RobotSample;
use crate::domain::thresholds::{EscalationPolicy, ThresholdTable, TrendSettings};
use crate::domain::trend::TrendDetector;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Everything observers get for one accepted frame
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisBundle {
    pub sequence: u64,
    pub sample: RobotSample,
    pub anomalies: Vec<EscalatedAnomaly>,
    pub health_score: f64,
    /// Identities cleared by the auto-resolve policy on this frame
    pub resolved: Vec<AnomalyIdentity>,
}

/// Owns the stateful stages (trend window, escalation tracker). Not shared:
/// the ingestion pipeline drives it from a single consumer task.
pub struct AnalysisEngine {
    rules: RuleEvaluator,
    trend: TrendDetector,
    tracker: EscalationTracker,
    health: HealthScoreCalculator,
    resolve_after_absent: u32,
    absent_counts: HashMap<AnomalyIdentity, u32>,
}

impl AnalysisEngine {
    /// `resolve_after_absent` is the number of consecutive samples without an
    /// identity before it is cleared; 0 keeps identities tracked forever.
    pub fn new(
        thresholds: ThresholdTable,
        escalation: EscalationPolicy,
        trend: TrendSettings,
        resolve_after_absent: u32,
    ) -> Self {
        Self {
            rules: RuleEvaluator::new(thresholds.clone()),
            trend: TrendDetector::new(trend),
            tracker: EscalationTracker::new(escalation),
            health: HealthScoreCalculator::new(thresholds),
            resolve_after_absent,
            absent_counts: HashMap::new(),
        }
    }

    pub fn analyze(&mut self, sample: RobotSample, sequence: u64) -> AnalysisBundle {
        let now = sample.timestamp;

        let mut candidates = self.rules.evaluate(&sample);
        candidates.extend(self.trend.observe(&sample));

        let mut seen = HashSet::with_capacity(candidates.len());
        let anomalies: Vec<EscalatedAnomaly> = candidates
            .into_iter()
            .map(|candidate| {
                let identity = candidate.identity();
                seen.insert(identity);
                let escalation = self.tracker.escalate(identity, candidate.severity_raw, now);
                EscalatedAnomaly {
                    candidate,
                    severity: escalation.severity,
                    duration_seconds: escalation.duration_seconds,
                    onset: escalation.onset,
                }
            })
            .collect();

        let resolved = self.resolve_absent(&sample, &seen);
        let health_score = self.health.score(&sample);

        AnalysisBundle {
            sequence,
            sample,
            anomalies,
            health_score,
            resolved,
        }
    }

    /// Only samples that carried the identity's reading count towards
    /// resolving it; a frame with the channel missing leaves the count alone.
    fn resolve_absent(
        &mut self,
        sample: &RobotSample,
        seen: &HashSet<AnomalyIdentity>,
    ) -> Vec<AnomalyIdentity> {
        for identity in seen {
            self.absent_counts.remove(identity);
        }
        if self.resolve_after_absent == 0 {
            return Vec::new();
        }

        let missing: Vec<AnomalyIdentity> = self
            .tracker
            .tracked()
            .filter(|identity| !seen.contains(identity) && reading_present(sample, identity))
            .copied()
            .collect();

        let mut resolved = Vec::new();
        for identity in missing {
            let count = self.absent_counts.entry(identity).or_insert(0);
            *count += 1;
            if *count >= self.resolve_after_absent {
                self.absent_counts.remove(&identity);
                self.tracker.clear(&identity);
                resolved.push(identity);
            }
        }
        resolved.sort_by_key(|identity| identity.to_string());
        resolved
    }

    pub fn clear(&mut self, identity: &AnomalyIdentity) -> bool {
        self.absent_counts.remove(identity);
        self.tracker.clear(identity)
    }

    pub fn reset(&mut self) {
        self.absent_counts.clear();
        self.tracker.reset();
    }

    /// Number of identities currently tracked for escalation
    pub fn active_count(&self) -> usize {
        self.tracker.len()
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(
            ThresholdTable::default(),
            EscalationPolicy::default(),
            TrendSettings::default(),
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anomaly::{AnomalyKind, Severity};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn sample_at(secs: i64) -> RobotSample {
        let mut sample = RobotSample::empty(at(secs));
        sample.robot_temperature = Some(30.0);
        for joint in sample.joints.iter_mut() {
            joint.temperature = Some(25.0);
            joint.current = Some(0.5);
            joint.voltage = Some(48.5);
            joint.torque = Some(1.5);
        }
        sample
    }

    fn engine(resolve_after_absent: u32) -> AnalysisEngine {
        AnalysisEngine::new(
            ThresholdTable::default(),
            EscalationPolicy::default(),
            TrendSettings::default(),
            resolve_after_absent,
        )
    }

    #[test]
    fn test_bundle_carries_escalated_anomalies_and_score() {
        let mut engine = engine(0);
        let mut sample = sample_at(0);
        sample.joints[1].current = Some(3.2);

        let bundle = engine.analyze(sample, 1);
        assert_eq!(bundle.sequence, 1);
        assert_eq!(bundle.anomalies.len(), 1);
        assert_eq!(bundle.anomalies[0].severity, Severity::Critical);
        assert_eq!(bundle.anomalies[0].duration_seconds, 0.0);
        assert!(bundle.anomalies[0].onset);
        assert_eq!(bundle.health_score, 93.0);
    }

    #[test]
    fn test_persistent_warning_escalates_with_sample_time() {
        let mut engine = engine(0);
        let mut last = None;
        for secs in (0..=150).step_by(10) {
            let mut sample = sample_at(secs);
            sample.joints[0].temperature = Some(42.0);
            last = Some(engine.analyze(sample, secs as u64));
        }
        let anomaly = &last.unwrap().anomalies[0];
        assert_eq!(anomaly.candidate.severity_raw, Severity::Warning);
        assert_eq!(anomaly.severity, Severity::Critical);
        assert_eq!(anomaly.duration_seconds, 150.0);
    }

    fn is_tracked(engine: &AnalysisEngine, identity: &AnomalyIdentity) -> bool {
        engine.tracker.tracked().any(|tracked| tracked == identity)
    }

    #[test]
    fn test_auto_resolve_after_consecutive_absence() {
        let mut engine = engine(2);
        let identity = AnomalyIdentity::new(AnomalyKind::HighTorque, Some(3));

        let mut hot = sample_at(0);
        hot.joints[2].torque = Some(3.1);
        engine.analyze(hot.clone(), 1);
        assert!(is_tracked(&engine, &identity));

        let bundle = engine.analyze(sample_at(1), 2);
        assert!(bundle.resolved.is_empty());
        assert!(is_tracked(&engine, &identity));

        // Recurrence resets the absence count.
        hot.timestamp = at(2);
        engine.analyze(hot, 3);
        engine.analyze(sample_at(3), 4);
        let bundle = engine.analyze(sample_at(4), 5);
        assert_eq!(bundle.resolved, vec![identity]);
        assert!(!is_tracked(&engine, &identity));
    }

    #[test]
    fn test_without_auto_resolve_first_seen_is_reused() {
        let mut engine = engine(0);
        let mut stopped = sample_at(0);
        stopped.emergency_stop = true;

        let first = engine.analyze(stopped.clone(), 1);
        assert_eq!(first.anomalies[0].severity, Severity::Emergency);
        assert_eq!(first.anomalies[0].duration_seconds, 0.0);

        engine.analyze(sample_at(5), 2);

        stopped.timestamp = at(400);
        let again = engine.analyze(stopped, 3);
        assert_eq!(again.anomalies[0].duration_seconds, 400.0);
    }

    #[test]
    fn test_clear_and_reset() {
        let mut engine = engine(0);
        let mut sample = sample_at(0);
        sample.protective_stop = true;
        sample.on_soft_limit = true;
        engine.analyze(sample, 1);
        assert_eq!(engine.active_count(), 2);

        assert!(engine.clear(&AnomalyIdentity::new(AnomalyKind::SoftLimit, None)));
        assert_eq!(engine.active_count(), 1);
        engine.reset();
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_missing_readings_do_not_resolve_a_running_condition() {
        let mut engine = engine(3);
        let identity = AnomalyIdentity::new(AnomalyKind::HighJointTemperature, Some(3));
        let hot = |secs| {
            let mut sample = sample_at(secs);
            sample.joints[2].temperature = Some(42.0);
            sample
        };

        for secs in (0..=100).step_by(10) {
            engine.analyze(hot(secs), secs as u64);
        }
        // Frames without monitor data: every joint and robot reading absent.
        for secs in 101..=103 {
            let bundle = engine.analyze(RobotSample::empty(at(secs)), secs as u64);
            assert!(bundle.resolved.is_empty());
        }
        assert!(is_tracked(&engine, &identity));

        engine.analyze(hot(110), 110);
        let bundle = engine.analyze(hot(130), 130);
        let anomaly = &bundle.anomalies[0];
        assert_eq!(anomaly.identity(), identity);
        assert!(!anomaly.onset);
        assert_eq!(anomaly.duration_seconds, 130.0);
        assert_eq!(anomaly.severity, Severity::Critical);
    }

    #[test]
    fn test_repeated_timestamp_is_not_a_second_onset() {
        let mut engine = engine(0);
        let mut sample = sample_at(0);
        sample.joints[0].torque = Some(3.2);

        let first = engine.analyze(sample.clone(), 1);
        let second = engine.analyze(sample, 2);
        assert!(first.anomalies[0].onset);
        assert_eq!(second.anomalies[0].duration_seconds, 0.0);
        assert!(!second.anomalies[0].onset);
    }
}
