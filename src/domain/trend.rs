// Half-window robot temperature trend detection
use super::anomaly::{AnomalyCandidate, AnomalyKind, Severity};
use super::sample::RobotSample;
use super::thresholds::TrendSettings;
use std::collections::VecDeque;

/// Keeps the last `window` robot temperature readings and compares the mean
/// of the newer half against the older half.
#[derive(Debug, Clone)]
pub struct TrendDetector {
    settings: TrendSettings,
    readings: VecDeque<f64>,
}

impl TrendDetector {
    pub fn new(settings: TrendSettings) -> Self {
        let readings = VecDeque::with_capacity(settings.window);
        Self { settings, readings }
    }

    /// Samples without a robot temperature leave the window untouched.
    pub fn observe(&mut self, sample: &RobotSample) -> Vec<AnomalyCandidate> {
        let Some(temp) = sample.robot_temperature else {
            return Vec::new();
        };

        if self.readings.len() == self.settings.window {
            self.readings.pop_front();
        }
        self.readings.push_back(temp);

        if self.readings.len() < self.settings.window {
            return Vec::new();
        }

        let half = self.settings.window / 2;
        let older = mean(self.readings.iter().take(half));
        let newer = mean(self.readings.iter().skip(half));

        if newer > older + self.settings.delta_celsius {
            vec![AnomalyCandidate {
                kind: AnomalyKind::TemperatureTrend,
                joint_number: None,
                severity_raw: Severity::Warning,
                value: Some(newer),
                threshold: Some(older + self.settings.delta_celsius),
                description: format!(
                    "Rising temperature trend detected: {:.1}°C -> {:.1}°C",
                    older, newer
                ),
            }]
        } else {
            Vec::new()
        }
    }
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self::new(TrendSettings::default())
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_at(temp: f64) -> RobotSample {
        let mut sample = RobotSample::empty(Utc::now());
        sample.robot_temperature = Some(temp);
        sample
    }

    fn feed(detector: &mut TrendDetector, temps: &[f64]) -> Vec<Vec<AnomalyCandidate>> {
        temps.iter().map(|t| detector.observe(&sample_at(*t))).collect()
    }

    #[test]
    fn test_cold_start_emits_nothing() {
        let mut detector = TrendDetector::default();
        let temps: Vec<f64> = (0..29).map(|i| 20.0 + i as f64).collect();
        let results = feed(&mut detector, &temps);
        assert!(results.iter().all(|r| r.is_empty()));

        // The thirtieth reading fills the window: 27.0 -> 42.0.
        let full = detector.observe(&sample_at(49.0));
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].value, Some(42.0));
    }

    #[test]
    fn test_delta_comparison_is_strict() {
        let mut detector = TrendDetector::default();
        let mut temps = vec![25.0; 15];
        temps.extend(vec![28.0; 15]);
        let results = feed(&mut detector, &temps);
        assert!(results.last().unwrap().is_empty());

        let mut detector = TrendDetector::default();
        let mut temps = vec![25.0; 15];
        temps.extend(vec![29.0; 15]);
        let results = feed(&mut detector, &temps);
        let last = results.last().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].kind, AnomalyKind::TemperatureTrend);
        assert_eq!(last[0].severity_raw, Severity::Warning);
        assert_eq!(last[0].value, Some(29.0));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut detector = TrendDetector::default();
        let mut temps = vec![25.0; 15];
        temps.extend(vec![29.1; 15]);
        let results = feed(&mut detector, &temps);
        assert_eq!(results.last().unwrap().len(), 1);

        // Thirty flat readings push the ramp out of the window.
        let results = feed(&mut detector, &[29.1; 30]);
        assert!(results.last().unwrap().is_empty());
    }

    #[test]
    fn test_missing_temperature_is_skipped() {
        let mut detector = TrendDetector::default();
        let mut temps = vec![25.0; 15];
        temps.extend(vec![29.1; 14]);
        feed(&mut detector, &temps);

        let empty = RobotSample::empty(Utc::now());
        assert!(detector.observe(&empty).is_empty());
        // Only 29 readings so far; the next real one completes the window.
        assert_eq!(detector.observe(&sample_at(29.1)).len(), 1);
    }
}
