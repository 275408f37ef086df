// Duration-based criticality escalation
use super::anomaly::{AnomalyIdentity, Severity};
use super::thresholds::EscalationPolicy;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAnomalyState {
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Result of one `escalate` call. `onset` is set only when the identity was
/// not tracked before this call, independent of the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escalation {
    pub severity: Severity,
    pub duration_seconds: f64,
    pub onset: bool,
}

/// Tracks when each anomaly identity was first seen in its current run.
///
/// Entries are never expired here: an identity stays tracked until
/// [`EscalationTracker::clear`] or [`EscalationTracker::reset`] is called,
/// so a later recurrence reuses the original `first_seen_at`. The ingestion
/// pipeline decides when a condition counts as resolved.
#[derive(Debug, Clone, Default)]
pub struct EscalationTracker {
    policy: EscalationPolicy,
    active: HashMap<AnomalyIdentity, ActiveAnomalyState>,
}

impl EscalationTracker {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self {
            policy,
            active: HashMap::new(),
        }
    }

    /// Returns the reported severity and seconds since onset. Duration can
    /// only raise the instantaneous severity, never lower it.
    pub fn escalate(
        &mut self,
        identity: AnomalyIdentity,
        instantaneous: Severity,
        now: DateTime<Utc>,
    ) -> Escalation {
        let state = match self.active.get_mut(&identity) {
            Some(state) => state,
            None => {
                self.active.insert(
                    identity,
                    ActiveAnomalyState {
                        first_seen_at: now,
                        last_seen_at: now,
                    },
                );
                return Escalation {
                    severity: instantaneous,
                    duration_seconds: 0.0,
                    onset: true,
                };
            }
        };

        if now > state.last_seen_at {
            state.last_seen_at = now;
        }
        // Out-of-order clocks never shorten a run.
        let duration = (state.last_seen_at - state.first_seen_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let severity = if identity.kind.escalates_with_duration() {
            match self.floor_for(duration) {
                Some(floor) => floor.max(instantaneous),
                None => instantaneous,
            }
        } else {
            instantaneous
        };
        Escalation {
            severity,
            duration_seconds: duration,
            onset: false,
        }
    }

    fn floor_for(&self, duration: f64) -> Option<Severity> {
        if duration >= self.policy.emergency_after_secs {
            Some(Severity::Emergency)
        } else if duration >= self.policy.critical_after_secs {
            Some(Severity::Critical)
        } else if duration >= self.policy.warning_after_secs {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    pub fn clear(&mut self, identity: &AnomalyIdentity) -> bool {
        self.active.remove(identity).is_some()
    }

    pub fn reset(&mut self) {
        self.active.clear();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn tracked(&self) -> impl Iterator<Item = &AnomalyIdentity> {
        self.active.keys()
    }
}
