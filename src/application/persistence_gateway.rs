// Persistence gateway trait for telemetry samples and anomaly events
use crate::domain::anomaly::{AnomalyKind, EscalatedAnomaly, Severity};
use crate::domain::sample::RobotSample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub type SampleId = u64;

/// One escalated anomaly as it is written to storage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub joint_number: Option<u8>,
    pub description: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub duration_seconds: Option<f64>,
}

impl EventRecord {
    pub fn from_anomaly(anomaly: &EscalatedAnomaly, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind: anomaly.candidate.kind,
            severity: anomaly.severity,
            joint_number: anomaly.candidate.joint_number,
            description: anomaly.candidate.description.clone(),
            value: anomaly.candidate.value,
            threshold: anomaly.candidate.threshold,
            duration_seconds: Some(anomaly.duration_seconds),
        }
    }
}

/// Append-only storage used by the ingestion pipeline. Both writes must be
/// safe to retry.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store a full telemetry sample and return its id
    async fn write_sample(&self, sample: &RobotSample) -> anyhow::Result<SampleId>;

    /// Store one anomaly event
    async fn write_event(&self, event: &EventRecord) -> anyhow::Result<()>;
}
