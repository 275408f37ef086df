// Log-only persistence gateway for running without InfluxDB
use crate::application::persistence_gateway::{EventRecord, PersistenceGateway, SampleId};
use crate::domain::sample::RobotSample;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LogGateway {
    next_sample_id: AtomicU64,
}

#[async_trait]
impl PersistenceGateway for LogGateway {
    async fn write_sample(&self, sample: &RobotSample) -> anyhow::Result<SampleId> {
        let id = self.next_sample_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "sample {} at {} (robot temp {:?})",
            id,
            sample.timestamp,
            sample.robot_temperature
        );
        Ok(id)
    }

    async fn write_event(&self, event: &EventRecord) -> anyhow::Result<()> {
        tracing::info!(
            "[{}] {} after {:.0}s: {}",
            event.severity,
            event.kind,
            event.duration_seconds.unwrap_or(0.0),
            event.description
        );
        Ok(())
    }
}
