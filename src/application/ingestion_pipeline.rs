// Ingestion pipeline - hands frames off the transport thread to a single
// analysis consumer, then fans results out to persistence and observers
use crate::application::analysis_service::{AnalysisBundle, AnalysisEngine};
use crate::application::persistence_gateway::{EventRecord, PersistenceGateway};
use crate::domain::anomaly::AnomalyIdentity;
use crate::domain::sample::RobotSample;
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::frame_decoder::{FrameDecodeError, decode_frame};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),

    #[error("analysis queue is full, frame dropped")]
    QueueFull,

    #[error("pipeline has stopped")]
    Stopped,
}

/// What observers receive. Delivery is at-most-once: a lagging subscriber
/// skips ahead rather than slowing the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Analysis(Arc<AnalysisBundle>),
    PersistenceFailed { operation: String, error: String },
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    accepted: AtomicU64,
    partial: AtomicU64,
    decode_failures: AtomicU64,
    dropped: AtomicU64,
    samples_persisted: AtomicU64,
    events_persisted: AtomicU64,
    persistence_failures: AtomicU64,
    persistence_dropped: AtomicU64,
    active_anomalies: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub partial: u64,
    pub decode_failures: u64,
    pub dropped: u64,
    pub samples_persisted: u64,
    pub events_persisted: u64,
    pub persistence_failures: u64,
    pub persistence_dropped: u64,
    /// Identities currently tracked for escalation
    pub active_anomalies: u64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            samples_persisted: self.samples_persisted.load(Ordering::Relaxed),
            events_persisted: self.events_persisted.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            persistence_dropped: self.persistence_dropped.load(Ordering::Relaxed),
            active_anomalies: self.active_anomalies.load(Ordering::Relaxed),
        }
    }
}

enum Command {
    Frame(RobotSample),
    Clear(AnomalyIdentity, oneshot::Sender<bool>),
    Reset,
    Shutdown,
}

struct PersistJob {
    sample: Option<Arc<AnalysisBundle>>,
    events: Vec<EventRecord>,
}

/// Cheap, cloneable producer side of the pipeline
pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Receiver<PipelineEvent>,
    latest: watch::Receiver<Option<Arc<AnalysisBundle>>>,
    stats: Arc<PipelineStats>,
}

impl Clone for PipelineHandle {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            events: self.events.resubscribe(),
            latest: self.latest.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl PipelineHandle {
    /// Transport callback entry point: decode and enqueue, never wait.
    pub fn on_raw_frame(&self, payload: &[u8]) -> Result<(), IngestError> {
        PipelineStats::bump(&self.stats.received);
        let decoded = match decode_frame(payload, Utc::now()) {
            Ok(decoded) => decoded,
            Err(e) => {
                PipelineStats::bump(&self.stats.decode_failures);
                tracing::warn!("Dropping malformed frame ({} bytes): {}", payload.len(), e);
                return Err(e.into());
            }
        };
        if decoded.is_partial() {
            PipelineStats::bump(&self.stats.partial);
            tracing::debug!("Partial frame, missing: {:?}", decoded.missing);
        }
        self.submit(decoded.sample)
    }

    /// Enqueue an already decoded sample.
    pub fn submit(&self, sample: RobotSample) -> Result<(), IngestError> {
        match self.commands.try_send(Command::Frame(sample)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                PipelineStats::bump(&self.stats.dropped);
                tracing::warn!("Analysis queue full, dropping frame");
                Err(IngestError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IngestError::Stopped),
        }
    }

    /// Stop tracking an identity. Queued behind any frames already accepted.
    pub async fn clear(&self, identity: AnomalyIdentity) -> Result<bool, IngestError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Clear(identity, reply))
            .await
            .map_err(|_| IngestError::Stopped)?;
        response.await.map_err(|_| IngestError::Stopped)
    }

    pub async fn reset(&self) -> Result<(), IngestError> {
        self.commands
            .send(Command::Reset)
            .await
            .map_err(|_| IngestError::Stopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.resubscribe()
    }

    pub fn latest(&self) -> Option<Arc<AnalysisBundle>> {
        self.latest.borrow().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

pub struct IngestionPipeline {
    handle: PipelineHandle,
    consumer: JoinHandle<()>,
    persister: JoinHandle<()>,
}

impl IngestionPipeline {
    /// Spawn the analysis consumer and the persistence worker. Must be called
    /// inside a tokio runtime.
    pub fn spawn(
        engine: AnalysisEngine,
        gateway: Arc<dyn PersistenceGateway>,
        config: &PipelineConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.queue_capacity);
        let (persist_tx, persist_rx) = mpsc::channel(config.persistence_queue_capacity);
        let (event_tx, event_rx) = broadcast::channel(config.observer_capacity);
        let (latest_tx, latest_rx) = watch::channel(None);
        let stats = Arc::new(PipelineStats::default());

        let consumer = Consumer {
            engine,
            persist_interval: config.persist_interval.max(1),
            accepted: 0,
            persist_tx,
            event_tx: event_tx.clone(),
            latest_tx,
            stats: stats.clone(),
        };
        let consumer = tokio::spawn(consumer.run(command_rx));
        let persister = tokio::spawn(persist_loop(persist_rx, gateway, event_tx, stats.clone()));

        tracing::info!(
            "Ingestion pipeline started (queue={}, persist every {} frames)",
            config.queue_capacity,
            config.persist_interval
        );

        Self {
            handle: PipelineHandle {
                commands: command_tx,
                events: event_rx,
                latest: latest_rx,
                stats,
            },
            consumer,
            persister,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Processes everything already queued, hands the last results to the
    /// persistence worker and waits for both tasks to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        if self.handle.commands.send(Command::Shutdown).await.is_err() {
            tracing::debug!("Analysis consumer already gone before shutdown");
        }
        self.consumer.await?;
        self.persister.await?;
        let stats = self.handle.stats();
        tracing::info!(
            "Ingestion pipeline stopped: {} accepted, {} dropped, {} decode failures",
            stats.accepted,
            stats.dropped,
            stats.decode_failures
        );
        Ok(())
    }
}

struct Consumer {
    engine: AnalysisEngine,
    persist_interval: u64,
    accepted: u64,
    persist_tx: mpsc::Sender<PersistJob>,
    event_tx: broadcast::Sender<PipelineEvent>,
    latest_tx: watch::Sender<Option<Arc<AnalysisBundle>>>,
    stats: Arc<PipelineStats>,
}

impl Consumer {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Frame(sample) => self.process(sample),
                Command::Clear(identity, reply) => {
                    let cleared = self.engine.clear(&identity);
                    self.publish_active_count();
                    tracing::info!("Cleared {} (was tracked: {})", identity, cleared);
                    let _ = reply.send(cleared);
                }
                Command::Reset => {
                    self.engine.reset();
                    self.publish_active_count();
                    tracing::info!("Escalation tracker reset");
                }
                Command::Shutdown => break,
            }
        }
        tracing::debug!("Analysis consumer exiting");
    }

    fn publish_active_count(&self) {
        self.stats
            .active_anomalies
            .store(self.engine.active_count() as u64, Ordering::Relaxed);
    }

    fn process(&mut self, sample: RobotSample) {
        self.accepted += 1;
        PipelineStats::bump(&self.stats.accepted);

        let bundle = Arc::new(self.engine.analyze(sample, self.accepted));
        self.publish_active_count();
        tracing::debug!(
            "Frame #{}: {} anomalies, health {:.0}",
            bundle.sequence,
            bundle.anomalies.len(),
            bundle.health_score
        );
        for identity in &bundle.resolved {
            tracing::info!("Anomaly {} resolved", identity);
        }

        let persist_sample = self.accepted % self.persist_interval == 0;
        let events: Vec<EventRecord> = bundle
            .anomalies
            .iter()
            .filter(|anomaly| persist_sample || anomaly.is_onset())
            .map(|anomaly| EventRecord::from_anomaly(anomaly, bundle.sample.timestamp))
            .collect();

        if persist_sample || !events.is_empty() {
            let job = PersistJob {
                sample: persist_sample.then(|| bundle.clone()),
                events,
            };
            if self.persist_tx.try_send(job).is_err() {
                PipelineStats::bump(&self.stats.persistence_dropped);
                tracing::warn!("Persistence queue full, skipping frame #{}", bundle.sequence);
            }
        }

        self.latest_tx.send_replace(Some(bundle.clone()));
        // No subscribers is fine.
        let _ = self.event_tx.send(PipelineEvent::Analysis(bundle));
    }
}

async fn persist_loop(
    mut jobs: mpsc::Receiver<PersistJob>,
    gateway: Arc<dyn PersistenceGateway>,
    event_tx: broadcast::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
) {
    let report = |operation: &str, error: anyhow::Error| {
        PipelineStats::bump(&stats.persistence_failures);
        tracing::warn!("Persistence {} failed: {:#}", operation, error);
        let _ = event_tx.send(PipelineEvent::PersistenceFailed {
            operation: operation.to_string(),
            error: format!("{:#}", error),
        });
    };

    while let Some(job) = jobs.recv().await {
        if let Some(bundle) = job.sample {
            match gateway.write_sample(&bundle.sample).await {
                Ok(id) => {
                    PipelineStats::bump(&stats.samples_persisted);
                    tracing::debug!("Stored frame #{} as sample {}", bundle.sequence, id);
                }
                Err(e) => report("write_sample", e),
            }
        }
        for event in &job.events {
            match gateway.write_event(event).await {
                Ok(()) => {
                    PipelineStats::bump(&stats.events_persisted);
                }
                Err(e) => report("write_event", e),
            }
        }
    }
    tracing::debug!("Persistence worker exiting");
}
