// Configuration loading - optional file plus environment overrides
use crate::domain::thresholds::{EscalationPolicy, ThresholdTable, TrendSettings};
use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttSettings,
    pub influx: InfluxSettings,
    pub http: HttpSettings,
    pub analysis: AnalysisSettings,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "jaka/monitor".to_string(),
            client_id: "robot-monitor".to_string(),
            username: None,
            password: None,
            qos: 1,
            keep_alive_secs: 60,
            reconnect_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InfluxSettings {
    pub enabled: bool,
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    pub measurement_prefix: String,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "http://localhost:8086".to_string(),
            token: String::new(),
            database: "robot_monitor".to_string(),
            retention_policy: "autogen".to_string(),
            measurement_prefix: "robot".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AnalysisSettings {
    pub thresholds: ThresholdTable,
    pub escalation: EscalationPolicy,
    pub trend: TrendSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Persist the raw sample on every Nth accepted frame
    pub persist_interval: u64,
    pub queue_capacity: usize,
    pub persistence_queue_capacity: usize,
    pub observer_capacity: usize,
    /// Consecutive frames without an anomaly before it is cleared (0 = never)
    pub resolve_after_absent_frames: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            persist_interval: 10,
            queue_capacity: 256,
            persistence_queue_capacity: 256,
            observer_capacity: 64,
            resolve_after_absent_frames: 3,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.analysis
            .thresholds
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid analysis.thresholds")?;
        self.analysis
            .escalation
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid analysis.escalation")?;
        self.analysis
            .trend
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid analysis.trend")?;

        let p = &self.pipeline;
        if p.persist_interval == 0 {
            anyhow::bail!("pipeline.persist_interval must be at least 1");
        }
        if p.queue_capacity == 0 || p.persistence_queue_capacity == 0 || p.observer_capacity == 0 {
            anyhow::bail!("pipeline queue capacities must be at least 1");
        }
        if self.mqtt.qos > 2 {
            anyhow::bail!("mqtt.qos must be 0, 1 or 2, got {}", self.mqtt.qos);
        }
        Ok(())
    }
}

/// Reads `config/monitor.*` when present, then `ROBOT_MONITOR__*` environment
/// overrides (e.g. `ROBOT_MONITOR__MQTT__HOST`).
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(
            config::Environment::with_prefix("ROBOT_MONITOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}
