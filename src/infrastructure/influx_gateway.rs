// InfluxDB persistence gateway - writes samples and events as line protocol
use crate::application::persistence_gateway::{EventRecord, PersistenceGateway, SampleId};
use crate::domain::sample::RobotSample;
use crate::infrastructure::config::InfluxSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct InfluxGateway {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    measurement_prefix: String,
    next_sample_id: AtomicU64,
}

impl InfluxGateway {
    pub fn new(settings: &InfluxSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            database: settings.database.clone(),
            retention_policy: settings.retention_policy.clone(),
            measurement_prefix: settings.measurement_prefix.clone(),
            next_sample_id: AtomicU64::new(1),
        }
    }

    fn build_write_url(&self) -> String {
        format!(
            "{}/write?db={}&rp={}&precision=ms",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    async fn write_lines(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(self.build_write_url())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .context("Failed to send write to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB write failed with status {}: {}", status, body);
        }
        Ok(())
    }

    fn sample_measurement(&self) -> String {
        format!("{}_sample", self.measurement_prefix)
    }

    fn event_measurement(&self) -> String {
        format!("{}_event", self.measurement_prefix)
    }
}

#[async_trait]
impl PersistenceGateway for InfluxGateway {
    async fn write_sample(&self, sample: &RobotSample) -> Result<SampleId> {
        let id = self.next_sample_id.fetch_add(1, Ordering::Relaxed);
        let line = sample_line(&self.sample_measurement(), sample, id);
        tracing::debug!("Writing sample {} to InfluxDB", id);
        self.write_lines(line).await?;
        Ok(id)
    }

    async fn write_event(&self, event: &EventRecord) -> Result<()> {
        let line = event_line(&self.event_measurement(), event);
        self.write_lines(line).await
    }
}

/// One line per sample: scalar robot fields plus `jN_<channel>` per joint.
fn sample_line(measurement: &str, sample: &RobotSample, id: SampleId) -> String {
    let mut fields = Fields::default();
    fields.int("sample_id", Some(id as i64));
    fields.string("task_state", Some(sample.task_state.as_str()));
    fields.int("task_mode", sample.task_mode);
    fields.bool("enabled", sample.enabled);
    fields.bool("powered_on", sample.powered_on);
    fields.bool("emergency_stop", sample.emergency_stop);
    fields.bool("protective_stop", sample.protective_stop);
    fields.bool("on_soft_limit", sample.on_soft_limit);
    fields.float("robot_temperature", sample.robot_temperature);
    fields.float("ambient_temperature", sample.ambient_temperature);
    fields.int("current_tool_id", sample.current_tool_id);
    fields.float("tcp_velocity", sample.tcp_velocity);

    for joint in &sample.joints {
        let n = joint.joint_number;
        fields.float(&format!("j{n}_current"), joint.current);
        fields.float(&format!("j{n}_temperature"), joint.temperature);
        fields.float(&format!("j{n}_voltage"), joint.voltage);
        fields.float(&format!("j{n}_torque"), joint.torque);
        fields.float(&format!("j{n}_error_status"), joint.error_status);
        fields.float(&format!("j{n}_deviation"), joint.position_deviation());
    }

    let mut line = escape_measurement(measurement);
    if let Some(name) = &sample.robot_name {
        let _ = write!(line, ",robot={}", escape_tag(name));
    }
    if let Some(id) = sample.robot_id {
        let _ = write!(line, ",robot_id={id}");
    }
    let _ = write!(
        line,
        " {} {}",
        fields.finish(),
        sample.timestamp.timestamp_millis()
    );
    line
}

fn event_line(measurement: &str, event: &EventRecord) -> String {
    let mut line = escape_measurement(measurement);
    let _ = write!(
        line,
        ",kind={},severity={}",
        event.kind.as_str(),
        event.severity.as_str()
    );
    if let Some(joint) = event.joint_number {
        let _ = write!(line, ",joint={joint}");
    }

    let mut fields = Fields::default();
    fields.string("description", Some(&event.description));
    fields.float("value", event.value);
    fields.float("threshold", event.threshold);
    fields.float("duration_seconds", event.duration_seconds);

    let _ = write!(
        line,
        " {} {}",
        fields.finish(),
        event.timestamp.timestamp_millis()
    );
    line
}

/// Field set builder; absent values are skipped rather than written as null.
#[derive(Default)]
struct Fields(Vec<String>);

impl Fields {
    fn float(&mut self, key: &str, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.0.push(format!("{key}={v}"));
        }
    }

    fn int(&mut self, key: &str, value: Option<i64>) {
        if let Some(v) = value {
            self.0.push(format!("{key}={v}i"));
        }
    }

    fn bool(&mut self, key: &str, value: bool) {
        self.0.push(format!("{key}={value}"));
    }

    fn string(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            self.0.push(format!("{key}=\"{escaped}\""));
        }
    }

    fn finish(self) -> String {
        self.0.join(",")
    }
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anomaly::{AnomalyKind, Severity};
    use chrono::{TimeZone, Utc};

    fn sample() -> RobotSample {
        let mut sample = RobotSample::empty(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        sample.robot_id = Some(1);
        sample.robot_name = Some("JAKA MiniCobo".to_string());
        sample.robot_temperature = Some(35.5);
        sample.powered_on = true;
        sample.joints[2].temperature = Some(41.0);
        sample.joints[2].commanded_position = Some(10.0);
        sample.joints[2].actual_position = Some(10.75);
        sample
    }

    #[test]
    fn test_sample_line_has_tags_fields_and_timestamp() {
        let line = sample_line("robot_sample", &sample(), 7);

        assert!(line.starts_with("robot_sample,robot=JAKA\\ MiniCobo,robot_id=1 "));
        assert!(line.ends_with(" 1700000000000"));
        assert!(line.contains("sample_id=7i"));
        assert!(line.contains("task_state=\"unknown\""));
        assert!(line.contains("enabled=true,powered_on=true"));
        assert!(line.contains("robot_temperature=35.5"));
        assert!(line.contains("j3_temperature=41"));
        assert!(line.contains("j3_deviation=0.75"));
        // Absent readings are omitted.
        assert!(!line.contains("j1_temperature"));
        assert!(!line.contains("ambient_temperature"));
    }

    #[test]
    fn test_event_line_escapes_description() {
        let event = EventRecord {
            timestamp: Utc.timestamp_millis_opt(1_700_000_005_000).unwrap(),
            kind: AnomalyKind::HighJointTemperature,
            severity: Severity::Critical,
            joint_number: Some(3),
            description: "Joint 3: temperature \"high\"".to_string(),
            value: Some(51.0),
            threshold: Some(50.0),
            duration_seconds: Some(12.5),
        };
        let line = event_line("robot_event", &event);

        assert_eq!(
            line,
            "robot_event,kind=high_joint_temperature,severity=critical,joint=3 \
             description=\"Joint 3: temperature \\\"high\\\"\",value=51,threshold=50,\
             duration_seconds=12.5 1700000005000"
        );
    }

    #[test]
    fn test_write_url_encodes_database() {
        let gateway = InfluxGateway::new(&InfluxSettings {
            host: "http://influx:8086/".to_string(),
            database: "robot monitor".to_string(),
            ..InfluxSettings::default()
        });
        assert_eq!(
            gateway.build_write_url(),
            "http://influx:8086/write?db=robot%20monitor&rp=autogen&precision=ms"
        );
        assert_eq!(gateway.sample_measurement(), "robot_sample");
    }
}
