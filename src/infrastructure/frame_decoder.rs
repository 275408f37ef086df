// Decoder for controller JSON frames into RobotSample
use crate::domain::sample::{JOINT_COUNT, JointSample, Pose, RobotSample, TaskState};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("malformed JSON frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// How far a frame's own clock may run ahead of the receive time before the
/// receive time is used instead
const MAX_CLOCK_LEAD_SECS: i64 = 300;

/// Positions inside `monitor_data`
const MONITOR_ROBOT_TEMP: usize = 2;
const MONITOR_AMBIENT_TEMP: usize = 3;
const MONITOR_JOINTS: usize = 5;

/// Positions inside one `monitor_data[5][i]` joint entry
const JOINT_CURRENT: usize = 0;
const JOINT_TEMPERATURE: usize = 1;
const JOINT_VOLTAGE: usize = 2;
const JOINT_ERROR_STATUS: usize = 3;
const JOINT_TORQUE: usize = 7;

/// Raw controller frame. Every field is kept loose so a wrong type on one
/// field only blanks that field; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireFrame {
    #[serde(rename = "ID")]
    id: Value,
    #[serde(rename = "NOME")]
    name: Value,
    timestamp: Value,
    task_state: Value,
    task_mode: Value,
    enabled: Value,
    powered_on: Value,
    emergency_stop: Value,
    protective_stop: Value,
    on_soft_limit: Value,
    current_tool_id: Value,
    curr_tcp_trans_vel: Value,
    position: Value,
    actual_position: Value,
    joint_position: Value,
    joint_actual_position: Value,
    #[serde(rename = "instVel")]
    inst_vel: Value,
    monitor_data: Value,
}

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub sample: RobotSample,
    /// Expected sections that were missing or short
    pub missing: Vec<&'static str>,
}

impl DecodedFrame {
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// `received_at` stamps frames that carry no `timestamp` of their own.
pub fn decode_frame(
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<DecodedFrame, FrameDecodeError> {
    let text = std::str::from_utf8(payload)?;
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(FrameDecodeError::NotAnObject(json_type(&value)));
    }
    let frame: WireFrame = serde_json::from_value(value)?;
    Ok(frame.into_sample(received_at))
}

impl WireFrame {
    fn into_sample(self, received_at: DateTime<Utc>) -> DecodedFrame {
        let mut missing = Vec::new();
        let monitor = self.monitor_data.as_array().map(Vec::as_slice).unwrap_or(&[]);
        if monitor.len() <= MONITOR_JOINTS {
            missing.push("monitor_data");
        }

        let mut sample = RobotSample::empty(sample_time(&self.timestamp, received_at));
        sample.robot_id = as_int(&self.id);
        sample.robot_name = self.name.as_str().map(str::to_string);
        sample.task_state = as_int(&self.task_state)
            .map(TaskState::from_code)
            .unwrap_or_default();
        sample.task_mode = as_int(&self.task_mode);
        // An absent enable flag must not look like a disabled robot.
        sample.enabled = as_flag(&self.enabled)
            .or_else(|| monitor.first().and_then(as_flag))
            .unwrap_or(true);
        sample.powered_on = as_flag(&self.powered_on)
            .or_else(|| monitor.get(1).and_then(as_flag))
            .unwrap_or(false);
        sample.emergency_stop = as_flag(&self.emergency_stop).unwrap_or(false);
        sample.protective_stop = as_flag(&self.protective_stop).unwrap_or(false);
        sample.on_soft_limit = as_flag(&self.on_soft_limit).unwrap_or(false);
        sample.robot_temperature = monitor.get(MONITOR_ROBOT_TEMP).and_then(Value::as_f64);
        sample.ambient_temperature = monitor.get(MONITOR_AMBIENT_TEMP).and_then(Value::as_f64);
        sample.current_tool_id = as_int(&self.current_tool_id);
        sample.tcp_velocity = self.curr_tcp_trans_vel.as_f64();
        sample.commanded_pose = pose(&self.position);
        sample.actual_pose = pose(&self.actual_position);

        let joint_entries = monitor
            .get(MONITOR_JOINTS)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if joint_entries.len() < JOINT_COUNT {
            missing.push("joints");
        }
        let commanded = numbers(&self.joint_position);
        let actual = numbers(&self.joint_actual_position);
        let velocity = numbers(&self.inst_vel);

        for (i, joint) in sample.joints.iter_mut().enumerate() {
            let entry = joint_entries
                .get(i)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if !joint_entries.is_empty() && entry.len() <= JOINT_TORQUE && i < joint_entries.len() {
                missing.push("joint_fields");
            }
            let reading = |index: usize| entry.get(index).and_then(Value::as_f64);
            *joint = JointSample {
                joint_number: joint.joint_number,
                current: reading(JOINT_CURRENT),
                temperature: reading(JOINT_TEMPERATURE),
                voltage: reading(JOINT_VOLTAGE),
                torque: reading(JOINT_TORQUE),
                error_status: reading(JOINT_ERROR_STATUS),
                commanded_position: commanded.get(i).copied().flatten(),
                actual_position: actual.get(i).copied().flatten(),
                velocity: velocity.get(i).copied().flatten(),
            };
        }
        missing.dedup();

        DecodedFrame { sample, missing }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
}

fn numbers(value: &Value) -> Vec<Option<f64>> {
    value
        .as_array()
        .map(|items| items.iter().map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn pose(value: &Value) -> Pose {
    let values = numbers(value);
    Pose(std::array::from_fn(|i| values.get(i).copied().flatten()))
}

/// A future-dated frame would pin escalation durations, so frame clocks more
/// than `MAX_CLOCK_LEAD_SECS` ahead fall back to the receive time.
fn sample_time(value: &Value, received_at: DateTime<Utc>) -> DateTime<Utc> {
    match timestamp(value) {
        Some(ts) if ts - received_at > TimeDelta::seconds(MAX_CLOCK_LEAD_SECS) => {
            tracing::debug!("Frame timestamp {} is ahead of receive time {}", ts, received_at);
            received_at
        }
        Some(ts) => ts,
        None => received_at,
    }
}

/// Epoch milliseconds, or an RFC 3339 string.
fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_f64()? as i64).single(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}
