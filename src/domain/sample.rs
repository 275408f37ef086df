// Robot telemetry sample domain models
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const JOINT_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Unknown,
    Starting,
    Running,
    Paused,
    Idle,
    Error,
}

impl TaskState {
    /// Controller state codes; anything out of range is `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => TaskState::Starting,
            2 => TaskState::Running,
            3 => TaskState::Paused,
            4 => TaskState::Idle,
            5 => TaskState::Error,
            _ => TaskState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Unknown => "unknown",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Idle => "idle",
            TaskState::Error => "error",
        }
    }
}

/// Cartesian pose: x, y, z, rx, ry, rz. Missing components are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Pose(pub [Option<f64>; 6]);

/// One joint's slice of a frame. Every reading is optional: a short or
/// malformed joint entry leaves the affected channels absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointSample {
    pub joint_number: u8,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub torque: Option<f64>,
    pub commanded_position: Option<f64>,
    pub actual_position: Option<f64>,
    pub velocity: Option<f64>,
    pub error_status: Option<f64>,
}

impl JointSample {
    pub fn absent(joint_number: u8) -> Self {
        Self {
            joint_number,
            current: None,
            temperature: None,
            voltage: None,
            torque: None,
            commanded_position: None,
            actual_position: None,
            velocity: None,
            error_status: None,
        }
    }

    /// |commanded - actual|, only when both positions were reported.
    pub fn position_deviation(&self) -> Option<f64> {
        match (self.commanded_position, self.actual_position) {
            (Some(commanded), Some(actual)) => Some((commanded - actual).abs()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotSample {
    pub timestamp: DateTime<Utc>,
    pub robot_id: Option<i64>,
    pub robot_name: Option<String>,
    pub task_state: TaskState,
    pub task_mode: Option<i64>,
    pub enabled: bool,
    pub powered_on: bool,
    pub emergency_stop: bool,
    pub protective_stop: bool,
    pub on_soft_limit: bool,
    pub robot_temperature: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub current_tool_id: Option<i64>,
    pub tcp_velocity: Option<f64>,
    pub commanded_pose: Pose,
    pub actual_pose: Pose,
    pub joints: [JointSample; JOINT_COUNT],
}

impl RobotSample {
    /// A sample with every reading absent and the robot enabled.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            robot_id: None,
            robot_name: None,
            task_state: TaskState::Unknown,
            task_mode: None,
            enabled: true,
            powered_on: false,
            emergency_stop: false,
            protective_stop: false,
            on_soft_limit: false,
            robot_temperature: None,
            ambient_temperature: None,
            current_tool_id: None,
            tcp_velocity: None,
            commanded_pose: Pose::default(),
            actual_pose: Pose::default(),
            joints: std::array::from_fn(|i| JointSample::absent(i as u8 + 1)),
        }
    }
}
