// Domain layer - Telemetry model and the pure analysis stages
pub mod anomaly;
pub mod escalation;
pub mod health;
pub mod rules;
pub mod sample;
pub mod thresholds;
pub mod trend;
