// Presentation layer - HTTP surface for dashboards and operators
pub mod app_state;
pub mod handlers;
