// Infrastructure layer - External dependencies and adapters
pub mod chunked_stream;
pub mod config;
pub mod frame_decoder;
pub mod http_response;
pub mod influx_gateway;
pub mod log_gateway;
pub mod mqtt_subscriber;
