// Application layer - Analysis and ingestion use cases
pub mod analysis_service;
pub mod ingestion_pipeline;
pub mod persistence_gateway;
