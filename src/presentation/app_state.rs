// Application state for HTTP handlers
use crate::application::ingestion_pipeline::PipelineHandle;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
}
