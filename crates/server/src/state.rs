use std::path::Path;
use std::sync::Arc;

use framecast_core::{Config, RenderOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<RenderOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<RenderOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<RenderOrchestrator> {
        &self.orchestrator
    }

    /// Directory finished renders are written to and downloaded from.
    pub fn output_dir(&self) -> &Path {
        &self.config.render.output_dir
    }
}
