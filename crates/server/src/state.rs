use std::sync::Arc;
use convertino_core::{Config, ConversionService, SanitizedConfig, WorkerPool};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<ConversionService>,
    workers: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<ConversionService>, workers: Arc<WorkerPool>) -> Self {
        Self {
            config,
            service,
            workers,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &ConversionService {
        self.service.as_ref()
    }

    pub fn workers(&self) -> &WorkerPool {
        self.workers.as_ref()
    }
}
