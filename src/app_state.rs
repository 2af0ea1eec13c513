use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::scheduler::Scheduler;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(scheduler: Scheduler, config: AppConfig) -> Self {
        Self {
            scheduler,
            config: Arc::new(config),
        }
    }
}
