use std::sync::Arc;

use ytscribe::Orchestrator;

/// Shared by every handler. The orchestrator owns the process-wide model.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
