use std::sync::Arc;

use darunner_core::{Config, SanitizedConfig, WorkItemOrchestrator};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<WorkItemOrchestrator>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    /// `orchestrator` should already forward its progress to `ws_broadcaster`.
    pub fn new(
        config: Config,
        orchestrator: Arc<WorkItemOrchestrator>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            orchestrator,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &WorkItemOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
