use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::services::{
    liveness::{self, LivenessMonitor, LivenessState},
    orchestrator::Orchestrator,
    transport::{HttpTransport, Transport},
};

/// Process-scoped client services, wired once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transport: Arc<HttpTransport>,
    pub liveness: Arc<LivenessMonitor>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Build the HTTP transport, the shared liveness monitor and the orchestrator.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let config = Arc::new(config);
        let transport = Arc::new(HttpTransport::new(&config)?);
        let monitor = liveness::shared(&config, Arc::clone(&transport) as Arc<dyn Transport>);

        Ok(Self::with_parts(config, transport, monitor))
    }

    pub fn with_parts(
        config: Arc<AppConfig>,
        transport: Arc<HttpTransport>,
        liveness: Arc<LivenessMonitor>,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            Arc::clone(&config),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&liveness) as Arc<dyn liveness::LivenessSource>,
        );

        Self {
            config,
            transport,
            liveness,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Start background services.
    pub fn start(&self) {
        self.liveness.start();
    }

    /// Stop background services; a running batch finishes its current item on its own.
    pub fn stop(&self) {
        self.orchestrator.cancel();
        self.liveness.stop();
    }

    /// Wait for the first liveness reading.
    pub async fn wait_until_ready(&self) -> LivenessState {
        self.liveness.wait_for_reading().await
    }
}
