use std::sync::Arc;

use offboard_graph::{DirectoryApi, GraphClient, GraphSettings};
use tracing::info;

use crate::config::EngineConfig;
use crate::discovery::DiscoveryService;
use crate::error::EngineResult;
use crate::remediation::RemediationService;

/// Discovery and remediation sharing one directory connection.
#[derive(Debug, Clone)]
pub struct OffboardingEngine {
    discovery: DiscoveryService,
    remediation: RemediationService,
    config: EngineConfig,
}

impl OffboardingEngine {
    /// Builds the engine from client settings. Settings without
    /// credentials give an unconfigured engine that never opens an HTTP
    /// connection.
    pub fn from_settings(settings: &GraphSettings, config: EngineConfig) -> EngineResult<Self> {
        let directory = GraphClient::from_settings(settings)?
            .map(|client| Arc::new(client) as Arc<dyn DirectoryApi>);
        if directory.is_none() {
            info!("No identity provider credentials; live remediation disabled");
        }
        Ok(Self::new(directory, config))
    }

    #[must_use]
    pub fn with_directory(directory: Arc<dyn DirectoryApi>, config: EngineConfig) -> Self {
        Self::new(Some(directory), config)
    }

    #[must_use]
    pub fn unconfigured(config: EngineConfig) -> Self {
        Self::new(None, config)
    }

    fn new(directory: Option<Arc<dyn DirectoryApi>>, config: EngineConfig) -> Self {
        Self {
            discovery: DiscoveryService::new(directory.clone(), config.clone()),
            remediation: RemediationService::new(directory, &config),
            config,
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.remediation.is_configured()
    }

    #[must_use]
    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    #[must_use]
    pub fn remediation(&self) -> &RemediationService {
        &self.remediation
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
