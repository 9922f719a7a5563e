//! Command implementations

pub mod access;
pub mod remediate;
pub mod scan;

use offboard_engine::{EngineConfig, OffboardingEngine};
use offboard_graph::GraphSettings;
use tracing::debug;

use crate::error::CliResult;

/// Builds the engine from `OFFBOARD_*` environment variables.
pub(crate) fn engine_from_env() -> CliResult<OffboardingEngine> {
    let settings = GraphSettings::from_env()?;
    let config = EngineConfig::from_env().map_err(offboard_engine::EngineError::from)?;
    debug!(
        configured = settings.is_configured(),
        graph_host = settings.graph_host(),
        max_concurrency = config.max_concurrency,
        "Loaded configuration"
    );
    Ok(OffboardingEngine::from_settings(&settings, config)?)
}
