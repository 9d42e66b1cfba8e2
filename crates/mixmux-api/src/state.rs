//! Application state.

use std::sync::Arc;

use mixmux_pipeline::{MergePipeline, PipelineConfig};

use crate::config::{ApiConfig, CatalogConfig};
use crate::services::CatalogClient;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<MergePipeline>,
    /// `None` when no catalog credentials are configured
    pub catalog: Option<Arc<CatalogClient>>,
}

impl AppState {
    /// Create new application state from the environment.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let pipeline = MergePipeline::new(PipelineConfig::from_env())?;
        let catalog = match CatalogConfig::from_env() {
            Some(catalog_config) => Some(Arc::new(CatalogClient::new(catalog_config)?)),
            None => None,
        };

        Ok(Self::with_parts(config, pipeline, catalog))
    }

    pub fn with_parts(
        config: ApiConfig,
        pipeline: MergePipeline,
        catalog: Option<Arc<CatalogClient>>,
    ) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            catalog,
        }
    }
}
