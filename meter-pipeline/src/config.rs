use serde::Deserialize;
use std::{fs, io};

use crate::{
    cache::CacheConfig, pipeline::PipelineError, pipeline::PipelineSettings,
    resolver::ResolverConfig, sinks::ExportConfig,
};

const DEFAULT_CONFIG_PATH: &str = "meter-pipeline.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub metrics: Option<MetricsConfig>,
    pub pipeline: PipelineSettings,
    pub resolver: ResolverConfig,
    pub export: ExportConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Reads `METER_PIPELINE_CONFIG`, or `meter-pipeline.toml` when unset.
    ///
    /// A missing default file yields the built-in defaults; a missing file
    /// named explicitly is an error.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let (path, explicit) = match env::var("METER_PIPELINE_CONFIG") {
            Ok(path) => (path, true),
            Err(_) => (DEFAULT_CONFIG_PATH.to_string(), false),
        };
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                tracing::info!(path = %path, "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(anyhow::anyhow!("failed to read config '{path}': {e}")),
        };
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pipeline.bucket_basis()?;
        self.export.delimiter_byte()?;
        if self.resolver.custom_threshold_months == 0 {
            return Err(PipelineError::Config(
                "resolver.custom_threshold_months must be at least 1".to_string(),
            ));
        }
        if self.pipeline.directions.is_empty() {
            return Err(PipelineError::Config(
                "pipeline.directions must map at least one document id".to_string(),
            ));
        }
        Ok(())
    }
}
