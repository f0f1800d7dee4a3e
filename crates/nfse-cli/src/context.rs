//! Settings and collaborators handed to each command.

use std::path::{Path, PathBuf};

use tracing::debug;

use nfse_core::models::config::NfseConfig;
use nfse_core::pipeline::DocumentProcessor;
use nfse_core::regime::RegimePolicy;

use crate::lookup::{self, SharedLookup};

/// Explicit run context: configuration plus the regime lookup built from it.
pub struct RunContext {
    pub config: NfseConfig,
    pub lookup: SharedLookup,
}

impl RunContext {
    /// Load configuration from `path`, else from the default location if it
    /// exists, else defaults. Environment overrides are applied last.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => NfseConfig::from_file(Path::new(path))?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    debug!("Using config from {}", default_path.display());
                    NfseConfig::from_file(&default_path)?
                } else {
                    NfseConfig::default()
                }
            }
        };
        config.apply_env_overrides();

        Self::from_config(config)
    }

    /// Build the context for an already loaded configuration.
    pub fn from_config(config: NfseConfig) -> anyhow::Result<Self> {
        let lookup = lookup::build(&config)?;
        Ok(Self { config, lookup })
    }

    /// Document processor configured from the validation settings.
    pub fn processor(&self, show_expected: bool) -> DocumentProcessor {
        let validation = &self.config.validation;
        DocumentProcessor::new()
            .with_policy(RegimePolicy::new(validation.regime_check_enabled))
            .with_show_expected(show_expected && validation.show_expected)
            .with_tax_id_warnings(validation.warn_invalid_tax_ids)
    }
}

/// `<config dir>/nfse/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nfse")
        .join("config.json")
}
