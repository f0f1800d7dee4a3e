//! Configuration structures for the validation pipeline.

use serde::{Deserialize, Serialize};

/// Environment variable overriding `regime_service.base_url`.
pub const ENV_BASE_URL: &str = "NFSE_BASE_URL";

/// Environment variable overriding `regime_service.token`.
pub const ENV_TOKEN: &str = "NFSE_TOKEN";

/// Older unprefixed names, read when the prefixed ones are unset.
pub const LEGACY_ENV_BASE_URL: &str = "BASE_URL";
pub const LEGACY_ENV_TOKEN: &str = "TOKEN";

/// Main configuration for the nfse pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfseConfig {
    /// Withholding validation configuration.
    pub validation: ValidationConfig,

    /// Taxpayer-regime lookup service configuration.
    pub regime_service: RegimeServiceConfig,

    /// Batch processing configuration.
    pub batch: BatchConfig,
}

/// Withholding validation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Query the simplified-regime status of both parties before deciding
    /// whether withholdings are due. Off by default: every document with
    /// withholdings is validated.
    pub regime_check_enabled: bool,

    /// Keep expected values next to the match flags in reports.
    pub show_expected: bool,

    /// Log a warning when a CPF/CNPJ fails its check digits.
    pub warn_invalid_tax_ids: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            regime_check_enabled: false,
            show_expected: true,
            warn_invalid_tax_ids: true,
        }
    }
}

/// Regime lookup service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeServiceConfig {
    /// Base URL of the lookup service.
    pub base_url: String,

    /// Access token sent as a query parameter. Saved as `null` when unset.
    pub token: Option<String>,

    /// Path of the simplified-regime endpoint.
    pub endpoint: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RegimeServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            endpoint: "/receita-federal/simples".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of parallel workers.
    pub jobs: usize,

    /// File extensions considered invoice documents (case-insensitive).
    pub extensions: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            extensions: vec!["xml".to_string()],
        }
    }
}

impl NfseConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Apply `NFSE_BASE_URL` / `NFSE_TOKEN` (or `BASE_URL` / `TOKEN`) from
    /// the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |primary: &str, legacy: &str| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(legacy).filter(|v| !v.is_empty()))
        };

        if let Some(url) = var(ENV_BASE_URL, LEGACY_ENV_BASE_URL) {
            self.regime_service.base_url = url;
        }
        if let Some(token) = var(ENV_TOKEN, LEGACY_ENV_TOKEN) {
            self.regime_service.token = Some(token);
        }
    }

    /// Whether an extension names an invoice document.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.batch
            .extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_keep_regime_check_off() {
        let config = NfseConfig::default();
        assert!(!config.validation.regime_check_enabled);
        assert_eq!(config.batch.jobs, 4);
        assert_eq!(config.regime_service.endpoint, "/receita-federal/simples");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: NfseConfig =
            serde_json::from_str(r#"{"validation": {"regime_check_enabled": true}}"#).unwrap();
        assert!(config.validation.regime_check_enabled);
        assert!(config.validation.show_expected);
        assert_eq!(config.batch, BatchConfig::default());
    }

    #[test]
    fn test_overrides() {
        let mut config = NfseConfig::default();
        config.apply_overrides(|key| match key {
            ENV_BASE_URL => Some("https://api.example.com".to_string()),
            ENV_TOKEN => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.regime_service.base_url, "https://api.example.com");
        assert_eq!(config.regime_service.token, None);
    }

    #[test]
    fn test_legacy_env_names() {
        let mut config = NfseConfig::default();
        config.apply_overrides(|key| match key {
            LEGACY_ENV_BASE_URL => Some("https://legacy.example.com".to_string()),
            LEGACY_ENV_TOKEN => Some("abc".to_string()),
            ENV_TOKEN => Some("xyz".to_string()),
            _ => None,
        });
        assert_eq!(config.regime_service.base_url, "https://legacy.example.com");
        assert_eq!(config.regime_service.token.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_unset_token_is_serialized() {
        let json = serde_json::to_value(NfseConfig::default()).unwrap();
        assert_eq!(json["regime_service"]["token"], serde_json::Value::Null);

        let config: NfseConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.regime_service.token, None);
    }

    #[test]
    fn test_accepts_extension() {
        let config = NfseConfig::default();
        assert!(config.accepts_extension("XML"));
        assert!(!config.accepts_extension("pdf"));
    }
}
