//! HTTP client for the simplified-regime lookup service.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

use nfse_core::error::LookupError;
use nfse_core::models::config::{NfseConfig, RegimeServiceConfig};
use nfse_core::regime::{RegimeLookup, SimplesResponse};

/// Lookup shared across batch workers.
pub type SharedLookup = Box<dyn RegimeLookup + Send + Sync>;

/// Build the lookup the configuration asks for.
///
/// With the regime check disabled the lookup is never queried, so no client
/// is created.
pub fn build(config: &NfseConfig) -> anyhow::Result<SharedLookup> {
    if !config.validation.regime_check_enabled {
        return Ok(Box::new(DisabledLookup));
    }

    if config.regime_service.base_url.is_empty() {
        anyhow::bail!(
            "regime check is enabled but no service URL is configured (set regime_service.base_url or NFSE_BASE_URL)"
        );
    }

    Ok(Box::new(HttpRegimeLookup::new(&config.regime_service)?))
}

/// Queries `POST {base_url}{endpoint}?cnpj=..&token=..`.
pub struct HttpRegimeLookup {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpRegimeLookup {
    pub fn new(config: &RegimeServiceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: endpoint_url(&config.base_url, &config.endpoint),
            token: config.token.clone(),
        })
    }
}

impl RegimeLookup for HttpRegimeLookup {
    fn is_simplified_regime(&self, tax_id: &str) -> Result<bool, LookupError> {
        debug!("Querying simplified regime for {}", tax_id);

        let mut query = vec![("cnpj", tax_id)];
        if let Some(token) = &self.token {
            query.push(("token", token.as_str()));
        }

        let response = self
            .client
            .post(&self.url)
            .query(&query)
            .send()
            .map_err(|e| LookupError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LookupError::Request(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(LookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        SimplesResponse::from_json(&body)?.is_simplified()
    }
}

/// Stand-in used while the regime check is disabled.
struct DisabledLookup;

impl RegimeLookup for DisabledLookup {
    fn is_simplified_regime(&self, _tax_id: &str) -> Result<bool, LookupError> {
        Err(LookupError::Request("regime check is disabled".to_string()))
    }
}

fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
