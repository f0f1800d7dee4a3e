//! Simplified-regime (Simples Nacional) policy.
//!
//! The lookup itself is an external service; this module only defines the
//! interface the pipeline consumes and the decision made from its answers.

use serde::Deserialize;
use tracing::debug;

use crate::error::{LookupError, NfseError, ValidationError};

/// Status text the service returns for taxpayers outside the regime.
pub const NOT_OPTED_IN: &str = "NÃO optante pelo Simples Nacional";

/// Lookup of a taxpayer's simplified-regime status.
pub trait RegimeLookup {
    /// Whether the taxpayer identified by `tax_id` is under the simplified regime.
    fn is_simplified_regime(&self, tax_id: &str) -> Result<bool, LookupError>;
}

/// Decides whether withholdings should be validated for a pair of parties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegimePolicy {
    /// When false the lookup is never called and validation always runs.
    pub regime_check_enabled: bool,
}

impl RegimePolicy {
    /// Create a policy.
    pub fn new(regime_check_enabled: bool) -> Self {
        Self {
            regime_check_enabled,
        }
    }

    /// Whether withholdings are due and must be validated.
    ///
    /// With the check enabled, withholdings are due only when neither party
    /// is under the simplified regime. Lookup failures are returned as-is.
    pub fn should_validate(
        &self,
        lookup: &dyn RegimeLookup,
        provider_tax_id: &str,
        customer_tax_id: &str,
    ) -> Result<bool, NfseError> {
        if provider_tax_id.is_empty() || customer_tax_id.is_empty() {
            return Err(ValidationError::InvalidInput(
                "provider and customer tax IDs are required for the regime check".to_string(),
            )
            .into());
        }

        if !self.regime_check_enabled {
            return Ok(true);
        }

        let customer_simplified = lookup.is_simplified_regime(customer_tax_id)?;
        let provider_simplified = lookup.is_simplified_regime(provider_tax_id)?;

        debug!(
            "Simplified regime: customer {}={}, provider {}={}",
            customer_tax_id, customer_simplified, provider_tax_id, provider_simplified
        );

        Ok(!customer_simplified && !provider_simplified)
    }
}

/// Payload of the simplified-regime service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimplesResponse {
    #[serde(default)]
    pub data: Vec<SimplesEntry>,
}

/// One taxpayer entry of [`SimplesResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimplesEntry {
    #[serde(default)]
    pub simei_situacao: Option<String>,
    #[serde(default)]
    pub simples_nacional_situacao: Option<String>,
}

impl SimplesResponse {
    /// Decode a JSON body.
    pub fn from_json(body: &str) -> Result<Self, LookupError> {
        serde_json::from_str(body).map_err(|e| LookupError::UnexpectedResponse(e.to_string()))
    }

    /// Whether the first entry reports the taxpayer as opted in.
    pub fn is_simplified(&self) -> Result<bool, LookupError> {
        let entry = self
            .data
            .first()
            .ok_or_else(|| LookupError::UnexpectedResponse("response has no 'data'".to_string()))?;

        let status = entry
            .simples_nacional_situacao
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                LookupError::UnexpectedResponse(
                    "response has no 'simples_nacional_situacao'".to_string(),
                )
            })?;

        Ok(status != NOT_OPTED_IN)
    }
}
