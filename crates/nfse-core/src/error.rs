//! Error types for the nfse-core library.

use thiserror::Error;

use crate::retention::RetentionKind;

/// Main error type for the nfse library.
#[derive(Error, Debug)]
pub enum NfseError {
    /// Document extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Withholding validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Regime lookup error from the external service.
    #[error("regime lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NfseError {
    /// Whether the error only means the document lacks the identifiers
    /// needed to run the checks. Such documents are skipped, not failed.
    pub fn is_skippable(&self) -> bool {
        matches!(self, NfseError::Validation(ValidationError::InvalidInput(_)))
    }
}

/// Errors related to reading fields out of an invoice document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The source is not well-formed XML.
    #[error("malformed document: {0}")]
    Parse(String),

    /// Required tag is absent and no fallback was configured.
    #[error("missing required field: {tag}")]
    MissingField { tag: String },

    /// Neither the primary tag nor its fallback is present.
    #[error("missing required field: {primary} (fallback {fallback} also absent)")]
    MissingFieldWithFallback { primary: String, fallback: String },

    /// A monetary field holds text that is not a number.
    #[error("invalid numeric value for {tag}: {value:?}")]
    NumericFormat { tag: String, value: String },

    /// A monetary field holds a negative amount.
    #[error("negative amount for {tag}: {value:?}")]
    NegativeAmount { tag: String, value: String },

    /// Declared amounts are too large to be added up.
    #[error("amounts out of range: {0}")]
    AmountOverflow(String),

    /// A date field could not be parsed.
    #[error("invalid date for {field}: {value:?}")]
    InvalidDate { field: String, value: String },
}

/// Errors raised while checking the declared withholdings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// One or more recomputed withholdings disagree with the declared values.
    #[error(
        "wrong withholdings: [{}] - provider: {provider_tax_id}, customer: {customer_tax_id} ({source_reference})",
        kind_list(.kinds)
    )]
    RetentionMismatch {
        kinds: Vec<RetentionKind>,
        provider_tax_id: String,
        customer_tax_id: String,
        source_reference: String,
    },

    /// Provider or customer identifiers are absent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Recomputing an expected value left the representable range.
    #[error("amounts out of range: {source_reference}")]
    AmountOverflow { source_reference: String },

    /// Withholdings present where the regime rules forbid them.
    #[error("{reason}: {source_reference}")]
    RegimeInconsistency {
        source_reference: String,
        reason: String,
    },
}

/// Errors from the taxpayer-regime lookup service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The payload lacks the expected fields.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

fn kind_list(kinds: &[RetentionKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for the nfse library.
pub type Result<T> = std::result::Result<T, NfseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_kinds_and_parties() {
        let err = ValidationError::RetentionMismatch {
            kinds: vec![RetentionKind::Irpj, RetentionKind::Cofins],
            provider_tax_id: "11222333000181".to_string(),
            customer_tax_id: "44555666000199".to_string(),
            source_reference: "xml/nota.xml".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("[irpj, cofins]"));
        assert!(msg.contains("11222333000181"));
        assert!(msg.contains("44555666000199"));
        assert!(msg.contains("xml/nota.xml"));
    }

    #[test]
    fn test_only_invalid_input_is_skippable() {
        let skip: NfseError = ValidationError::InvalidInput("no provider".into()).into();
        assert!(skip.is_skippable());

        let fail: NfseError = ExtractionError::Parse("eof".into()).into();
        assert!(!fail.is_skippable());
    }
}
