//! Per-document checks and batch bookkeeping.
//!
//! A document moves through `parsed → metadata extracted → values extracted`
//! and ends in one of: validated, failed, skipped (cancelled) or skipped
//! (no withholdings expected). Failures are carried as errors.

use serde::Serialize;
use tracing::{info, warn};

use crate::document::Document;
use crate::error::{NfseError, ValidationError};
use crate::models::tax_id::validate_tax_id;
use crate::regime::{RegimeLookup, RegimePolicy};
use crate::retention::{LoadedInvoice, RetentionValidator, ValidationResult};

/// Why a document was not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A successful cancellation confirmation is attached.
    Cancelled,
    /// No withholdings are declared and none are due.
    NoRetentionsExpected,
}

/// Terminal, non-failing state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// All four withholdings matched; `result` also holds the net check.
    Validated {
        invoice: LoadedInvoice,
        result: ValidationResult,
    },
    /// The document was not validated.
    Skipped {
        invoice: LoadedInvoice,
        reason: SkipReason,
    },
}

impl DocumentOutcome {
    /// The loaded invoice behind the outcome.
    pub fn invoice(&self) -> &LoadedInvoice {
        match self {
            DocumentOutcome::Validated { invoice, .. } | DocumentOutcome::Skipped { invoice, .. } => {
                invoice
            }
        }
    }
}

/// Runs the checks on one document at a time.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    validator: RetentionValidator,
    policy: RegimePolicy,
    show_expected: bool,
    warn_invalid_tax_ids: bool,
}

impl DocumentProcessor {
    /// Create a processor with the regime check disabled.
    pub fn new() -> Self {
        Self {
            validator: RetentionValidator::new(),
            policy: RegimePolicy::default(),
            show_expected: true,
            warn_invalid_tax_ids: true,
        }
    }

    /// Set the regime policy.
    pub fn with_policy(mut self, policy: RegimePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Keep expected values in validation results.
    pub fn with_show_expected(mut self, show_expected: bool) -> Self {
        self.show_expected = show_expected;
        self
    }

    /// Log CPF/CNPJ check-digit failures.
    pub fn with_tax_id_warnings(mut self, warn: bool) -> Self {
        self.warn_invalid_tax_ids = warn;
        self
    }

    /// Process one XML document.
    pub fn process(
        &self,
        source: &str,
        source_reference: &str,
        lookup: &dyn RegimeLookup,
    ) -> crate::Result<DocumentOutcome> {
        let document = Document::parse(source)?;
        let invoice = self.validator.load(&document, source_reference)?;
        self.check(invoice, lookup)
    }

    /// Apply the ordering rules to a loaded invoice.
    pub fn check(
        &self,
        invoice: LoadedInvoice,
        lookup: &dyn RegimeLookup,
    ) -> crate::Result<DocumentOutcome> {
        let meta = &invoice.metadata;

        if meta.cancelled {
            info!("{} was cancelled, skipping", meta.source_reference);
            return Ok(DocumentOutcome::Skipped {
                invoice,
                reason: SkipReason::Cancelled,
            });
        }

        if self.warn_invalid_tax_ids {
            for (role, id) in [("provider", &meta.provider_tax_id), ("customer", &meta.customer_tax_id)] {
                if !validate_tax_id(id) {
                    warn!("{}: {} tax ID {} fails its check digits", meta.source_reference, role, id);
                }
            }
        }

        if meta.customer_is_individual() && invoice.has_retentions() {
            return Err(inconsistency(
                meta.source_reference.clone(),
                "withholdings declared for an individual (CPF) customer",
            ));
        }

        let should_validate =
            self.policy
                .should_validate(lookup, &meta.provider_tax_id, &meta.customer_tax_id)?;

        match (should_validate, invoice.has_retentions()) {
            (true, true) => {
                let result = self.validator.validate(&invoice, self.show_expected)?;
                Ok(DocumentOutcome::Validated { invoice, result })
            }
            (false, true) => Err(inconsistency(
                meta.source_reference.clone(),
                "withholdings declared between simplified-regime parties",
            )),
            (_, false) => Ok(DocumentOutcome::Skipped {
                invoice,
                reason: SkipReason::NoRetentionsExpected,
            }),
        }
    }
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Process one document with default settings and the given policy.
pub fn process_document(
    source: &str,
    source_reference: &str,
    lookup: &dyn RegimeLookup,
    policy: RegimePolicy,
) -> crate::Result<DocumentOutcome> {
    DocumentProcessor::new()
        .with_policy(policy)
        .process(source, source_reference, lookup)
}

fn inconsistency(source_reference: String, reason: &str) -> NfseError {
    ValidationError::RegimeInconsistency {
        source_reference,
        reason: reason.to_string(),
    }
    .into()
}

/// Classification of one processed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Validated; `false` when the net value did not match.
    Validated(bool),
    /// Not validated, by rule.
    Skipped(SkipReason),
    /// Identifiers absent; logged and skipped, not counted as a failure.
    InvalidInput(String),
    /// Any other error.
    Failed(String),
}

/// One document of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub source_reference: String,
    #[serde(flatten)]
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DocumentOutcome>,
}

impl DocumentRecord {
    /// Classify the result of processing a document.
    pub fn from_result(source_reference: impl Into<String>, result: crate::Result<DocumentOutcome>) -> Self {
        let source_reference = source_reference.into();

        match result {
            Ok(outcome) => {
                let status = match &outcome {
                    DocumentOutcome::Validated { result, .. } => {
                        DocumentStatus::Validated(result.all_matched())
                    }
                    DocumentOutcome::Skipped { reason, .. } => DocumentStatus::Skipped(*reason),
                };
                Self {
                    source_reference,
                    status,
                    outcome: Some(outcome),
                }
            }
            Err(e) if e.is_skippable() => {
                info!("{}: {}", source_reference, e);
                Self {
                    source_reference,
                    status: DocumentStatus::InvalidInput(e.to_string()),
                    outcome: None,
                }
            }
            Err(e) => {
                warn!("{}: {}", source_reference, e);
                Self {
                    source_reference,
                    status: DocumentStatus::Failed(e.to_string()),
                    outcome: None,
                }
            }
        }
    }

    /// Whether the document counts as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, DocumentStatus::Failed(_))
    }
}

/// Results of a batch of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    records: Vec<DocumentRecord>,
}

impl BatchReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one document.
    pub fn record(&mut self, source_reference: impl Into<String>, result: crate::Result<DocumentOutcome>) {
        self.records.push(DocumentRecord::from_result(source_reference, result));
    }

    /// Append an already classified record.
    pub fn push(&mut self, record: DocumentRecord) {
        self.records.push(record);
    }

    /// Sort records by source reference.
    pub fn sort(&mut self) {
        self.records
            .sort_by(|a, b| a.source_reference.cmp(&b.source_reference));
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    /// Number of failed documents.
    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_failure()).count()
    }

    /// One message per failed document: source reference and cause.
    pub fn failure_messages(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match &r.status {
                DocumentStatus::Failed(cause) => Some(format!("{}: {}", r.source_reference, cause)),
                _ => None,
            })
            .collect()
    }

    /// Documents skipped for lack of identifiers.
    pub fn skipped_inputs(&self) -> Vec<&DocumentRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.status, DocumentStatus::InvalidInput(_)))
            .collect()
    }

    /// Number of validated documents.
    pub fn validated_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.status, DocumentStatus::Validated(_)))
            .count()
    }

    /// Number of documents skipped by rule.
    pub fn skipped_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.status, DocumentStatus::Skipped(_)))
            .count()
    }

    /// Total number of documents.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no document was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<DocumentRecord> for BatchReport {
    fn from_iter<I: IntoIterator<Item = DocumentRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
