//! Core library for NFS-e withholding validation.
//!
//! This crate provides:
//! - XML document parsing and first-match section lookup
//! - Field extraction for provider/customer identifiers, issue date and values
//! - CPF/CNPJ helpers (classification, check digits, formatting)
//! - The static withholding rate table and the retention validator
//! - The regime policy interface and the per-document pipeline

pub mod error;
pub mod models;
pub mod document;
pub mod retention;
pub mod regime;
pub mod pipeline;

pub use error::{ExtractionError, LookupError, NfseError, Result, ValidationError};
pub use models::invoice::{InvoiceMetadata, InvoiceValueBundle};
pub use models::tax_id::{TaxIdKind, format_tax_id, validate_tax_id};
pub use models::config::NfseConfig;
pub use document::{Document, Element};
pub use retention::{LoadedInvoice, RetentionKind, RetentionValidator, ValidationResult};
pub use regime::{RegimeLookup, RegimePolicy};
pub use pipeline::{
    BatchReport, DocumentOutcome, DocumentProcessor, DocumentRecord, DocumentStatus, SkipReason,
    process_document,
};
