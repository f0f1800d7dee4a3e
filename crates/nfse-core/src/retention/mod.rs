//! Withholding rate table and retention validation.

pub mod rates;
mod validator;

pub use rates::{RetentionKind, rate_table};
pub use validator::{
    FieldCheck, LoadedInvoice, RETENTION_TOLERANCE, RetentionValidator, ValidationResult,
};
