//! XML document model and invoice field extraction.

mod tree;
pub mod extractor;

pub use tree::{Descendants, Document, Element};
pub use extractor::{
    extract_field, extract_numeric, find_section, CANCELLATION_ROOT, DEFAULT_SEARCH_ROOT,
};

use crate::error::ExtractionError;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;
