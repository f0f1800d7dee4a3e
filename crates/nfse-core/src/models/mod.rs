//! Data models shared by the extractor, the validator and the driver.

pub mod config;
pub mod invoice;
pub mod tax_id;
