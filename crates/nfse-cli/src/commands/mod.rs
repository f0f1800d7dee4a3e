//! CLI subcommands.

pub mod batch;
pub mod check;
pub mod config;
