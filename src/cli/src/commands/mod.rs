//! Subcommand implementations.

pub mod append;
pub mod config;
pub mod read;
pub mod tail;
