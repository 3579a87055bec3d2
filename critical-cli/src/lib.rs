//! critical operator CLI.
//!
//! - `suppress add|remove|show`: edit the dynamic suppression patterns
//! - `config validate`: load a handler document and build its components
//! - `dry-run`: preview what a handler would send for one record

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
