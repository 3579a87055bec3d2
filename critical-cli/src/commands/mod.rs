//! Command handlers -- one module per subcommand

pub mod config;
pub mod dry_run;
pub mod suppress;
