//! CLI module for tierkv
//!
//! Provides command-line interface for:
//! - check-config: Validate a configuration file
//! - workload: Drive a concurrent counter workload against an in-memory store

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, run, run_command, workload, WorkloadSettings, WriterTotals};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
