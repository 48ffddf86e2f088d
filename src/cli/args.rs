//! CLI argument definitions using clap
//!
//! Commands:
//! - tierkv check-config --config <path>
//! - tierkv workload --config <path> [--writers N] [--transactions N] [--keys N] [--image <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tierkv - a transactional, multi-version key-value store core
#[derive(Parser, Debug)]
#[command(name = "tierkv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a configuration file, then print it with defaults filled in
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./tierkv.json")]
        config: PathBuf,
    },

    /// Run a concurrent read-modify-write workload against an in-memory store
    Workload {
        /// Path to configuration file; defaults apply if it does not exist
        #[arg(long, default_value = "./tierkv.json")]
        config: PathBuf,

        /// Concurrent writer tasks
        #[arg(long, default_value_t = 4)]
        writers: usize,

        /// Transactions per writer
        #[arg(long, default_value_t = 1_000)]
        transactions: usize,

        /// Distinct keys
        #[arg(long, default_value_t = 64)]
        keys: usize,

        /// Write a checkpoint image here at the end and verify it reopens
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workload_defaults() {
        let cli = Cli::try_parse_from(["tierkv", "workload"]).unwrap();
        match cli.command {
            Command::Workload {
                writers,
                transactions,
                keys,
                image,
                ..
            } => {
                assert_eq!(writers, 4);
                assert_eq!(transactions, 1_000);
                assert_eq!(keys, 64);
                assert!(image.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::try_parse_from(["tierkv", "check-config", "--config", "/tmp/t.json"]).unwrap();
        assert!(matches!(cli.command, Command::CheckConfig { .. }));
    }
}
