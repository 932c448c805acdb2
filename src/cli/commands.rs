//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - fetch: resolve link metadata for one or more URLs through the pool

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// linkpool - fetch link-preview metadata through a bounded task pool
#[derive(Parser, Debug)]
#[command(name = "linkpool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch metadata for each URL
    Fetch {
        /// URLs to resolve
        #[arg(required = true)]
        urls: Vec<String>,

        /// Override the configured pool size
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::parse_from(["linkpool", "fetch", "https://a.example", "https://b.example", "-n", "2"]);
        assert!(!cli.is_verbose());
        match cli.command {
            Commands::Fetch { urls, concurrency, json } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(concurrency, Some(2));
                assert!(!json);
            }
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["linkpool", "fetch", "--json", "https://a.example", "-v", "-c", "x.yml"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_fetch_requires_urls() {
        assert!(Cli::try_parse_from(["linkpool", "fetch"]).is_err());
    }
}
