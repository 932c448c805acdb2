//! CLI module for linkpool - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
