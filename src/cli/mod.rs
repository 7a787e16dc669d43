//! CLI module for dialr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the server and
//! operating on the participant ledger.

pub mod commands;

pub use commands::Cli;
