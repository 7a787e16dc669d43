//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: HTTP server, dispatch worker and scheduler
//! - dial-now / schedule / pause / resume: dispatch control
//! - list / add / retry / reset / reconcile: ledger maintenance

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dialr - outbound survey call scheduler
#[derive(Parser, Debug)]
#[command(name = "dialr")]
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
    /// Run the webhook server with automatic dispatch
    Serve,

    /// Dispatch once, right now (ignores schedules unless --normal)
    DialNow {
        /// Honour schedules and the retry gap
        #[arg(long)]
        normal: bool,
    },

    /// Schedule a participant's call in local time
    Schedule {
        /// Participant ID
        id: String,

        /// Local time, e.g. "2026-03-01 09:30"
        time: String,
    },

    /// Suspend automatic dispatch
    Pause,

    /// Resume automatic dispatch
    Resume,

    /// List participants
    List {
        /// Filter by status (pending, in_progress, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Add a participant, or update an existing participant's phone
    Add {
        /// Participant ID
        id: String,

        /// Phone number in E.164 form
        phone: String,
    },

    /// Return a participant to pending, even from completed or failed
    Retry {
        /// Participant ID
        id: String,

        /// Also reset the attempt counter
        #[arg(long)]
        reset_attempts: bool,
    },

    /// Clear all participant state
    Reset {
        /// Also clear the call audit log
        #[arg(long)]
        log: bool,

        /// Delete instead of keeping a .bak copy
        #[arg(long)]
        no_backup: bool,
    },

    /// Replay the dispatch journal and release stale calls
    Reconcile,
}
