//! Storage layer for Dialr - JSON documents on local disk.
//!
//! - `ParticipantLedger`: the participant document, keyed by participant id
//! - `PauseSwitch`: the persisted global pause flag
//! - `DispatchJournal`: placed-but-not-yet-recorded calls (JSONL)
//! - `AuditLog`: one JSONL record per accepted response
//!
//! Whole documents are replaced with write-to-temp-then-rename so a reader
//! never observes a partially written file.

mod audit;
mod journal;
mod ledger;
mod settings;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use audit::{AuditLog, AuditRecord};
pub use journal::{DispatchJournal, JournalEntry};
pub use ledger::{Ledger, ParticipantLedger};
pub use settings::{PauseSwitch, Settings};

/// Append a suffix to a path's file name (`a.json` + `.tmp` -> `a.json.tmp`)
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Replace `path` with `contents` atomically.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = with_suffix(path, ".tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
