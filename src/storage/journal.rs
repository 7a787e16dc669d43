//! Dispatch journal - calls the provider accepted but the ledger has not yet
//! recorded.
//!
//! The dispatcher appends one line per placed call before it commits the
//! batch to the ledger and clears the journal afterwards. Anything left in the
//! journal at startup is a call whose attempt was never counted.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One placed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub participant_id: String,
    pub session_id: String,
    /// UTC, RFC 3339
    pub placed_at: String,
}

/// Append-only JSONL journal
#[derive(Debug, Clone)]
pub struct DispatchJournal {
    path: PathBuf,
}

impl DispatchJournal {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and flush it to disk
    pub fn record(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        file.sync_data()?;
        Ok(())
    }

    /// All pending entries. A torn trailing line is skipped.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable journal line: {}", e),
            }
        }
        Ok(entries)
    }

    /// Drop every entry
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(participant_id: &str, session_id: &str) -> JournalEntry {
        JournalEntry {
            participant_id: participant_id.to_string(),
            session_id: session_id.to_string(),
            placed_at: "2026-03-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_empty_journal() {
        let temp = TempDir::new().unwrap();
        let journal = DispatchJournal::open(temp.path().join("dispatch_journal.jsonl"));
        assert!(journal.entries().unwrap().is_empty());
        journal.clear().unwrap();
    }

    #[test]
    fn test_record_and_read_in_order() {
        let temp = TempDir::new().unwrap();
        let journal = DispatchJournal::open(temp.path().join("state").join("dispatch_journal.jsonl"));

        journal.record(&entry("p1", "CA1")).unwrap();
        journal.record(&entry("p2", "CA2")).unwrap();

        let entries = journal.entries().unwrap();
        assert_eq!(entries, vec![entry("p1", "CA1"), entry("p2", "CA2")]);
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let journal = DispatchJournal::open(temp.path().join("dispatch_journal.jsonl"));
        journal.record(&entry("p1", "CA1")).unwrap();
        journal.clear().unwrap();
        assert!(journal.entries().unwrap().is_empty());
        assert!(!journal.path().exists());
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let temp = TempDir::new().unwrap();
        let journal = DispatchJournal::open(temp.path().join("dispatch_journal.jsonl"));
        journal.record(&entry("p1", "CA1")).unwrap();
        let mut file = OpenOptions::new().append(true).open(journal.path()).unwrap();
        write!(file, "{{\"participant_id\": \"p2\", \"sess").unwrap();

        assert_eq!(journal.entries().unwrap(), vec![entry("p1", "CA1")]);
    }
}
