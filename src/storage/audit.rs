//! Audit log of accepted responses (one JSON object per line)

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::with_suffix;
use crate::domain::ResponseArtifacts;
use crate::error::Result;
use crate::id::file_stamp;

/// One accepted response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp_utc: String,
    pub participant_id: String,
    /// Masked contact address
    pub phone: String,
    /// Provider's call direction, e.g. `outbound-api` or `inbound`
    pub direction: String,
    pub call_session_id: String,
    pub recording_url: String,
    pub audio_path: String,
    pub transcript_path: String,
    pub translation_path: String,
    pub english_audio_path: String,
}

impl AuditRecord {
    pub fn new(
        timestamp_utc: String,
        participant_id: &str,
        masked_phone: String,
        direction: &str,
        call_session_id: &str,
        recording_url: &str,
        artifacts: &ResponseArtifacts,
    ) -> Self {
        Self {
            timestamp_utc,
            participant_id: participant_id.to_string(),
            phone: masked_phone,
            direction: direction.to_string(),
            call_session_id: call_session_id.to_string(),
            recording_url: recording_url.to_string(),
            audio_path: artifacts.audio_path.clone(),
            transcript_path: artifacts.transcript_path.clone(),
            translation_path: artifacts.translation_path.clone(),
            english_audio_path: artifacts.english_audio_path.clone(),
        }
    }
}

/// Append-only audit log
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<AuditRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable audit line: {}", e),
            }
        }
        Ok(records)
    }

    /// Whether a response from call `session_id` is already recorded
    pub fn contains_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.records()?.iter().any(|r| r.call_session_id == session_id))
    }

    /// Start a fresh log, keeping the old one as `<path>.bak_<timestamp>` if
    /// `backup` is set
    pub fn reset(&self, backup: bool, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        if backup {
            let backup_path = with_suffix(&self.path, &format!(".bak_{}", file_stamp(now)));
            fs::rename(&self.path, &backup_path)?;
            info!("Audit log reset, previous log kept at {}", backup_path.display());
            Ok(Some(backup_path))
        } else {
            fs::remove_file(&self.path)?;
            Ok(None)
        }
    }
}
