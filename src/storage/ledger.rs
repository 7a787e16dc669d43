//! Participant ledger - the durable participant document.
//!
//! The ledger is one JSON object keyed by participant id. Every read loads the
//! whole document from disk and every write replaces it atomically.
//!
//! Concurrency: `load` followed by `save` is a plain read-modify-write with no
//! locking between the two calls; two writers doing that concurrently race and
//! the later full-document save silently discards the earlier writer's change.
//! Callers inside this process must use `update`, `update_participant` or
//! `update_by_session` instead, which run the whole load-modify-save under one
//! write lock. Separate processes sharing the same file still race.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde_json::Value;

use super::{with_suffix, write_atomic};
use crate::domain::participant::SCHEMA_FIELDS;
use crate::domain::{Participant, ParticipantStatus, ParticipantSummary};
use crate::error::{DialrError, Result};
use crate::id::file_stamp;

/// The full participant document
pub type Ledger = BTreeMap<String, Participant>;

/// Session id -> participant id, rebuilt whenever the document is (re)loaded
#[derive(Debug, Default)]
struct SessionIndex {
    by_session: HashMap<String, String>,
}

impl SessionIndex {
    fn rebuild(&mut self, ledger: &Ledger) {
        self.by_session.clear();
        for (id, participant) in ledger {
            if let Some(session_id) = &participant.last_call_session_id {
                self.by_session.insert(session_id.clone(), id.clone());
            }
        }
    }

    fn lookup(&self, session_id: &str) -> Option<&str> {
        self.by_session.get(session_id).map(String::as_str)
    }
}

/// File-backed participant ledger
#[derive(Debug)]
pub struct ParticipantLedger {
    path: PathBuf,
    /// Write lock for the document; also owns the session index
    index: Mutex<SessionIndex>,
}

impl ParticipantLedger {
    /// Open the ledger at `path`, creating the parent directory if needed.
    ///
    /// The document itself is created lazily on first save.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            index: Mutex::new(SessionIndex::default()),
        })
    }

    /// Path of the ledger document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionIndex>> {
        self.index.lock().map_err(|e| DialrError::Storage(e.to_string()))
    }

    /// Load the whole ledger.
    ///
    /// A missing or empty document is an empty ledger. A corrupted document is
    /// moved aside to `<path>.corrupt` and an empty ledger is returned. Records
    /// from an older schema are back-filled and the document re-persisted.
    pub fn load(&self) -> Result<Ledger> {
        let mut index = self.lock()?;
        let ledger = self.read_document();
        index.rebuild(&ledger);
        Ok(ledger)
    }

    /// Replace the whole ledger
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let mut index = self.lock()?;
        self.write_document(ledger)?;
        index.rebuild(ledger);
        Ok(())
    }

    /// Transactional load-modify-save.
    ///
    /// The document is only written if `f` returns `Ok`.
    pub fn update<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut index = self.lock()?;
        let mut ledger = self.read_document();
        let value = f(&mut ledger)?;
        self.write_document(&ledger)?;
        index.rebuild(&ledger);
        Ok(value)
    }

    /// Transactional update of one participant
    pub fn update_participant<T>(
        &self,
        participant_id: &str,
        f: impl FnOnce(&mut Participant) -> Result<T>,
    ) -> Result<T> {
        self.update(|ledger| {
            let participant = ledger
                .get_mut(participant_id)
                .ok_or_else(|| DialrError::ParticipantNotFound(participant_id.to_string()))?;
            f(participant)
        })
    }

    /// Transactional update of the participant whose most recent call is
    /// `session_id`. Returns `Ok(None)` without writing if no participant
    /// matches.
    pub fn update_by_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&str, &mut Participant) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut index = self.lock()?;
        let mut ledger = self.read_document();
        index.rebuild(&ledger);

        let Some(participant_id) = index.lookup(session_id).map(str::to_string) else {
            return Ok(None);
        };
        let value = match ledger.get_mut(&participant_id) {
            Some(participant) => f(&participant_id, participant)?,
            None => return Ok(None),
        };

        self.write_document(&ledger)?;
        index.rebuild(&ledger);
        Ok(Some(value))
    }

    /// Find the participant whose most recent call is `session_id`
    pub fn find_by_session(&self, session_id: &str) -> Result<Option<(String, Participant)>> {
        let mut index = self.lock()?;
        let mut ledger = self.read_document();
        index.rebuild(&ledger);

        Ok(index
            .lookup(session_id)
            .map(str::to_string)
            .and_then(|id| ledger.remove(&id).map(|p| (id, p))))
    }

    /// Get one participant
    pub fn get(&self, participant_id: &str) -> Result<Option<Participant>> {
        Ok(self.load()?.remove(participant_id))
    }

    /// Create a pending participant, or update the phone of an existing one.
    ///
    /// Returns true if the participant was created.
    pub fn upsert(&self, participant_id: &str, phone: &str) -> Result<bool> {
        let participant_id = participant_id.trim();
        let phone = phone.trim();
        if participant_id.is_empty() || phone.is_empty() {
            return Err(DialrError::Validation(
                "participant id and phone are both required".to_string(),
            ));
        }

        self.update(|ledger| match ledger.get_mut(participant_id) {
            Some(existing) => {
                existing.phone = phone.to_string();
                Ok(false)
            }
            None => {
                ledger.insert(participant_id.to_string(), Participant::new(phone));
                Ok(true)
            }
        })
    }

    /// Masked listing, ordered by participant id, optionally filtered by status
    pub fn summaries(&self, status: Option<ParticipantStatus>) -> Result<Vec<ParticipantSummary>> {
        Ok(self
            .load()?
            .iter()
            .filter(|(_, p)| status.is_none_or(|s| p.status == s))
            .map(|(id, p)| ParticipantSummary::from_participant(id, p))
            .collect())
    }

    /// Administrative retry: send a participant back to `pending`, optionally
    /// with a fresh attempt budget. Returns the status it left.
    pub fn retry(&self, participant_id: &str, reset_attempts: bool) -> Result<ParticipantStatus> {
        self.update_participant(participant_id, |p| {
            let previous = p.status;
            p.reset_for_retry(reset_attempts);
            info!(
                "Participant {} reset for retry (was {}, attempts {})",
                participant_id, previous, p.attempts
            );
            Ok(previous)
        })
    }

    /// Full ledger reset.
    ///
    /// With `backup` the document is renamed to `<path>.bak_<timestamp>`,
    /// otherwise it is deleted. Returns the backup path, if one was made.
    pub fn reset(&self, backup: bool, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        let mut index = self.lock()?;
        index.rebuild(&Ledger::new());

        if !self.path.exists() {
            return Ok(None);
        }
        if backup {
            let backup_path = with_suffix(&self.path, &format!(".bak_{}", file_stamp(now)));
            fs::rename(&self.path, &backup_path)?;
            info!("Ledger reset, previous document kept at {}", backup_path.display());
            Ok(Some(backup_path))
        } else {
            fs::remove_file(&self.path)?;
            info!("Ledger reset, previous document deleted");
            Ok(None)
        }
    }

    fn write_document(&self, ledger: &Ledger) -> Result<()> {
        let json = serde_json::to_string_pretty(ledger)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Saved {} participants to {}", ledger.len(), self.path.display());
        Ok(())
    }

    /// Read, validate and migrate the document. Never fails: anything
    /// unreadable is quarantined.
    fn read_document(&self) -> Ledger {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ledger::new(),
            Err(e) => {
                self.quarantine(&format!("unreadable: {}", e));
                return Ledger::new();
            }
        };

        if content.trim().is_empty() {
            return Ledger::new();
        }

        let raw = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                self.quarantine(&format!("expected a JSON object, found {}", json_kind(&other)));
                return Ledger::new();
            }
            Err(e) => {
                self.quarantine(&format!("invalid JSON: {}", e));
                return Ledger::new();
            }
        };

        let mut ledger = Ledger::new();
        let mut migrated = 0usize;
        for (participant_id, value) in raw {
            if needs_migration(&value) {
                migrated += 1;
            }
            match serde_json::from_value::<Participant>(value) {
                Ok(participant) => {
                    ledger.insert(participant_id, participant);
                }
                Err(e) => {
                    self.quarantine(&format!("participant {} is malformed: {}", participant_id, e));
                    return Ledger::new();
                }
            }
        }

        if migrated > 0 {
            info!("Back-filled new fields on {} participant records", migrated);
            if let Err(e) = self.write_document(&ledger) {
                warn!("Failed to persist migrated ledger: {}", e);
            }
        }

        ledger
    }

    fn quarantine(&self, reason: &str) {
        let corrupt_path = with_suffix(&self.path, ".corrupt");
        match fs::rename(&self.path, &corrupt_path) {
            Ok(()) => error!(
                "Ledger {} is corrupted ({}); moved to {} and starting empty",
                self.path.display(),
                reason,
                corrupt_path.display()
            ),
            Err(e) => error!(
                "Ledger {} is corrupted ({}); could not move it aside ({}), starting empty",
                self.path.display(),
                reason,
                e
            ),
        }
    }
}

fn needs_migration(value: &Value) -> bool {
    match value.as_object() {
        Some(record) => SCHEMA_FIELDS.iter().any(|field| !record.contains_key(*field)),
        None => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
