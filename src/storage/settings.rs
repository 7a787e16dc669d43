//! Persisted operator settings (the global pause switch)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::write_atomic;
use crate::error::Result;

/// Operator settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Automatic dispatch is suspended while set
    pub paused: bool,
}

/// Global pause flag, shared by the scheduler, the admin API and the CLI
#[derive(Debug, Clone)]
pub struct PauseSwitch {
    path: PathBuf,
}

impl PauseSwitch {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings document. Missing or unreadable means not paused.
    pub fn load(&self) -> Settings {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Settings::default(),
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings {}: {}", self.path.display(), e);
                Settings::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                warn!("Failed to read settings {}: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.load().paused
    }

    /// Persist the pause flag. Returns the previous value.
    pub fn set_paused(&self, paused: bool) -> Result<bool> {
        let mut settings = self.load();
        let previous = settings.paused;
        settings.paused = paused;
        write_atomic(&self.path, serde_json::to_string_pretty(&settings)?.as_bytes())?;
        if previous != paused {
            info!("Automatic dispatch {}", if paused { "paused" } else { "resumed" });
        }
        Ok(previous)
    }
}
