//! External audio pipeline: speech-to-text, translation, speech synthesis.
//!
//! The pipeline is an opaque collaborator invoked over file paths and text;
//! `CommandPipeline` shells out to configured tools, `MockAudioPipeline`
//! stands in for tests.

pub mod command;
pub mod mock;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use command::CommandPipeline;
pub use mock::MockAudioPipeline;

/// Speech-to-text result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Detected language code, if the tool reports one
    #[serde(default)]
    pub language: Option<String>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            text: text.into(),
            language: language.map(str::to_string),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Detected language is English (`en`, `en-US`, `english`, ...)
    pub fn is_english(&self) -> bool {
        self.language
            .as_deref()
            .map(|l| l.trim().to_ascii_lowercase())
            .is_some_and(|l| l == "en" || l.starts_with("en-") || l.starts_with("en_") || l == "english")
    }
}

#[async_trait]
pub trait AudioPipeline: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript>;

    async fn translate(&self, text: &str) -> Result<String>;

    /// Render `text` as speech into `output`
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(Transcript::new("  one two\tthree\nfour ", None).word_count(), 4);
        assert_eq!(Transcript::new("", None).word_count(), 0);
    }

    #[test]
    fn test_is_english() {
        assert!(Transcript::new("hi", Some("en")).is_english());
        assert!(Transcript::new("hi", Some("EN-us")).is_english());
        assert!(Transcript::new("hi", Some("English")).is_english());
        assert!(!Transcript::new("hola", Some("es")).is_english());
        assert!(!Transcript::new("hi", None).is_english());
    }
}
