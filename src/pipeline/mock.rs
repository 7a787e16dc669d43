//! Canned audio pipeline

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{AudioPipeline, Transcript};
use crate::error::{DialrError, Result};

/// Returns a fixed transcript and counts how often each stage ran.
pub struct MockAudioPipeline {
    transcript: Transcript,
    fail_transcribe: bool,
    transcribe_calls: AtomicUsize,
    translate_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
}

impl MockAudioPipeline {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            fail_transcribe: false,
            transcribe_calls: AtomicUsize::new(0),
            translate_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
        }
    }

    /// Spanish transcript long enough to pass the default word threshold
    pub fn spanish() -> Self {
        Self::new(Transcript::new("me gusta mucho el nuevo parque del barrio", Some("es")))
    }

    pub fn with_failing_transcribe(mut self) -> Self {
        self.fail_transcribe = true;
        self
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn synthesize_calls(&self) -> usize {
        self.synthesize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPipeline for MockAudioPipeline {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_transcribe {
            return Err(DialrError::Pipeline("mock transcription failed".to_string()));
        }
        Ok(self.transcript.clone())
    }

    async fn translate(&self, text: &str) -> Result<String> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[en] {}", text))
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, text.as_bytes()).await?;
        Ok(())
    }
}
