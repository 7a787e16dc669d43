//! Webhook ingestor: provider callbacks correlated to participants.
//!
//! Every handler looks the participant up by call session id. An unknown or
//! empty session id is acknowledged and ignored so the provider does not keep
//! redelivering stray events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::engagement::looks_like_real_speech;
use super::events::RecordingEvent;
use super::guard::{self, GuardDecision};
use crate::config::{GuardConfig, StorageConfig};
use crate::domain::{CallOutcome, ResponseArtifacts, RetryPolicy, StatusChange, mask_phone};
use crate::error::{DialrError, Result};
use crate::id::{artifact_base, format_utc, now_utc};
use crate::pipeline::AudioPipeline;
use crate::storage::{AuditLog, AuditRecord, ParticipantLedger};
use crate::telephony::TelephonyProvider;

/// Result of a status callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    UnknownSession,
    Applied { participant_id: String, change: StatusChange },
}

/// Result of one voice-flow turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Utterance did not count as engagement; ledger not touched
    NotSpeech,
    UnknownSession,
    Engaged { participant_id: String },
    AlreadyEngaged { participant_id: String },
}

/// Result of a recording-ready callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Recording status other than completed
    IgnoredStatus(String),
    UnknownSession,
    /// Completion guard refused before the pipeline ran
    Skipped { participant_id: String, reason: GuardDecision },
    /// Pipeline ran but the transcript was noise
    TranscriptTooShort { participant_id: String, words: usize },
    /// Response accepted and audited
    Accepted { participant_id: String, artifacts: ResponseArtifacts },
}

/// File locations for one recording's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub audio: PathBuf,
    pub transcript: PathBuf,
    pub translation: PathBuf,
    pub english_audio: PathBuf,
}

impl ArtifactPaths {
    pub fn new(storage: &StorageConfig, session_id: &str, ts: DateTime<Utc>) -> Self {
        let base = format!("{}_FULLCALL", artifact_base(session_id, ts));
        Self {
            audio: storage.audio_dir().join(format!("{}.wav", base)),
            transcript: storage.transcripts_dir().join(format!("{}.txt", base)),
            translation: storage.translations_dir().join(format!("{}.txt", base)),
            english_audio: storage.english_audio_dir().join(format!("{}.mp3", base)),
        }
    }

    pub fn to_artifacts(&self) -> ResponseArtifacts {
        ResponseArtifacts {
            audio_path: self.audio.display().to_string(),
            transcript_path: self.transcript.display().to_string(),
            translation_path: self.translation.display().to_string(),
            english_audio_path: self.english_audio.display().to_string(),
        }
    }
}

async fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text.as_bytes()).await?;
    Ok(())
}

/// Handles status, turn and recording callbacks
pub struct WebhookIngestor {
    ledger: Arc<ParticipantLedger>,
    audit: AuditLog,
    telephony: Arc<dyn TelephonyProvider>,
    pipeline: Arc<dyn AudioPipeline>,
    storage: StorageConfig,
    guard: GuardConfig,
    policy: RetryPolicy,
}

impl WebhookIngestor {
    pub fn new(
        ledger: Arc<ParticipantLedger>,
        audit: AuditLog,
        telephony: Arc<dyn TelephonyProvider>,
        pipeline: Arc<dyn AudioPipeline>,
        storage: StorageConfig,
        guard: GuardConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            audit,
            telephony,
            pipeline,
            storage,
            guard,
            policy,
        }
    }

    /// Apply a call-status callback
    pub fn handle_status(&self, session_id: &str, raw_status: &str) -> Result<StatusOutcome> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Ok(StatusOutcome::UnknownSession);
        }
        let outcome = CallOutcome::parse(raw_status);

        let applied = self.ledger.update_by_session(session_id, |participant_id, p| {
            let change = p.apply_call_status(&outcome, &self.policy);
            Ok((participant_id.to_string(), change))
        })?;

        let Some((participant_id, change)) = applied else {
            tracing::debug!(call_sid = %session_id, status = %outcome, "Status for unknown call ignored");
            return Ok(StatusOutcome::UnknownSession);
        };

        match &change {
            StatusChange::Applied { from, to } => {
                tracing::info!(participant = %participant_id, call_sid = %session_id, status = %outcome, from = %from, to = %to, "Call status applied");
            }
            StatusChange::DowngradedUnengaged => {
                tracing::info!(participant = %participant_id, call_sid = %session_id, "Call completed without engagement, returned to pending");
            }
            StatusChange::IgnoredTerminal(status) => {
                tracing::debug!(participant = %participant_id, call_sid = %session_id, current = %status, "Status ignored for terminal participant");
            }
            StatusChange::Unrecognized(raw) => {
                tracing::warn!(participant = %participant_id, call_sid = %session_id, status = %raw, "Unrecognized call status ignored");
            }
        }

        Ok(StatusOutcome::Applied { participant_id, change })
    }

    /// Apply the engagement signal from one answered question
    pub fn handle_turn(&self, session_id: &str, utterance: &str) -> Result<TurnOutcome> {
        if !looks_like_real_speech(utterance, self.guard.engagement_min_words) {
            return Ok(TurnOutcome::NotSpeech);
        }
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Ok(TurnOutcome::UnknownSession);
        }

        let flipped = self.ledger.update_by_session(session_id, |participant_id, p| {
            Ok((participant_id.to_string(), p.mark_engaged()))
        })?;

        match flipped {
            None => Ok(TurnOutcome::UnknownSession),
            Some((participant_id, true)) => {
                tracing::info!(participant = %participant_id, call_sid = %session_id, "Participant engaged");
                Ok(TurnOutcome::Engaged { participant_id })
            }
            Some((participant_id, false)) => Ok(TurnOutcome::AlreadyEngaged { participant_id }),
        }
    }

    /// Run the completion guard and, if it passes, the audio pipeline.
    ///
    /// A download, pipeline or audit failure is returned as an error with the
    /// ledger untouched, so a redelivery of the same webhook can succeed.
    pub async fn handle_recording(&self, event: &RecordingEvent) -> Result<RecordingOutcome> {
        if !event.is_completed() {
            let status = event.recording_status.clone().unwrap_or_default();
            tracing::debug!(call_sid = %event.call_sid, status = %status, "Recording not completed, ignored");
            return Ok(RecordingOutcome::IgnoredStatus(status));
        }

        let recording_url = event
            .recording_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DialrError::Validation("RecordingUrl is required".to_string()))?;

        let session_id = event.call_sid.trim();
        if session_id.is_empty() {
            return Ok(RecordingOutcome::UnknownSession);
        }
        let Some((participant_id, participant)) = self.ledger.find_by_session(session_id)? else {
            tracing::debug!(call_sid = %session_id, "Recording for unknown call ignored");
            return Ok(RecordingOutcome::UnknownSession);
        };

        let decision = guard::evaluate(&participant);
        if !decision.is_proceed() {
            tracing::info!(participant = %participant_id, call_sid = %session_id, reason = %decision, "Recording not processed");
            return Ok(RecordingOutcome::Skipped {
                participant_id,
                reason: decision,
            });
        }

        let now = now_utc();
        let paths = ArtifactPaths::new(&self.storage, session_id, now);

        self.telephony.fetch_recording(recording_url, &paths.audio).await?;
        let transcript = self.pipeline.transcribe(&paths.audio).await?;
        write_text(&paths.transcript, &transcript.text).await?;

        let words = transcript.word_count();
        if !guard::transcript_accepted(&transcript, self.guard.min_transcript_words) {
            tracing::info!(participant = %participant_id, call_sid = %session_id, words = words, "Transcript too short, not marking completed");
            return Ok(RecordingOutcome::TranscriptTooShort { participant_id, words });
        }

        let english = if transcript.is_english() {
            transcript.text.clone()
        } else {
            self.pipeline.translate(&transcript.text).await?
        };
        write_text(&paths.translation, &english).await?;
        self.pipeline.synthesize(&english, &paths.english_audio).await?;

        let artifacts = paths.to_artifacts();

        // Re-check under the write lock: a concurrent redelivery may have won.
        // The audit append happens inside the commit so a failed append leaves
        // the participant open for redelivery.
        let direction = event.direction.as_deref().unwrap_or_default();
        let committed = self.ledger.update_by_session(session_id, |_, p| {
            let decision = guard::evaluate(p);
            if !decision.is_proceed() {
                return Ok(Err(decision));
            }
            p.mark_completed(recording_url, &artifacts)?;

            // A previous attempt may have appended and then failed to save
            if !self.audit.contains_session(session_id)? {
                let record = AuditRecord::new(
                    format_utc(now),
                    &participant_id,
                    p.masked_phone(),
                    direction,
                    session_id,
                    recording_url,
                    &artifacts,
                );
                self.audit.append(&record)?;
            }
            Ok(Ok(()))
        })?;

        match committed {
            Some(Ok(())) => {}
            Some(Err(reason)) => {
                tracing::warn!(participant = %participant_id, call_sid = %session_id, reason = %reason, "Participant changed while processing recording, not completed");
                return Ok(RecordingOutcome::Skipped { participant_id, reason });
            }
            None => return Ok(RecordingOutcome::UnknownSession),
        }

        tracing::info!(participant = %participant_id, call_sid = %session_id, phone = %mask_phone(&participant.phone), "Response accepted");
        Ok(RecordingOutcome::Accepted {
            participant_id,
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParticipantStatus;
    use crate::pipeline::{MockAudioPipeline, Transcript};
    use crate::telephony::MockTelephonyProvider;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Harness {
        ingestor: WebhookIngestor,
        ledger: Arc<ParticipantLedger>,
        audit: AuditLog,
        pipeline: Arc<MockAudioPipeline>,
        _temp: TempDir,
    }

    fn harness_with(telephony: MockTelephonyProvider, pipeline: MockAudioPipeline) -> Harness {
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig {
            data_dir: temp.path().to_path_buf(),
        };
        let ledger = Arc::new(ParticipantLedger::open(storage.ledger_path()).unwrap());
        let audit = AuditLog::open(storage.audit_log_path());
        let pipeline = Arc::new(pipeline);

        ledger.upsert("p1", "+15551234567").unwrap();
        ledger
            .update_participant("p1", |p| p.mark_call_started("CA1", now_utc(), &RetryPolicy::default()))
            .unwrap();

        let ingestor = WebhookIngestor::new(
            ledger.clone(),
            audit.clone(),
            Arc::new(telephony),
            pipeline.clone(),
            storage,
            GuardConfig::default(),
            RetryPolicy::default(),
        );
        Harness {
            ingestor,
            ledger,
            audit,
            pipeline,
            _temp: temp,
        }
    }

    fn harness() -> Harness {
        harness_with(MockTelephonyProvider::new(), MockAudioPipeline::spanish())
    }

    /// Second ingestor over the same files, standing in for a restarted server
    fn reopened(h: &Harness, pipeline: MockAudioPipeline) -> WebhookIngestor {
        WebhookIngestor::new(
            h.ledger.clone(),
            h.audit.clone(),
            Arc::new(MockTelephonyProvider::new()),
            Arc::new(pipeline),
            StorageConfig {
                data_dir: h._temp.path().to_path_buf(),
            },
            GuardConfig::default(),
            RetryPolicy::default(),
        )
    }

    fn recording(call_sid: &str) -> RecordingEvent {
        RecordingEvent {
            call_sid: call_sid.to_string(),
            recording_url: Some("https://api.twilio.com/Recordings/RE1".to_string()),
            recording_status: Some("completed".to_string()),
            direction: Some("outbound-api".to_string()),
        }
    }

    #[test]
    fn test_artifact_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("data"),
        };
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 14, 5, 0).unwrap();
        let paths = ArtifactPaths::new(&storage, "CA1", ts);
        assert_eq!(paths.audio, PathBuf::from("data/audio/CA1_20260301_140500_FULLCALL.wav"));
        assert_eq!(paths.english_audio, PathBuf::from("data/english_audio/CA1_20260301_140500_FULLCALL.mp3"));
    }

    #[test]
    fn test_status_unknown_session() {
        let h = harness();
        assert_eq!(h.ingestor.handle_status("CA-other", "completed").unwrap(), StatusOutcome::UnknownSession);
        assert_eq!(h.ingestor.handle_status("", "completed").unwrap(), StatusOutcome::UnknownSession);
    }

    #[test]
    fn test_status_completed_unengaged_goes_pending() {
        let h = harness();
        let outcome = h.ingestor.handle_status("CA1", "completed").unwrap();
        assert_eq!(
            outcome,
            StatusOutcome::Applied {
                participant_id: "p1".to_string(),
                change: StatusChange::DowngradedUnengaged
            }
        );
        assert_eq!(h.ledger.get("p1").unwrap().unwrap().status, ParticipantStatus::Pending);
    }

    #[test]
    fn test_status_unrecognized_is_noop() {
        let h = harness();
        let before = h.ledger.get("p1").unwrap().unwrap();
        h.ingestor.handle_status("CA1", "machine-detected").unwrap();
        assert_eq!(h.ledger.get("p1").unwrap().unwrap(), before);
    }

    #[test]
    fn test_turn_engagement() {
        let h = harness();
        assert_eq!(h.ingestor.handle_turn("CA1", "no").unwrap(), TurnOutcome::NotSpeech);
        assert!(!h.ledger.get("p1").unwrap().unwrap().engaged);

        assert_eq!(
            h.ingestor.handle_turn("CA1", "yes I do").unwrap(),
            TurnOutcome::Engaged {
                participant_id: "p1".to_string()
            }
        );
        assert_eq!(
            h.ingestor.handle_turn("CA1", "and also this").unwrap(),
            TurnOutcome::AlreadyEngaged {
                participant_id: "p1".to_string()
            }
        );
        assert_eq!(h.ingestor.handle_turn("CA9", "hello there").unwrap(), TurnOutcome::UnknownSession);
    }

    #[tokio::test]
    async fn test_recording_missing_url_is_validation_error() {
        let h = harness();
        let mut event = recording("CA1");
        event.recording_url = None;
        let err = h.ingestor.handle_recording(&event).await.unwrap_err();
        assert!(matches!(err, DialrError::Validation(_)));
    }

    #[tokio::test]
    async fn test_recording_non_completed_status_ignored() {
        let h = harness();
        let mut event = recording("CA1");
        event.recording_status = Some("failed".to_string());
        event.recording_url = None;
        assert_eq!(
            h.ingestor.handle_recording(&event).await.unwrap(),
            RecordingOutcome::IgnoredStatus("failed".to_string())
        );
    }

    #[tokio::test]
    async fn test_recording_unknown_session() {
        let h = harness();
        assert_eq!(
            h.ingestor.handle_recording(&recording("CA-stray")).await.unwrap(),
            RecordingOutcome::UnknownSession
        );
        assert_eq!(h.pipeline.transcribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_recording_not_engaged_skips_pipeline() {
        let h = harness();
        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();
        assert!(matches!(
            outcome,
            RecordingOutcome::Skipped {
                reason: GuardDecision::NotEngaged,
                ..
            }
        ));
        assert_eq!(h.pipeline.transcribe_calls(), 0);
        assert!(h.audit.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_after_retryable_failure_skips() {
        let h = harness();
        h.ingestor.handle_turn("CA1", "yes I am here").unwrap();
        h.ingestor.handle_status("CA1", "busy").unwrap();

        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();
        assert!(matches!(
            outcome,
            RecordingOutcome::Skipped {
                reason: GuardDecision::RetryableFailure(CallOutcome::Busy),
                ..
            }
        ));
        assert_eq!(h.pipeline.transcribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_recording_short_transcript_not_completed() {
        let h = harness_with(
            MockTelephonyProvider::new(),
            MockAudioPipeline::new(Transcript::new("hola si", Some("es"))),
        );
        h.ingestor.handle_turn("CA1", "hola si").unwrap();

        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();

        assert_eq!(
            outcome,
            RecordingOutcome::TranscriptTooShort {
                participant_id: "p1".to_string(),
                words: 2
            }
        );
        assert_eq!(h.ledger.get("p1").unwrap().unwrap().status, ParticipantStatus::InProgress);
        assert_eq!(h.pipeline.translate_calls(), 0);
        assert!(h.audit.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_accepted() {
        let h = harness();
        h.ingestor.handle_turn("CA1", "me gusta el parque").unwrap();
        h.ingestor.handle_status("CA1", "completed").unwrap();

        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();

        let RecordingOutcome::Accepted { participant_id, artifacts } = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(participant_id, "p1");
        assert!(Path::new(&artifacts.audio_path).exists());
        assert_eq!(
            std::fs::read_to_string(&artifacts.translation_path).unwrap(),
            "[en] me gusta mucho el nuevo parque del barrio"
        );

        let p = h.ledger.get("p1").unwrap().unwrap();
        assert_eq!(p.status, ParticipantStatus::Completed);
        assert_eq!(p.last_recording_url.as_deref(), Some("https://api.twilio.com/Recordings/RE1"));

        let records = h.audit.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phone, "+*******4567");
        assert_eq!(records[0].direction, "outbound-api");
    }

    #[tokio::test]
    async fn test_english_transcript_skips_translation() {
        let h = harness_with(
            MockTelephonyProvider::new(),
            MockAudioPipeline::new(Transcript::new("I really like the new park a lot", Some("en"))),
        );
        h.ingestor.handle_turn("CA1", "yes I do").unwrap();

        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();

        assert!(matches!(outcome, RecordingOutcome::Accepted { .. }));
        assert_eq!(h.pipeline.translate_calls(), 0);
        assert_eq!(h.pipeline.synthesize_calls(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_recording_audited_once() {
        let h = harness();
        h.ingestor.handle_turn("CA1", "me gusta el parque").unwrap();

        h.ingestor.handle_recording(&recording("CA1")).await.unwrap();
        let second = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();

        assert!(matches!(
            second,
            RecordingOutcome::Skipped {
                reason: GuardDecision::AlreadyTerminal(ParticipantStatus::Completed),
                ..
            }
        ));
        assert_eq!(h.audit.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_download_failure_leaves_ledger_unchanged() {
        let h = harness_with(
            MockTelephonyProvider::new().with_failing_downloads(),
            MockAudioPipeline::spanish(),
        );
        h.ingestor.handle_turn("CA1", "me gusta el parque").unwrap();
        let before = h.ledger.get("p1").unwrap().unwrap();

        let err = h.ingestor.handle_recording(&recording("CA1")).await.unwrap_err();

        assert!(matches!(err, DialrError::Telephony(_)));
        assert_eq!(h.ledger.get("p1").unwrap().unwrap(), before);
        assert!(h.audit.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcription_failure_leaves_participant_open() {
        let h = harness_with(
            MockTelephonyProvider::new(),
            MockAudioPipeline::spanish().with_failing_transcribe(),
        );
        h.ingestor.handle_turn("CA1", "me gusta el parque").unwrap();
        let before = h.ledger.get("p1").unwrap().unwrap();

        let err = h.ingestor.handle_recording(&recording("CA1")).await.unwrap_err();

        assert!(matches!(err, DialrError::Pipeline(_)));
        assert_eq!(h.pipeline.transcribe_calls(), 1);
        assert_eq!(h.pipeline.synthesize_calls(), 0);
        let p1 = h.ledger.get("p1").unwrap().unwrap();
        assert_eq!(p1, before);
        assert_eq!(p1.status, ParticipantStatus::InProgress);
        assert!(p1.last_recording_url.is_none());
        assert!(p1.last_outputs.is_empty());
        assert!(h.audit.records().unwrap().is_empty());

        // Redelivery once the pipeline works again completes the participant
        let retry = reopened(&h, MockAudioPipeline::spanish());
        let outcome = retry.handle_recording(&recording("CA1")).await.unwrap();
        assert!(matches!(outcome, RecordingOutcome::Accepted { .. }));
        assert_eq!(h.ledger.get("p1").unwrap().unwrap().status, ParticipantStatus::Completed);
        assert_eq!(h.audit.records().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_complete_participant() {
        let h = harness();
        h.ingestor.handle_turn("CA1", "me gusta el parque").unwrap();

        // A directory where the log file should be makes the append fail
        std::fs::create_dir_all(h.audit.path()).unwrap();
        let err = h.ingestor.handle_recording(&recording("CA1")).await.unwrap_err();
        assert!(matches!(err, DialrError::Io(_)));

        let p1 = h.ledger.get("p1").unwrap().unwrap();
        assert_eq!(p1.status, ParticipantStatus::InProgress);
        assert!(p1.engaged);
        assert!(p1.last_outputs.is_empty());

        // Redelivery after the log is writable again is accepted and audited once
        std::fs::remove_dir(h.audit.path()).unwrap();
        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();
        assert!(matches!(outcome, RecordingOutcome::Accepted { .. }));
        assert_eq!(h.ledger.get("p1").unwrap().unwrap().status, ParticipantStatus::Completed);

        let records = h.audit.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].call_session_id, "CA1");
    }

    #[tokio::test]
    async fn test_existing_audit_record_not_duplicated_on_commit() {
        let h = harness();
        h.ingestor.handle_turn("CA1", "me gusta el parque").unwrap();

        // Left behind by an attempt that appended but never saved the ledger
        let artifacts = ArtifactPaths::new(&StorageConfig::default(), "CA1", now_utc()).to_artifacts();
        h.audit
            .append(&AuditRecord::new(
                format_utc(now_utc()),
                "p1",
                mask_phone("+15551234567"),
                "outbound-api",
                "CA1",
                "https://api.twilio.com/Recordings/RE1",
                &artifacts,
            ))
            .unwrap();

        let outcome = h.ingestor.handle_recording(&recording("CA1")).await.unwrap();
        assert!(matches!(outcome, RecordingOutcome::Accepted { .. }));
        assert_eq!(h.audit.records().unwrap().len(), 1);
    }
}
