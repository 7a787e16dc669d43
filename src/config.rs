use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub telephony: TelephonyConfig,
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub guard: GuardConfig,
    pub ivr: IvrConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir().join("participants.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.state_dir().join("settings.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.state_dir().join("dispatch_journal.jsonl")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir().join("call_log.jsonl")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.data_dir.join("transcripts")
    }

    pub fn translations_dir(&self) -> PathBuf {
        self.data_dir.join("translations")
    }

    pub fn english_audio_dir(&self) -> PathBuf {
        self.data_dir.join("english_audio")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub api_base_url: String,
    /// Normally supplied via TWILIO_ACCOUNT_SID
    pub account_sid: Option<String>,
    /// Normally supplied via TWILIO_AUTH_TOKEN
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    /// Public URL the provider calls back on (no trailing slash)
    pub public_base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub recording_timeout_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.twilio.com".to_string(),
            account_sid: None,
            auth_token: None,
            from_number: None,
            public_base_url: None,
            request_timeout_secs: 15,
            recording_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub startup_delay_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            startup_delay_secs: 2,
            heartbeat_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub retry_gap_secs: i64,
    /// In-progress calls older than this are considered lost
    pub stale_after_secs: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_gap_secs: 3600,
            stale_after_secs: 7200,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, chrono::Duration::seconds(self.retry_gap_secs))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Transcripts shorter than this are treated as noise
    pub min_transcript_words: usize,
    /// Words an utterance needs to count as engagement (1 = lenient)
    pub engagement_min_words: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_transcript_words: 5,
            engagement_min_words: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IvrConfig {
    /// One question per line
    pub questions_file: PathBuf,
    pub gather_timeout_secs: u32,
    pub speech_timeout: String,
    /// IANA zone used to interpret operator-entered schedule times
    pub timezone: String,
}

impl Default for IvrConfig {
    fn default() -> Self {
        Self {
            questions_file: PathBuf::from("questions.txt"),
            gather_timeout_secs: 6,
            speech_timeout: "auto".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `{input}` is the recording; stdout is JSON `{"text", "language"}` or plain text
    pub transcribe_command: String,
    /// Text on stdin; stdout is the English translation
    pub translate_command: String,
    /// Text on stdin; `{output}` is the audio file to write
    pub synthesize_command: String,
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transcribe_command: String::new(),
            translate_command: String::new(),
            synthesize_command: String::new(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// When set, admin routes require a matching X-Admin-Token header
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5050".to_string(),
            admin_token: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            telephony: TelephonyConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            guard: GuardConfig::default(),
            ivr: IvrConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Overlay provider settings from the environment
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(sid) = non_empty("TWILIO_ACCOUNT_SID") {
            self.telephony.account_sid = Some(sid);
        }
        if let Some(token) = non_empty("TWILIO_AUTH_TOKEN") {
            self.telephony.auth_token = Some(token);
        }
        if let Some(from) = non_empty("TWILIO_FROM_NUMBER") {
            self.telephony.from_number = Some(from);
        }
        if let Some(base) = non_empty("PUBLIC_BASE_URL") {
            self.telephony.public_base_url = Some(base.trim_end_matches('/').to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.interval_secs, 15);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.retry_gap_secs, 3600);
        assert_eq!(config.guard.min_transcript_words, 5);
        assert_eq!(config.ivr.timezone, "America/New_York");
        assert_eq!(config.server.bind, "0.0.0.0:5050");
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/srv/dialr"),
        };
        assert_eq!(storage.ledger_path(), PathBuf::from("/srv/dialr/state/participants.json"));
        assert_eq!(storage.settings_path(), PathBuf::from("/srv/dialr/state/settings.json"));
        assert_eq!(storage.audit_log_path(), PathBuf::from("/srv/dialr/state/call_log.jsonl"));
        assert_eq!(storage.english_audio_dir(), PathBuf::from("/srv/dialr/english_audio"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dialr.yml");
        fs::write(
            &path,
            "retry:\n  max_attempts: 5\nguard:\n  engagement_min_words: 1\nserver:\n  admin_token: secret\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retry_gap_secs, 3600);
        assert_eq!(config.guard.engagement_min_words, 1);
        assert_eq!(config.guard.min_transcript_words, 5);
        assert_eq!(config.server.admin_token.as_deref(), Some("secret"));
        assert_eq!(config.scheduler.heartbeat_secs, 120);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let missing = PathBuf::from("/nonexistent/dialr.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dialr.yml");
        fs::write(&path, "retry: [not, a, map").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_FROM_NUMBER", "+15550000000"),
            ("PUBLIC_BASE_URL", "https://survey.example.org/"),
        ]);
        let mut config = Config::default();
        config.telephony.from_number = Some("+15551111111".to_string());

        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.telephony.account_sid.as_deref(), Some("AC123"));
        assert_eq!(config.telephony.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.telephony.from_number.as_deref(), Some("+15550000000"));
        assert_eq!(
            config.telephony.public_base_url.as_deref(),
            Some("https://survey.example.org")
        );
    }

    #[test]
    fn test_empty_env_does_not_override() {
        let mut config = Config::default();
        config.telephony.from_number = Some("+15551111111".to_string());
        config.apply_env(|key| (key == "TWILIO_FROM_NUMBER").then(|| "  ".to_string()));
        assert_eq!(config.telephony.from_number.as_deref(), Some("+15551111111"));
    }

    #[test]
    fn test_retry_policy() {
        let retry = RetryConfig {
            max_attempts: 4,
            retry_gap_secs: 600,
            stale_after_secs: 60,
        };
        let policy = retry.policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.retry_gap, chrono::Duration::minutes(10));
        assert_eq!(retry.stale_after(), chrono::Duration::minutes(1));
    }
}
