//! TwiML documents for the survey voice flow.
//!
//! `/voice` asks for a key press, `/start` introduces the survey and asks the
//! first question, `/next?q=N` asks question N or says goodbye. Inbound calls
//! manage their own recording; outbound calls are recorded by the call itself.

use std::path::Path;

use crate::config::IvrConfig;
use crate::error::{DialrError, Result};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Escape text for element content and attribute values
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Survey questions, one per line of the questions file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Questionnaire {
    questions: Vec<String>,
}

impl Questionnaire {
    /// Blank lines are ignored; at least one question is required.
    pub fn new(questions: Vec<String>) -> Result<Self> {
        let questions: Vec<String> = questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if questions.is_empty() {
            return Err(DialrError::Config("no survey questions found".to_string()));
        }
        Ok(Self { questions })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialrError::Config(format!("cannot read questions file {}: {}", path.display(), e)))?;
        Self::new(content.lines().map(str::to_string).collect())
    }

    pub fn count(&self) -> usize {
        self.questions.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }
}

/// Renders the voice flow against one public base URL
#[derive(Debug, Clone)]
pub struct VoiceFlow {
    base_url: String,
    gather_timeout_secs: u32,
    speech_timeout: String,
    questions: Questionnaire,
}

impl VoiceFlow {
    pub fn new(base_url: &str, ivr: &IvrConfig, questions: Questionnaire) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            gather_timeout_secs: ivr.gather_timeout_secs,
            speech_timeout: ivr.speech_timeout.clone(),
            questions,
        }
    }

    fn url(&self, path: &str) -> String {
        xml_escape(&format!("{}{}", self.base_url, path))
    }

    /// `POST /voice`
    pub fn welcome(&self) -> String {
        let start = self.url("/start");
        format!(
            r#"{XML_HEADER}
<Response>
  <Gather input="dtmf" numDigits="1" timeout="8" action="{start}" method="POST">
    <Say voice="alice">To begin the survey, please press any key.</Say>
  </Gather>
  <Say voice="alice">Starting the survey.</Say>
  <Redirect method="POST">{start}</Redirect>
</Response>"#
        )
    }

    /// `POST /start`
    pub fn start(&self, inbound: bool) -> String {
        let record_block = if inbound {
            format!(
                r#"
  <Start>
    <Record recordingStatusCallback="{}"
            recordingStatusCallbackMethod="POST"
            recordingStatusCallbackEvent="completed"
            trim="do-not-trim" />
  </Start>"#,
                self.url("/recording-done")
            )
        } else {
            String::new()
        };
        let first = self.questions.get(0).unwrap_or_default();

        format!(
            r#"{XML_HEADER}
<Response>{record_block}
  <Say voice="alice">Hello. This is a research survey call.</Say>
  <Say voice="alice">Please answer each question after it is spoken.</Say>
{}
</Response>"#,
            self.ask(first, 1)
        )
    }

    /// `POST /next?q=N`
    pub fn next(&self, q: usize, inbound: bool) -> String {
        match self.questions.get(q) {
            Some(question) => format!(
                r#"{XML_HEADER}
<Response>
{}
</Response>"#,
                self.ask(question, q + 1)
            ),
            None => {
                let stop_block = if inbound { "\n  <Stop><Record/></Stop>" } else { "" };
                format!(
                    r#"{XML_HEADER}
<Response>{stop_block}
  <Say voice="alice">Thank you. The survey is complete. Goodbye.</Say>
  <Hangup/>
</Response>"#
                )
            }
        }
    }

    fn ask(&self, question: &str, next_q: usize) -> String {
        let next = self.url(&format!("/next?q={}", next_q));
        format!(
            r#"  <Gather input="speech" timeout="{}" speechTimeout="{}" action="{next}" method="POST">
    <Say voice="alice">{}</Say>
  </Gather>
  <Redirect method="POST">{next}</Redirect>"#,
            self.gather_timeout_secs,
            xml_escape(&self.speech_timeout),
            xml_escape(question)
        )
    }
}
