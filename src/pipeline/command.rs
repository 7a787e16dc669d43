//! Shell-command audio pipeline
//!
//! Each stage is a `sh -c` command line. `{input}` and `{output}` are replaced
//! with shell-quoted paths; translate and synthesize receive their text on
//! stdin.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{AudioPipeline, Transcript};
use crate::config::PipelineConfig;
use crate::error::{DialrError, Result};

/// Audio pipeline backed by external commands
pub struct CommandPipeline {
    transcribe_command: String,
    translate_command: String,
    synthesize_command: String,
    timeout: Duration,
}

impl CommandPipeline {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            transcribe_command: config.transcribe_command.clone(),
            translate_command: config.translate_command.clone(),
            synthesize_command: config.synthesize_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Run one stage and return its stdout
    async fn run(&self, stage: &str, command_line: &str, stdin: Option<&str>) -> Result<String> {
        if command_line.trim().is_empty() {
            return Err(DialrError::Pipeline(format!("{} command not configured", stage)));
        }
        debug!("Running {} command: {}", stage, command_line);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| DialrError::Pipeline(format!("{} failed to start: {}", stage, e)))?;

        // Stdin is fed while stdout drains so a streaming filter cannot stall
        // on a full pipe
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(text), Some(mut pipe)) = (stdin, pipe) {
                match pipe.write_all(text.as_bytes()).await {
                    // Child exited without reading all of its input
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    other => other?,
                }
                // Dropping the pipe closes it so the child sees EOF
            }
            Ok::<(), std::io::Error>(())
        };
        let exchange = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        // On timeout the child is dropped, and killed
        let output = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DialrError::Pipeline(format!(
                    "{} timed out after {}s",
                    stage,
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DialrError::Pipeline(format!(
                "{} exited with {:?}: {}",
                stage,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Quote a path for `sh`
fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

fn render(template: &str, input: Option<&Path>, output: Option<&Path>) -> String {
    let mut line = template.to_string();
    if let Some(input) = input {
        line = line.replace("{input}", &shell_quote(input));
    }
    if let Some(output) = output {
        line = line.replace("{output}", &shell_quote(output));
    }
    line
}

/// Transcription stdout: JSON `{"text", "language"}` or plain text
fn parse_transcript(stdout: &str) -> Transcript {
    if stdout.starts_with('{')
        && let Ok(transcript) = serde_json::from_str::<Transcript>(stdout)
    {
        return transcript;
    }
    Transcript::new(stdout, None)
}

#[async_trait]
impl AudioPipeline for CommandPipeline {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let line = render(&self.transcribe_command, Some(audio), None);
        let stdout = self.run("transcribe", &line, None).await?;
        Ok(parse_transcript(&stdout))
    }

    async fn translate(&self, text: &str) -> Result<String> {
        self.run("translate", &self.translate_command, Some(text)).await
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = render(&self.synthesize_command, None, Some(output));
        self.run("synthesize", &line, Some(text)).await?;
        if !output.exists() {
            return Err(DialrError::Pipeline(format!(
                "synthesize did not produce {}",
                output.display()
            )));
        }
        Ok(())
    }
}
