//! Terraform CLI engine.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

use super::{ApplyEngine, EngineOutputs};

/// File name of the rendered descriptor inside the working directory.
pub const DESCRIPTOR_FILE: &str = "main.tf.json";

/// Exit code of `plan -detailed-exitcode` when changes are pending.
const PLAN_CHANGES_EXIT_CODE: i32 = 2;

/// Drives the Terraform CLI in a working directory.
#[derive(Debug, Clone)]
pub struct TerraformEngine {
    binary: String,
    workdir: PathBuf,
}

impl TerraformEngine {
    /// Creates an engine running `binary` in `workdir`.
    #[must_use]
    pub fn new(binary: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
        }
    }

    /// The working directory.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(&self.workdir)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null());
        command
    }

    fn display(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Runs a command, returning its exit code, stdout and stderr.
    async fn capture(&self, args: &[&str]) -> Result<(Option<i32>, String, String)> {
        debug!("Running {}", self.display(args));

        let output = self.command(args).output().await.map_err(|e| EngineError::LaunchFailed {
            binary: self.binary.clone(),
            message: e.to_string(),
        })?;

        Ok((
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    /// Runs a command that must succeed, discarding its output.
    async fn run_quiet(&self, args: &[&str]) -> Result<String> {
        let (code, stdout, stderr) = self.capture(args).await?;
        if code != Some(0) {
            return Err(EngineError::command_failed(self.display(args), code, stderr.trim()).into());
        }
        Ok(stdout)
    }

    /// Runs a long command, logging its output line by line.
    async fn run_streaming(&self, args: &[&str]) -> Result<()> {
        info!("Running {}", self.display(args));

        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::LaunchFailed {
                binary: self.binary.clone(),
                message: e.to_string(),
            })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(drain(stderr));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if !line.trim().is_empty() {
                    info!("{line}");
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(EngineError::command_failed(self.display(args), status.code(), stderr.trim()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ApplyEngine for TerraformEngine {
    async fn init(&self) -> Result<()> {
        self.run_quiet(&["init", "-input=false", "-no-color"]).await?;
        debug!("Initialized {}", self.workdir.display());
        Ok(())
    }

    async fn apply(&self) -> Result<()> {
        self.run_streaming(&["apply", "-auto-approve", "-input=false", "-no-color"])
            .await
    }

    async fn destroy(&self) -> Result<()> {
        self.run_streaming(&["destroy", "-auto-approve", "-input=false", "-no-color"])
            .await
    }

    async fn outputs(&self) -> Result<EngineOutputs> {
        let stdout = self.run_quiet(&["output", "-json", "-no-color"]).await?;
        parse_outputs(&stdout)
    }

    async fn has_drift(&self) -> Result<bool> {
        let args = [
            "plan",
            "-detailed-exitcode",
            "-input=false",
            "-lock=false",
            "-no-color",
        ];
        let (code, _, stderr) = self.capture(&args).await?;
        match code {
            Some(0) => Ok(false),
            Some(PLAN_CHANGES_EXIT_CODE) => Ok(true),
            _ => Err(EngineError::command_failed(self.display(&args), code, stderr.trim()).into()),
        }
    }

    fn name(&self) -> &'static str {
        "terraform"
    }
}

/// Reads a stream to its end; invalid UTF-8 is replaced, not fatal.
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            debug!("Failed to read engine stderr: {e}");
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Parses `output -json`: `{"name": {"value": ..., "type": ..., "sensitive": ...}}`.
///
/// String values are taken as-is; other values keep their JSON text.
fn parse_outputs(stdout: &str) -> Result<EngineOutputs> {
    if stdout.trim().is_empty() {
        return Ok(EngineOutputs::new());
    }

    let parsed: Value = serde_json::from_str(stdout)
        .map_err(|e| EngineError::invalid_output(format!("outputs are not JSON: {e}")))?;

    let Value::Object(entries) = parsed else {
        return Err(EngineError::invalid_output("outputs are not a JSON object").into());
    };

    entries
        .into_iter()
        .map(|(name, entry)| -> Result<(String, String)> {
            let value = entry
                .get("value")
                .ok_or_else(|| EngineError::invalid_output(format!("output {name} has no value")))?;
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok((name, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outputs() {
        let stdout = r#"{
            "cdnURL": {"sensitive": false, "type": "string", "value": "https://d111.cloudfront.net"},
            "ports": {"sensitive": false, "type": ["list", "number"], "value": [80, 443]}
        }"#;

        let outputs = parse_outputs(stdout).unwrap();
        assert_eq!(outputs["cdnURL"], "https://d111.cloudfront.net");
        assert_eq!(outputs["ports"], "[80,443]");
    }

    #[test]
    fn test_parse_outputs_empty_and_invalid() {
        assert!(parse_outputs("").unwrap().is_empty());
        assert!(parse_outputs("{}").unwrap().is_empty());
        assert!(parse_outputs("not json").is_err());
        assert!(parse_outputs(r#"{"x": {"type": "string"}}"#).is_err());
    }

    #[tokio::test]
    async fn test_drain_keeps_non_utf8_stderr() {
        let bytes: &[u8] = b"Error: bad \xff byte\n";
        let text = drain(Some(bytes)).await;
        assert!(text.starts_with("Error: bad "));
        assert!(text.contains('\u{fffd}'));

        assert!(drain(None::<&[u8]>).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_launch() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = TerraformEngine::new("edgesite-no-such-engine", temp.path());

        let err = engine.init().await.unwrap_err();
        assert!(err.to_string().contains("Failed to launch"), "got: {err}");
    }

    #[cfg(unix)]
    fn fake_engine(dir: &Path, name: &str, script: &str) -> TerraformEngine {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        TerraformEngine::new(path.to_string_lossy(), dir)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_drift_exit_codes() {
        let temp = tempfile::TempDir::new().unwrap();

        let clean = fake_engine(temp.path(), "clean", "exit 0");
        assert!(!clean.has_drift().await.unwrap());

        let drifted = fake_engine(temp.path(), "drifted", "exit 2");
        assert!(drifted.has_drift().await.unwrap());

        let broken = fake_engine(temp.path(), "broken", "echo 'no credentials' >&2; exit 1");
        let err = broken.has_drift().await.unwrap_err();
        assert!(err.to_string().contains("no credentials"), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_workdir_with_arguments() {
        let temp = tempfile::TempDir::new().unwrap();
        let engine = fake_engine(temp.path(), "recorder", "echo \"$@\" > args.txt; echo applying");

        engine.apply().await.unwrap();

        let args = std::fs::read_to_string(temp.path().join("args.txt")).unwrap();
        assert_eq!(args.trim(), "apply -auto-approve -input=false -no-color");
    }
}
