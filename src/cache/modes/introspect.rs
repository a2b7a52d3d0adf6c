//! Introspection command execution and stdout parsing
//!
//! Each dynamic mode runs one documented command and parses its stdout as a
//! plain string, a single JSON object, or newline-delimited JSON documents.

use crate::error::{VolcacheError, VolcacheResult};
use async_trait::async_trait;
use semver::Version;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured result of an introspection command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether the command exited with status zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands on behalf of mode resolvers and privileged steps
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output
    async fn run(&self, program: &str, args: &[&str]) -> VolcacheResult<CommandOutput>;
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs commands as child processes of this one
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    working_dir: Option<PathBuf>,
}

impl SystemRunner {
    /// Create a runner using the current directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from the given directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> VolcacheResult<CommandOutput> {
        let line = command_line(program, args);
        debug!("Executing: {}", line);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| VolcacheError::command_failed(line, e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and return its stdout, failing on a non-zero exit
pub async fn stdout_of(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> VolcacheResult<String> {
    let output = runner.run(program, args).await?;
    if !output.success() {
        let code = output
            .code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        return Err(VolcacheError::introspection(
            command_line(program, args),
            format!("exit code {}: {}", code, output.stderr.trim()),
        ));
    }
    Ok(output.stdout)
}

/// Parse a tool's self-reported version leniently (`v9.1`, `1.22.19\n`)
pub fn parse_version(raw: &str) -> Option<Version> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches('v');

    if let Ok(version) = Version::parse(line) {
        return Some(version);
    }

    let mut parts = [0u64; 3];
    let mut seen = 0;
    for (slot, piece) in parts.iter_mut().zip(line.split('.')) {
        let digits: String = piece.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        *slot = digits.parse().ok()?;
        seen += 1;
    }

    (seen > 0).then(|| Version::new(parts[0], parts[1], parts[2]))
}

/// Drops warning lines some tool versions print ahead of their real output
#[derive(Debug, Clone)]
pub struct WarningFilter {
    prefix: &'static str,
    threshold: Version,
}

impl WarningFilter {
    pub const fn new(prefix: &'static str, threshold: Version) -> Self {
        Self { prefix, threshold }
    }

    fn is_warning(&self, line: &str) -> bool {
        line.trim_start().starts_with(self.prefix)
    }

    /// Strip warning lines from `stdout`.
    ///
    /// Leading warning lines are always dropped. Below the version threshold
    /// (or when the version is unknown) warning lines are dropped anywhere.
    pub fn apply(&self, stdout: &str, version: Option<&Version>) -> String {
        let strip_everywhere = version.map_or(true, |v| *v < self.threshold);

        let mut leading = true;
        let mut kept = Vec::new();
        for line in stdout.lines() {
            let warning = self.is_warning(line);
            if warning && (leading || strip_everywhere) {
                continue;
            }
            if !line.trim().is_empty() {
                leading = false;
            }
            kept.push(line);
        }

        let mut out = kept.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Parse plain single-path output (last non-empty line wins)
pub fn parse_plain(stdout: &str) -> VolcacheResult<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| VolcacheError::introspection("stdout", "empty output"))
}

/// Parse output that is exactly one JSON object
pub fn parse_object(stdout: &str) -> VolcacheResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(stdout.trim())? {
        Value::Object(map) => Ok(map),
        other => Err(VolcacheError::introspection(
            "stdout",
            format!("expected a JSON object, got {}", other),
        )),
    }
}

/// Parse a stream of concatenated JSON documents.
///
/// Documents may sit one per line or be pretty-printed across several lines.
pub fn parse_documents(stdout: &str) -> VolcacheResult<Vec<Value>> {
    serde_json::Deserializer::from_str(stdout)
        .into_iter::<Value>()
        .map(|doc| doc.map_err(VolcacheError::from))
        .collect()
}
