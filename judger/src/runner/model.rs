use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::JudgeErr;

/// A program and its arguments. Never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    pub fn from_argv(argv: Vec<String>) -> Result<Self, JudgeErr> {
        if argv.is_empty() || argv[0].is_empty() {
            return Err(JudgeErr::BadCommand(
                format!("{:?}", argv),
                "command must contain at least one string".into(),
            ));
        }
        Ok(CommandLine(argv))
    }

    /// Build a command line from literal, known non-empty arguments.
    pub(crate) fn from_literal(argv: &[&str]) -> Self {
        debug_assert!(!argv.is_empty());
        CommandLine(argv.iter().map(|x| x.to_string()).collect())
    }

    /// Split a shell-like command string into a command line.
    pub fn parse(s: &str) -> Result<Self, JudgeErr> {
        let argv = shell_words::split(s).map_err(|e| JudgeErr::BadCommand(s.into(), e.to_string()))?;
        Self::from_argv(argv)
    }

    pub fn program(&self) -> &str {
        &self.0[0]
    }

    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    /// The program to execute when running inside `cwd`.
    ///
    /// Relative paths containing a separator (`./main`, `bin/main`) are
    /// resolved against `cwd`; bare names are left for `PATH` lookup.
    pub fn resolve_program(&self, cwd: &Path) -> PathBuf {
        let program = Path::new(self.program());
        if program.is_relative() && program.components().count() > 1 {
            cwd.join(program)
        } else {
            program.to_owned()
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&shell_words::join(&self.0))
    }
}

impl<'de> Deserialize<'de> for CommandLine {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let argv = crate::util::string_or_argv(deserializer)?;
        CommandLine::from_argv(argv).map_err(serde::de::Error::custom)
    }
}

/// How a supervised process came to an end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    Unknown,
}

impl From<std::process::ExitStatus> for Termination {
    #[cfg(unix)]
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match (status.code(), status.signal()) {
            (Some(x), _) => Termination::Exited(x),
            (None, Some(x)) => Termination::Signaled(x),
            _ => Termination::Unknown,
        }
    }

    #[cfg(not(unix))]
    fn from(status: std::process::ExitStatus) -> Self {
        status
            .code()
            .map(Termination::Exited)
            .unwrap_or(Termination::Unknown)
    }
}

/// Per-test-case limits and capture settings.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct RunLimits {
    /// Wall-clock ceiling. Only strictly exceeding it triggers the guard.
    pub time_limit: Duration,

    /// Resident-set ceiling. Only samples strictly above it trigger the guard.
    pub memory_limit_bytes: u64,

    #[builder(default = "Duration::from_millis(100)")]
    pub poll_interval: Duration,

    #[builder(default = "16*1024*1024")]
    pub stdout_size_limit: usize,

    #[builder(default = "64*1024")]
    pub stderr_size_limit: usize,
}

/// What a launcher needs to know to start one process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Working directory, shared read-only by all processes of a judgement.
    pub cwd: PathBuf,
    pub time_limit: Duration,
    pub memory_limit_bytes: u64,
}

/// The result returned by supervising one test-case process.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProcessOutput {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub time_ms: u64,
    pub peak_memory_kb: Option<u64>,
    /// Set to the capture limit when stdout went past it and was cut.
    pub stdout_truncated_at: Option<usize>,
}
