use crate::client::JudgeErr;
use crate::runner::model::CommandLine;
use anyhow::Context;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// How a supported language is turned into a running program.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfig {
    /// The file the submitted code is written to, relative to the workspace.
    #[serde(alias = "source_file_name")]
    pub source_file_name: String,
    /// Absent for interpreted languages.
    #[serde(alias = "compile_command", default)]
    pub compile_command: Option<CommandLine>,
    #[serde(alias = "run_command")]
    pub run_command: CommandLine,
}

impl LanguageConfig {
    fn new(source: &str, compile: Option<&[&str]>, run: &[&str]) -> LanguageConfig {
        LanguageConfig {
            source_file_name: source.into(),
            compile_command: compile.map(CommandLine::from_literal),
            run_command: CommandLine::from_literal(run),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    /// Plain child processes.
    Plain,
    /// Child processes with kernel resource limits set before `exec`.
    Rlimit,
}

impl Default for SandboxKind {
    fn default() -> Self {
        SandboxKind::Plain
    }
}

/// Judger-wide configuration, read from a TOML file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default, rename_all = "snake_case")]
pub struct JudgerConfig {
    /// Directory under which every work item gets its own workspace.
    pub work_root: PathBuf,

    pub compile_timeout_ms: u64,

    /// Period of resident memory sampling of each test-case process.
    pub memory_poll_interval_ms: u64,

    /// Maximum number of test-case processes alive at once, across all work
    /// items handled by this judger.
    pub max_concurrent_processes: usize,

    /// Maximum number of work items judged at once.
    pub max_concurrent_jobs: usize,

    pub stdout_size_limit: usize,
    pub stderr_size_limit: usize,

    pub sandbox: SandboxKind,

    /// Keep workspaces after judging, for debugging.
    pub keep_workspace: bool,

    /// Supported languages, by language tag. A table in the config file
    /// replaces the built-in one as a whole.
    pub languages: BTreeMap<String, LanguageConfig>,
}

impl Default for JudgerConfig {
    fn default() -> Self {
        JudgerConfig {
            work_root: std::env::temp_dir().join("code-judger"),
            compile_timeout_ms: 10_000,
            memory_poll_interval_ms: 100,
            max_concurrent_processes: 16,
            max_concurrent_jobs: 1,
            stdout_size_limit: 16 * 1024 * 1024,
            stderr_size_limit: 64 * 1024,
            sandbox: SandboxKind::Plain,
            keep_workspace: false,
            languages: default_languages(),
        }
    }
}

pub fn default_languages() -> BTreeMap<String, LanguageConfig> {
    let mut map = BTreeMap::new();
    map.insert(
        "c".into(),
        LanguageConfig::new("main.c", Some(&["gcc", "main.c", "-O2", "-o", "main"]), &["./main"]),
    );
    map.insert(
        "cpp".into(),
        LanguageConfig::new(
            "main.cpp",
            Some(&["g++", "main.cpp", "-O2", "-o", "main"]),
            &["./main"],
        ),
    );
    map.insert(
        "python".into(),
        LanguageConfig::new("main.py", None, &["python3", "main.py"]),
    );
    map
}

impl JudgerConfig {
    /// Read the config at `path`, or the defaults if there is none.
    pub fn load(path: Option<&Path>) -> anyhow::Result<JudgerConfig> {
        let cfg = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?
            }
            None => JudgerConfig::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<JudgerConfig> {
        let mut cfg: JudgerConfig = toml::from_str(text)?;
        cfg.work_root = cfg.work_root.absolutize()?.into_owned();
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_processes == 0 {
            anyhow::bail!("max_concurrent_processes must be at least 1");
        }
        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("max_concurrent_jobs must be at least 1");
        }
        for (tag, lang) in &self.languages {
            if let Err(e) = crate::util::path_security::enforce_child_path(Path::new(
                &lang.source_file_name,
            )) {
                anyhow::bail!("Language `{}` has a bad source file name: {}", tag, e);
            }
        }
        Ok(())
    }

    /// Look up the language table entry of `language`.
    pub fn resolve(&self, language: &str) -> Result<&LanguageConfig, JudgeErr> {
        self.languages
            .get(language)
            .ok_or_else(|| JudgeErr::UnsupportedLanguage(language.into()))
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn memory_poll_interval(&self) -> Duration {
        Duration::from_millis(self.memory_poll_interval_ms.max(1))
    }
}
