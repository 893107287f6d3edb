use std::{
    borrow::Cow,
    collections::BTreeMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::process::Child;

use crate::{
    client::model::{TestCase, WorkItem},
    config::{default_languages, JudgerConfig, LanguageConfig},
    judge::JudgeContext,
    runner::{
        model::{CommandLine, LaunchOptions},
        Launcher, PlainLauncher,
    },
};

/// A launcher that records every process it starts.
#[derive(Default)]
pub struct CountingLauncher {
    inner: PlainLauncher,
    spawned: AtomicUsize,
    pids: Mutex<Vec<u32>>,
}

impl CountingLauncher {
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for CountingLauncher {
    fn name(&self) -> Cow<'static, str> {
        "counting".into()
    }

    async fn launch(&self, cmd: &CommandLine, opt: &LaunchOptions) -> std::io::Result<Child> {
        let child = self.inner.launch(cmd, opt).await?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        if let Some(pid) = child.id() {
            self.pids.lock().unwrap().push(pid);
        }
        Ok(child)
    }
}

fn lang(source: &str, compile: Option<&str>, run: &str) -> LanguageConfig {
    LanguageConfig {
        source_file_name: source.into(),
        compile_command: compile.map(|c| CommandLine::parse(c).unwrap()),
        run_command: CommandLine::parse(run).unwrap(),
    }
}

/// The built-in languages plus POSIX shell ones that need no compiler, and
/// C linked against pthreads.
pub fn test_languages() -> BTreeMap<String, LanguageConfig> {
    let mut map = default_languages();
    map.insert("shell".into(), lang("main.sh", None, "sh main.sh"));
    map.insert(
        "shell-checked".into(),
        lang("main.sh", Some("sh -n main.sh"), "sh main.sh"),
    );
    map.insert(
        "c-threads".into(),
        lang("main.c", Some("gcc main.c -O2 -pthread -o main"), "./main"),
    );
    map.insert(
        "ghost".into(),
        lang("main.txt", None, "definitely-not-a-program-7c1e"),
    );
    map
}

pub fn test_config(work_root: &Path) -> JudgerConfig {
    JudgerConfig {
        work_root: work_root.to_owned(),
        compile_timeout_ms: 20_000,
        memory_poll_interval_ms: 20,
        languages: test_languages(),
        ..Default::default()
    }
}

pub fn context_with(cfg: JudgerConfig) -> (JudgeContext, Arc<CountingLauncher>) {
    let launcher = Arc::new(CountingLauncher::default());
    let ctx = JudgeContext::with_launcher(Arc::new(cfg), launcher.clone());
    (ctx, launcher)
}

pub fn case(input: &str, expected: &str) -> TestCase {
    TestCase {
        input: input.into(),
        expected_output: expected.into(),
    }
}

pub fn work_item(id: &str, language: &str, code: &str, cases: Vec<TestCase>) -> WorkItem {
    WorkItem {
        correlation_id: id.into(),
        code: code.into(),
        language: language.into(),
        time_limit_ms: 2000,
        memory_limit_mb: 256,
        test_cases: cases,
    }
}

/// Whether `program` can be found in `PATH`.
pub fn has_program(program: &str) -> bool {
    let found = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {}", program))
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        tracing::warn!("{} not found, skipping", program);
    }
    found
}
