//! The judging pipeline: resolve, materialize, compile, run, aggregate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::instrument;

use crate::{
    client::{
        model::{Judgement, WorkItem},
        JudgeErr,
    },
    config::{JudgerConfig, SandboxKind},
    fs::Workspace,
    runner::{
        compile::{compile, CompileResult},
        model::{LaunchOptions, RunLimitsBuilder},
        Launcher, PlainLauncher, RlimitLauncher, Supervisor,
    },
    tester::aggregate,
    util::AsyncTeardown,
};

/// Everything shared by all judgements of one judger.
#[derive(Clone)]
pub struct JudgeContext {
    pub cfg: Arc<JudgerConfig>,
    pub launcher: Arc<dyn Launcher>,
    /// Process permits, shared across judgements.
    pub permits: Arc<Semaphore>,
}

impl JudgeContext {
    /// Create a context using the launcher named in `cfg`.
    pub fn new(cfg: Arc<JudgerConfig>) -> JudgeContext {
        let launcher: Arc<dyn Launcher> = match cfg.sandbox {
            SandboxKind::Plain => Arc::new(PlainLauncher),
            SandboxKind::Rlimit => Arc::new(RlimitLauncher::default()),
        };
        Self::with_launcher(cfg, launcher)
    }

    pub fn with_launcher(cfg: Arc<JudgerConfig>, launcher: Arc<dyn Launcher>) -> JudgeContext {
        let permits = Arc::new(Semaphore::new(cfg.max_concurrent_processes.max(1)));
        JudgeContext {
            cfg,
            launcher,
            permits,
        }
    }
}

/// Judge one work item.
///
/// Always returns a complete judgement: pipeline-level failures come back as
/// a single `INTERNAL_ERROR` outcome instead of an error.
#[instrument(skip_all, fields(id = %item.correlation_id, lang = %item.language))]
pub async fn judge(item: &WorkItem, ctx: &JudgeContext) -> Judgement {
    match judge_inner(item, ctx).await {
        Ok(judgement) => {
            tracing::info!(verdicts = ?judgement.verdicts(), "Judged");
            judgement
        }
        Err(e) => {
            tracing::warn!("Judging failed: {}", e);
            Judgement::internal_error(&item.correlation_id, e.to_string())
        }
    }
}

async fn judge_inner(item: &WorkItem, ctx: &JudgeContext) -> Result<Judgement, JudgeErr> {
    validate(item)?;
    let lang = ctx.cfg.resolve(&item.language)?;
    tracing::debug!(launcher = %ctx.launcher.name(), "Language resolved");

    let mut workspace =
        Workspace::create(&ctx.cfg.work_root, &item.correlation_id, ctx.cfg.keep_workspace).await?;
    let res = run_in_workspace(item, ctx, lang, &workspace).await;
    workspace.teardown().await;
    res
}

async fn run_in_workspace(
    item: &WorkItem,
    ctx: &JudgeContext,
    lang: &crate::config::LanguageConfig,
    workspace: &Workspace,
) -> Result<Judgement, JudgeErr> {
    workspace.materialize(&lang.source_file_name, &item.code).await?;

    let compiled = compile(
        lang.compile_command.as_ref(),
        workspace.path(),
        ctx.cfg.compile_timeout(),
    )
    .await
    .map_err(|e| {
        let cmd = lang
            .compile_command
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default();
        JudgeErr::BadCommand(cmd, format!("compiler could not be run: {}", e))
    })?;
    if let CompileResult::Failure { diagnostic } = compiled {
        tracing::info!("Compilation error");
        return Ok(Judgement::compile_error(&item.correlation_id, diagnostic));
    }

    let time_limit = Duration::from_millis(item.time_limit_ms);
    let memory_limit_bytes = item.memory_limit_mb.saturating_mul(1024 * 1024);
    let limits = RunLimitsBuilder::default()
        .time_limit(time_limit)
        .memory_limit_bytes(memory_limit_bytes)
        .poll_interval(ctx.cfg.memory_poll_interval())
        .stdout_size_limit(ctx.cfg.stdout_size_limit)
        .stderr_size_limit(ctx.cfg.stderr_size_limit)
        .build()
        .map_err(|e| JudgeErr::Any(anyhow::anyhow!(e)))?;

    let supervisor = Supervisor {
        launcher: ctx.launcher.clone(),
        permits: ctx.permits.clone(),
        run_command: Arc::new(lang.run_command.clone()),
        launch_opts: Arc::new(LaunchOptions {
            cwd: workspace.path().to_owned(),
            time_limit,
            memory_limit_bytes,
        }),
        limits: Arc::new(limits),
    };
    let outcomes = supervisor.run(&item.test_cases).await;
    Ok(aggregate(&item.correlation_id, outcomes))
}

fn validate(item: &WorkItem) -> Result<(), JudgeErr> {
    if item.time_limit_ms == 0 {
        return Err(JudgeErr::InvalidWorkItem("time limit must be positive".into()));
    }
    if item.memory_limit_mb == 0 {
        return Err(JudgeErr::InvalidWorkItem("memory limit must be positive".into()));
    }
    Ok(())
}
