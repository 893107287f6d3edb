use anyhow::Context;
use clap::Parser;
use code_judger::{
    client::{
        consume_work_items,
        model::WorkItem,
        sink::{DirectorySink, ResultSink, StdoutSink},
        work_items_from_lines,
    },
    config::JudgerConfig,
    judge::{judge, JudgeContext},
};
use std::{
    path::Path,
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::io::{AsyncBufRead, BufReader};
use tracing_subscriber::EnvFilter;

mod opt;

static CTRL_C: AtomicBool = AtomicBool::new(false);
static CTRL_C_TWICE: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = opt::Opts::parse();

    // Standard output carries judgements only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    ctrlc::set_handler(handle_ctrl_c).context("Failed to set termination handler")?;

    match opt.cmd {
        opt::SubCmd::Run(cmd) => run(cmd).await,
        opt::SubCmd::Batch(cmd) => batch(cmd).await,
        opt::SubCmd::Languages(cmd) => languages(cmd),
    }
}

async fn make_sink(out_dir: Option<&Path>) -> anyhow::Result<Arc<dyn ResultSink>> {
    Ok(match out_dir {
        Some(dir) => Arc::new(DirectorySink::new(dir).await?),
        None => Arc::new(StdoutSink::new()),
    })
}

async fn run(cmd: opt::RunSubCmd) -> anyhow::Result<()> {
    let cfg = Arc::new(JudgerConfig::load(cmd.config.as_deref())?);
    let sink = make_sink(cmd.out_dir.as_deref()).await?;

    let raw = tokio::fs::read(&cmd.work_item)
        .await
        .with_context(|| format!("Failed to read work item {:?}", cmd.work_item))?;
    let item: WorkItem = serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to decode work item {:?}", cmd.work_item))?;

    let ctx = JudgeContext::new(cfg);
    let judgement = judge(&item, &ctx).await;
    sink.put(&item.correlation_id, &judgement).await?;
    Ok(())
}

async fn batch(cmd: opt::BatchSubCmd) -> anyhow::Result<()> {
    let cfg = Arc::new(JudgerConfig::load(cmd.config.as_deref())?);
    let sink = make_sink(cmd.out_dir.as_deref()).await?;

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &cmd.input {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {:?}", path))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let max_jobs = cfg.max_concurrent_jobs;
    let ctx = Arc::new(JudgeContext::new(cfg));
    tracing::info!(max_jobs, launcher = %ctx.launcher.name(), "Waiting for work items");
    let count =
        consume_work_items(work_items_from_lines(input), ctx, sink, max_jobs, &CTRL_C).await;
    tracing::info!("Judged {} work item(s)", count);
    Ok(())
}

fn languages(cmd: opt::LanguagesSubCmd) -> anyhow::Result<()> {
    let cfg = JudgerConfig::load(cmd.config.as_deref())?;
    for (tag, lang) in &cfg.languages {
        let compile = lang
            .compile_command
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}\t{}\t{}\t{}",
            tag, lang.source_file_name, compile, lang.run_command
        );
    }
    Ok(())
}

fn handle_ctrl_c() {
    if !CTRL_C.load(Ordering::SeqCst) {
        tracing::warn!("Waiting for existing jobs to complete... Press Ctrl-C again to force quit.");
        CTRL_C.store(true, Ordering::SeqCst);
    } else if !CTRL_C_TWICE.load(Ordering::SeqCst) {
        tracing::error!("Force quit!");
        CTRL_C_TWICE.store(true, Ordering::SeqCst);
        exit(101);
    }
}
