//! Runs every test case of a judgement in its own process, concurrently, each
//! under its own time and memory guard.
//!
//! One supervising task per test case owns its process handle, its timer and
//! its memory sampler. Tasks share nothing mutable; results are put back in
//! input order by awaiting the task handles in the order they were spawned.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::ChildStdin,
    sync::Semaphore,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing_futures::Instrument;

use super::{
    exec::{force_kill, kill_process_group, Launcher},
    usage,
    model::{CommandLine, LaunchOptions, ProcessOutput, RunLimits, Termination},
};
use crate::{
    client::model::{TestCase, TestOutcome, Verdict},
    tester::classify,
};

/// How long to wait for output pipes to close after the process exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Everything a test-case task needs, shared read-only between tasks.
#[derive(Clone)]
pub struct Supervisor {
    pub launcher: Arc<dyn Launcher>,
    /// Bounds the number of live test-case processes.
    pub permits: Arc<Semaphore>,
    pub run_command: Arc<CommandLine>,
    pub launch_opts: Arc<LaunchOptions>,
    pub limits: Arc<RunLimits>,
}

impl Supervisor {
    /// Run all test cases and collect one outcome per case, in input order.
    pub async fn run(&self, test_cases: &[TestCase]) -> Vec<TestOutcome> {
        let handles: Vec<JoinHandle<TestOutcome>> = test_cases
            .iter()
            .enumerate()
            .map(|(idx, case)| {
                let this = self.clone();
                let case = case.clone();
                let span = tracing::info_span!("test_case", idx);
                tokio::spawn(async move { this.run_case(case).await }.instrument(span))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, case) in handles.into_iter().zip(test_cases) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Test case task failed: {}", e);
                    TestOutcome::internal_error(case, format!("supervisor task failed: {}", e))
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_case(&self, case: TestCase) -> TestOutcome {
        match self.supervise(&case).await {
            Ok((pending, output)) => {
                let (verdict, diagnostic) = classify(pending, &output, &case.expected_output);
                tracing::debug!(?verdict, time_ms = output.time_ms, "Test case finished");
                TestOutcome {
                    input: case.input,
                    expected_output: case.expected_output,
                    observed_output: Some(output.stdout.trim().to_owned()),
                    verdict,
                    diagnostic,
                    time_ms: Some(output.time_ms),
                    memory_kb: output.peak_memory_kb,
                }
            }
            Err(e) => {
                tracing::warn!("Internal error while running test case: {:#}", e);
                TestOutcome::internal_error(&case, format!("{:#}", e))
            }
        }
    }

    /// Spawn, feed, watch and reap one process.
    ///
    /// Returns the kill verdict recorded by a guard, if any, along with what
    /// the process left behind.
    async fn supervise(&self, case: &TestCase) -> anyhow::Result<(Option<Verdict>, ProcessOutput)> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("process permits closed")?;

        let mut child = self
            .launcher
            .launch(&self.run_command, &self.launch_opts)
            .await
            .with_context(|| format!("failed to launch `{}`", self.run_command))?;
        let started = Instant::now();
        let pid = child.id().context("process was reaped before supervision")?;

        let stdin = child.stdin.take().context("stdin is not piped")?;
        let stdout = child.stdout.take().context("stdout is not piped")?;
        let stderr = child.stderr.take().context("stderr is not piped")?;
        let feeder = tokio::spawn(feed_input(stdin, case.input.clone()));
        let stdout_reader = tokio::spawn(read_capped(stdout, self.limits.stdout_size_limit));
        let stderr_reader = tokio::spawn(read_capped(stderr, self.limits.stderr_size_limit));
        // Observes the exit but leaves reaping to `child.wait()` below
        let mut exited = tokio::task::spawn_blocking(move || usage::wait_unreaped(pid));

        let deadline = tokio::time::sleep(self.limits.time_limit);
        tokio::pin!(deadline);
        let mut sampler = tokio::time::interval(self.limits.poll_interval);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let memory_limit_kb = self.limits.memory_limit_bytes / 1024;

        let mut pending: Option<Verdict> = None;
        let mut peak_memory_kb: Option<u64> = None;

        // Guards are disabled once a kill verdict is pending; they are
        // dropped with this loop, which cancels whatever has not fired.
        let exit_usage = loop {
            tokio::select! {
                // A process that exited in time is never judged by a guard
                biased;
                res = &mut exited => break res.context("exit watcher failed")?
                    .context("failed to wait for process")?,
                _ = &mut deadline, if pending.is_none() => {
                    tracing::debug!("Time limit exceeded, killing");
                    pending = Some(Verdict::TimeLimitExceeded);
                    force_kill(&mut child, Some(pid));
                }
                _ = sampler.tick(), if pending.is_none() => {
                    match usage::resident_kb(pid).await {
                        Ok(Some(kb)) => {
                            peak_memory_kb = Some(peak_memory_kb.map_or(kb, |p| p.max(kb)));
                            if kb > memory_limit_kb {
                                tracing::debug!(kb, "Memory limit exceeded, killing");
                                pending = Some(Verdict::MemoryLimitExceeded);
                                force_kill(&mut child, Some(pid));
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::debug!("Failed to sample memory: {}", e),
                    }
                }
            }
        };
        let time_ms = started.elapsed().as_millis() as u64;

        // The leader is a zombie now, so its group id cannot have been
        // reused. Descendants may still hold the output pipes open.
        kill_process_group(pid);
        let status = child.wait().await.context("failed to reap process")?;
        let termination = Termination::from(status);

        let inherited_kb = match usage::own_peak_kb().await {
            Ok(kb) => kb.unwrap_or(0),
            Err(e) => {
                tracing::debug!("Failed to read own peak memory: {}", e);
                u64::MAX
            }
        };
        if let Some(kb) = exit_usage.peak_memory_kb.filter(|&kb| kb > inherited_kb) {
            peak_memory_kb = Some(peak_memory_kb.map_or(kb, |p| p.max(kb)));
            // Catches peaks that rose and fell between two samples
            if pending.is_none() && kb > memory_limit_kb {
                tracing::debug!(kb, "Peak memory over limit");
                pending = Some(Verdict::MemoryLimitExceeded);
            }
        }
        if pending.is_none() {
            pending = self
                .launcher
                .limit_verdict(&termination, &exit_usage, &self.launch_opts);
        }

        feeder.abort();
        let (stdout, stdout_truncated) = drain(stdout_reader).await?;
        let (stderr, _) = drain(stderr_reader).await?;

        Ok((
            pending,
            ProcessOutput {
                termination,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                time_ms,
                peak_memory_kb,
                stdout_truncated_at: stdout_truncated.then(|| self.limits.stdout_size_limit),
            },
        ))
    }
}

/// Write the whole input, then close the stream to signal end-of-input.
async fn feed_input(mut stdin: ChildStdin, input: String) {
    match stdin.write_all(input.as_bytes()).await {
        Ok(()) => {}
        // The program is free to exit without reading its input
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => tracing::debug!("Failed to write stdin: {}", e),
    }
    drop(stdin);
}

/// Read a stream to its end, keeping at most `limit` bytes. The flag tells
/// whether anything was dropped.
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(buf.len());
        if n > room {
            truncated = true;
        }
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok((buf, truncated))
}

async fn drain(
    mut reader: JoinHandle<std::io::Result<(Vec<u8>, bool)>>,
) -> anyhow::Result<(Vec<u8>, bool)> {
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut reader).await {
        Ok(res) => Ok(res.context("output reader failed")??),
        Err(_) => {
            reader.abort();
            anyhow::bail!("output stream was not closed after the process exited")
        }
    }
}
