//! Starting and killing test-case processes.

use std::borrow::Cow;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::{
    model::{CommandLine, LaunchOptions, Termination},
    usage::ExitUsage,
};
use crate::client::model::Verdict;

/// Something that can start an untrusted program.
///
/// This is the seam where isolation lives: the supervisor only spawns, feeds,
/// samples, kills and classifies, whatever the launcher wraps the process in.
///
/// Implementations must pipe all three standard streams and must put the
/// child at the head of its own process group, since force-kill targets the
/// whole group.
#[async_trait]
pub trait Launcher: Sync + Send {
    /// The name of this launcher, used in logs
    fn name(&self) -> Cow<'static, str>;

    async fn launch(&self, cmd: &CommandLine, opt: &LaunchOptions) -> std::io::Result<Child>;

    /// The verdict of a process ended by a limit this launcher imposed, as
    /// opposed to one the supervisor enforces itself.
    fn limit_verdict(
        &self,
        _termination: &Termination,
        _usage: &ExitUsage,
        _opt: &LaunchOptions,
    ) -> Option<Verdict> {
        None
    }
}

/// Spawns the program as a plain child process, with no isolation at all.
#[derive(Debug, Default)]
pub struct PlainLauncher;

#[async_trait]
impl Launcher for PlainLauncher {
    fn name(&self) -> Cow<'static, str> {
        "plain".into()
    }

    async fn launch(&self, cmd: &CommandLine, opt: &LaunchOptions) -> std::io::Result<Child> {
        piped_command(cmd, opt).spawn()
    }
}

/// Spawns the program with kernel resource limits applied before `exec`.
///
/// CPU time is capped slightly above the wall-clock limit, so that programs
/// burning CPU on several threads are stopped by the kernel with `SIGXCPU`
/// (and `SIGKILL` one second later if they ignore it). Both are judged as
/// time limit exceeded. Memory is not capped here: resident memory is judged
/// by the supervisor, and an address-space cap would turn a large allocation
/// into an allocator failure that looks like any other crash.
#[derive(Debug, Default)]
pub struct RlimitLauncher;

impl RlimitLauncher {
    /// The soft CPU-time limit for a given wall-clock limit. The hard limit
    /// is one second above it.
    pub fn cpu_limit(opt: &LaunchOptions) -> std::time::Duration {
        std::time::Duration::from_secs(opt.time_limit.as_secs() + 1)
    }
}

#[async_trait]
impl Launcher for RlimitLauncher {
    fn name(&self) -> Cow<'static, str> {
        "rlimit".into()
    }

    async fn launch(&self, cmd: &CommandLine, opt: &LaunchOptions) -> std::io::Result<Child> {
        use nix::sys::resource::{setrlimit, Resource};

        let cpu_secs = Self::cpu_limit(opt).as_secs();

        let mut command = piped_command(cmd, opt);
        // SAFETY: only async-signal-safe syscalls run between fork and exec.
        unsafe {
            command.pre_exec(move || {
                setrlimit(Resource::RLIMIT_CPU, cpu_secs, cpu_secs + 1)?;
                setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
                Ok(())
            });
        }
        command.spawn()
    }

    fn limit_verdict(
        &self,
        termination: &Termination,
        usage: &ExitUsage,
        opt: &LaunchOptions,
    ) -> Option<Verdict> {
        match *termination {
            Termination::Signaled(libc::SIGXCPU) => Some(Verdict::TimeLimitExceeded),
            Termination::Signaled(libc::SIGKILL)
                if usage.cpu_time.map_or(false, |t| t >= Self::cpu_limit(opt)) =>
            {
                Some(Verdict::TimeLimitExceeded)
            }
            _ => None,
        }
    }
}

/// Build a command with all standard streams piped, placed in a new process
/// group and killed if its handle is dropped.
pub fn piped_command(cmd: &CommandLine, opt: &LaunchOptions) -> Command {
    let mut std_command = std::process::Command::new(cmd.resolve_program(&opt.cwd));
    std_command
        .args(cmd.args())
        .current_dir(&opt.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }
    let mut command = Command::from(std_command);
    command.kill_on_drop(true);
    command
}

/// Force-kill a process and its whole process group.
///
/// Idempotent: killing something that has already exited is a no-op.
pub fn force_kill(child: &mut Child, pgid: Option<u32>) {
    if let Some(pgid) = pgid {
        kill_process_group(pgid);
    }
    if let Err(e) = child.start_kill() {
        tracing::trace!("process already gone: {}", e);
    }
}

#[cfg(unix)]
pub fn kill_process_group(pgid: u32) {
    use nix::{
        errno::Errno,
        sys::signal::{killpg, Signal},
        unistd::Pid,
    };

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, "failed to kill process group: {}", e),
    }
}

#[cfg(not(unix))]
pub fn kill_process_group(_pgid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn opts() -> LaunchOptions {
        LaunchOptions {
            cwd: std::env::temp_dir(),
            time_limit: Duration::from_secs(1),
            memory_limit_bytes: 256 * 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn plain_launcher_pipes_stdout() {
        let cmd = CommandLine::parse("echo plain").unwrap();
        let mut child = PlainLauncher.launch(&cmd, &opts()).await.unwrap();
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).await.unwrap();
        assert!(child.wait().await.unwrap().success());
        assert_eq!(out, "plain\n");
    }

    #[tokio::test]
    async fn rlimit_launcher_applies_cpu_limit() {
        let cmd = CommandLine::parse("sh -c 'ulimit -t'").unwrap();
        let mut child = RlimitLauncher.launch(&cmd, &opts()).await.unwrap();
        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).await.unwrap();
        child.wait().await.unwrap();
        assert_eq!(out.trim(), "2");
    }

    #[test]
    fn cpu_limit_signals_mean_time_limit_exceeded() {
        let opt = opts();
        let used = |secs| ExitUsage {
            cpu_time: Some(Duration::from_secs(secs)),
            peak_memory_kb: Some(1024),
        };
        let verdict = |t, u| RlimitLauncher.limit_verdict(&t, &u, &opt);

        assert_eq!(
            verdict(Termination::Signaled(libc::SIGXCPU), used(2)),
            Some(Verdict::TimeLimitExceeded)
        );
        assert_eq!(
            verdict(Termination::Signaled(libc::SIGKILL), used(3)),
            Some(Verdict::TimeLimitExceeded)
        );
        // killed by someone else, well within its CPU budget
        assert_eq!(verdict(Termination::Signaled(libc::SIGKILL), used(0)), None);
        assert_eq!(verdict(Termination::Signaled(libc::SIGSEGV), used(5)), None);
        assert_eq!(verdict(Termination::Exited(1), used(5)), None);

        assert_eq!(
            PlainLauncher.limit_verdict(&Termination::Signaled(libc::SIGXCPU), &used(2), &opt),
            None
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killing_twice_is_harmless() {
        let cmd = CommandLine::parse("sleep 10").unwrap();
        let mut child = PlainLauncher.launch(&cmd, &opts()).await.unwrap();
        let pid = child.id();
        force_kill(&mut child, pid);
        let status = child.wait().await.unwrap();
        // the group is gone with its reaped leader, only the handle is left
        force_kill(&mut child, None);
        assert_eq!(
            crate::runner::model::Termination::from(status),
            crate::runner::model::Termination::Signaled(9)
        );
    }
}
