//! The compile step that runs once per judgement, before any test case.

use std::{path::Path, process::Stdio, time::Duration};

use tokio::process::Command;

use super::{exec::kill_process_group, model::CommandLine, model::Termination};

pub const COMPILE_TIMEOUT_DIAGNOSTIC: &str = "compile timeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    Success,
    Failure { diagnostic: String },
}

/// Run the compile command inside `cwd`.
///
/// Interpreted languages have no compile command and always succeed.
///
/// # Error Handling
///
/// Returning `Ok(_)` means the compiler ran; whether the user's code compiled
/// is inside the [`CompileResult`]. `Err(_)` means the compiler itself could
/// not be started or waited on.
pub async fn compile(
    command: Option<&CommandLine>,
    cwd: &Path,
    timeout: Duration,
) -> std::io::Result<CompileResult> {
    let command = match command {
        Some(c) => c,
        None => return Ok(CompileResult::Success),
    };
    tracing::debug!(%command, "Compiling");

    let mut std_command = std::process::Command::new(command.resolve_program(cwd));
    std_command
        .args(command.args())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }
    let mut tokio_command = Command::from(std_command);
    tokio_command.kill_on_drop(true);

    let child = tokio_command.spawn()?;
    let pgid = child.id();

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            // Dropping the future killed the compiler itself; its helpers
            // (`cc1`, `as`, ...) share the process group.
            if let Some(pgid) = pgid {
                kill_process_group(pgid);
            }
            tracing::info!(?timeout, "Compiler timed out");
            return Ok(CompileResult::Failure {
                diagnostic: COMPILE_TIMEOUT_DIAGNOSTIC.into(),
            });
        }
    };

    if output.status.success() {
        return Ok(CompileResult::Success);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let diagnostic = if !stderr.trim().is_empty() {
        stderr.into_owned()
    } else if !stdout.trim().is_empty() {
        stdout.into_owned()
    } else {
        match Termination::from(output.status) {
            Termination::Exited(code) => format!("compiler exited with code {}", code),
            Termination::Signaled(sig) => format!("compiler killed by signal {}", sig),
            Termination::Unknown => "compiler failed".into(),
        }
    };
    tracing::debug!("Compilation failed");
    Ok(CompileResult::Failure { diagnostic })
}
