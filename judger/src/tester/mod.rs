//! Turning what a process left behind into verdicts, and verdicts into a
//! judgement.

pub mod utils;

use crate::client::model::{Judgement, TestOutcome, Verdict};
use crate::runner::model::{ProcessOutput, Termination};

use self::utils::{diff, outputs_match, strsignal};

/// Decide the final verdict of a test case whose process has terminated.
///
/// Precedence, highest first: a kill verdict recorded by a guard, then
/// termination by a signal, then output comparison. Output cut at the
/// capture limit never matches.
pub fn classify(
    pending: Option<Verdict>,
    output: &ProcessOutput,
    expected: &str,
) -> (Verdict, Option<String>) {
    if let Some(verdict) = pending {
        return (verdict, Some(verdict.describe().to_owned()));
    }

    match output.termination {
        Termination::Signaled(sig) => {
            let mut msg = format!("Runtime Error: {} (signal {})", strsignal(sig), sig);
            let stderr = output.stderr.trim();
            if !stderr.is_empty() {
                msg.push('\n');
                msg.push_str(stderr);
            }
            (Verdict::RuntimeError, Some(msg))
        }
        Termination::Exited(_) | Termination::Unknown => {
            if let Some(limit) = output.stdout_truncated_at {
                let mut msg = diff(output.stdout.trim(), expected.trim());
                msg.push_str(&format!("(output exceeded {} bytes and was truncated)\n", limit));
                (Verdict::WrongAnswer, Some(msg))
            } else if outputs_match(&output.stdout, expected) {
                (Verdict::Accepted, None)
            } else {
                let mut msg = diff(output.stdout.trim(), expected.trim());
                if let Termination::Exited(code) = output.termination {
                    if code != 0 {
                        msg.push_str(&format!("(exited with code {})\n", code));
                    }
                }
                (Verdict::WrongAnswer, Some(msg))
            }
        }
    }
}

/// Package per-test outcomes into the judgement of one work item.
pub fn aggregate(correlation_id: &str, outcomes: Vec<TestOutcome>) -> Judgement {
    Judgement {
        correlation_id: correlation_id.to_owned(),
        outcomes,
    }
}
