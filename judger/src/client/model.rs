use serde::{Deserialize, Serialize};

/// One judging request, as delivered by the intake layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Opaque id linking this item to its judgement in the result store.
    #[serde(alias = "commit_id", alias = "correlation_id")]
    pub correlation_id: String,
    pub code: String,
    pub language: String,
    /// Wall-clock limit of EACH test case, in milliseconds.
    #[serde(alias = "time_limit", alias = "time_limit_ms")]
    pub time_limit_ms: u64,
    /// Resident memory limit of EACH test case, in megabytes.
    #[serde(alias = "memory_limit", alias = "memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(alias = "test_cases", default)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    #[serde(alias = "output", alias = "expected_output")]
    pub expected_output: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    CompilationError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    InternalError,
}

impl Verdict {
    /// Human-readable name, also used as diagnostic text for kills.
    pub fn describe(self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::CompilationError => "Compilation Error",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::InternalError => "Internal Error",
        }
    }
}

/// The result of running a single test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub input: String,
    pub expected_output: String,
    pub observed_output: Option<String>,
    pub verdict: Verdict,
    pub diagnostic: Option<String>,

    /// Wall time from spawn to exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    /// Peak sampled resident set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
}

impl TestOutcome {
    /// An outcome not tied to any test case, used when the whole item fails.
    pub fn detached(verdict: Verdict, diagnostic: String) -> TestOutcome {
        TestOutcome {
            input: String::new(),
            expected_output: String::new(),
            observed_output: None,
            verdict,
            diagnostic: Some(diagnostic),
            time_ms: None,
            memory_kb: None,
        }
    }

    pub fn internal_error(case: &TestCase, diagnostic: String) -> TestOutcome {
        TestOutcome {
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            observed_output: None,
            verdict: Verdict::InternalError,
            diagnostic: Some(diagnostic),
            time_ms: None,
            memory_kb: None,
        }
    }
}

/// The complete set of per-test verdicts for one work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Judgement {
    pub correlation_id: String,
    pub outcomes: Vec<TestOutcome>,
}

impl Judgement {
    pub fn compile_error(correlation_id: &str, diagnostic: String) -> Judgement {
        Judgement {
            correlation_id: correlation_id.to_owned(),
            outcomes: vec![TestOutcome::detached(Verdict::CompilationError, diagnostic)],
        }
    }

    pub fn internal_error(correlation_id: &str, diagnostic: String) -> Judgement {
        Judgement {
            correlation_id: correlation_id.to_owned(),
            outcomes: vec![TestOutcome::detached(Verdict::InternalError, diagnostic)],
        }
    }

    pub fn verdicts(&self) -> Vec<Verdict> {
        self.outcomes.iter().map(|o| o.verdict).collect()
    }

    /// Whether every outcome was accepted. Not stored, always derived.
    pub fn all_accepted(&self) -> bool {
        self.outcomes.iter().all(|o| o.verdict == Verdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pretty_eq;

    #[test]
    fn accepts_legacy_queue_message() {
        let msg = r#"{
            "code": "int main() {}",
            "time_limit": 2000,
            "memory_limit": 50,
            "test_cases": [{ "input": "1\n2\n", "output": "3\n" }],
            "language": "c",
            "commit_id": "8f2a9c41d0e3b7a6"
        }"#;
        let item: WorkItem = serde_json::from_str(msg).unwrap();
        pretty_eq!(
            item,
            WorkItem {
                correlation_id: "8f2a9c41d0e3b7a6".into(),
                code: "int main() {}".into(),
                language: "c".into(),
                time_limit_ms: 2000,
                memory_limit_mb: 50,
                test_cases: vec![TestCase {
                    input: "1\n2\n".into(),
                    expected_output: "3\n".into(),
                }],
            }
        );
    }

    #[test]
    fn verdicts_use_closed_names() {
        let s = serde_json::to_string(&Verdict::MemoryLimitExceeded).unwrap();
        assert_eq!(s, r#""MEMORY_LIMIT_EXCEEDED""#);
        let v: Verdict = serde_json::from_str(r#""WRONG_ANSWER""#).unwrap();
        assert_eq!(v, Verdict::WrongAnswer);
    }

    #[test]
    fn usage_fields_are_omitted_when_absent() {
        let j = Judgement::compile_error("x", "main.c:1: error".into());
        let v = serde_json::to_value(&j).unwrap();
        let outcome = &v["outcomes"][0];
        assert_eq!(outcome["verdict"], "COMPILATION_ERROR");
        assert!(outcome.get("timeMs").is_none());
        assert!(outcome["observedOutput"].is_null());
        assert!(!j.all_accepted());
    }
}
