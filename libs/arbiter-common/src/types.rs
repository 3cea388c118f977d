use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Current version of the persisted per-test result document
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Classification of a single test run or of a whole submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "SystemError")]
    SystemError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::RuntimeError => "RE",
            Verdict::CompileError => "CE",
            Verdict::SystemError => "SystemError",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a submission record.
///
/// A submission is created in `Judging` and moves exactly once into
/// `Finished`. Nothing is written to it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SubmissionStatus {
    Judging,
    Finished(Verdict),
}

impl SubmissionStatus {
    pub const JUDGING: &'static str = "judging";

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            SubmissionStatus::Judging => None,
            SubmissionStatus::Finished(v) => Some(*v),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Finished(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Judging => Self::JUDGING,
            SubmissionStatus::Finished(v) => v.as_str(),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SubmissionStatus> for String {
    fn from(status: SubmissionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<String> for SubmissionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let status = match value.as_str() {
            Self::JUDGING => SubmissionStatus::Judging,
            "AC" => SubmissionStatus::Finished(Verdict::Accepted),
            "WA" => SubmissionStatus::Finished(Verdict::WrongAnswer),
            "TLE" => SubmissionStatus::Finished(Verdict::TimeLimitExceeded),
            "RE" => SubmissionStatus::Finished(Verdict::RuntimeError),
            "CE" => SubmissionStatus::Finished(Verdict::CompileError),
            "SystemError" => SubmissionStatus::Finished(Verdict::SystemError),
            other => return Err(format!("unknown submission status: {}", other)),
        };
        Ok(status)
    }
}

/// One stored input/expected-output pair of a problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub ordinal: u32,
    pub input_path: String,
    pub output_path: String,
    #[serde(default)]
    pub input_name: String,
    #[serde(default)]
    pub output_name: String,
    #[serde(default)]
    pub input_size: u64,
    #[serde(default)]
    pub output_size: u64,
}

fn default_time_limit() -> u64 {
    2000
}

fn default_memory_limit() -> u64 {
    65536
}

fn default_score() -> u32 {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_time_limit")]
    pub time_limit_ms: u64,
    /// Informational only, never enforced
    #[serde(default = "default_memory_limit")]
    pub memory_limit_kb: u64,
    #[serde(default = "default_score")]
    pub score: u32,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Problem {
    /// Test cases in ordinal order
    pub fn ordered_test_cases(&self) -> Vec<&TestCase> {
        let mut tests: Vec<&TestCase> = self.test_cases.iter().collect();
        tests.sort_by_key(|tc| tc.ordinal);
        tests
    }

    pub fn next_ordinal(&self) -> u32 {
        self.test_cases.iter().map(|tc| tc.ordinal).max().unwrap_or(0) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Problem ids in display order
    #[serde(default)]
    pub problem_ids: Vec<String>,
}

impl Contest {
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        now >= self.start && now <= self.end
    }

    pub fn has_problem(&self, problem_id: &str) -> bool {
        self.problem_ids.iter().any(|p| p == problem_id)
    }
}

/// Persisted outcome of one test case. Captured stdout is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    /// 1-based ordinal
    pub index: u32,
    pub verdict: Verdict,
    pub runtime_ms: u64,
    #[serde(default)]
    pub stderr: String,
}

/// Versioned per-test result document stored on a submission.
/// Deserializing a report with an unknown `schema` fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTestReport")]
pub struct TestReport {
    pub schema: u32,
    pub tests: Vec<TestRecord>,
}

#[derive(Deserialize)]
struct RawTestReport {
    schema: u32,
    tests: Vec<TestRecord>,
}

impl TryFrom<RawTestReport> for TestReport {
    type Error = crate::error::StoreError;

    fn try_from(raw: RawTestReport) -> Result<Self, Self::Error> {
        if raw.schema != RESULT_SCHEMA_VERSION {
            return Err(crate::error::StoreError::Schema(raw.schema));
        }
        Ok(Self {
            schema: raw.schema,
            tests: raw.tests,
        })
    }
}

impl TestReport {
    pub fn new(tests: Vec<TestRecord>) -> Self {
        Self {
            schema: RESULT_SCHEMA_VERSION,
            tests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub contestant: String,
    pub contest_id: String,
    pub problem_id: String,
    pub language: String,
    pub source: String,
    pub status: SubmissionStatus,
    pub score: u32,
    pub max_runtime_ms: u64,
    pub report: Option<TestReport>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Fresh record in the `judging` state
    pub fn new(
        contestant: impl Into<String>,
        contest_id: impl Into<String>,
        problem_id: impl Into<String>,
        language: impl Into<String>,
        source: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contestant: contestant.into(),
            contest_id: contest_id.into(),
            problem_id: problem_id.into(),
            language: language.into(),
            source: source.into(),
            status: SubmissionStatus::Judging,
            score: 0,
            max_runtime_ms: 0,
            report: None,
            compile_output: None,
            message: None,
            created_at,
        }
    }

    pub fn is_compile_error(&self) -> bool {
        self.status.verdict() == Some(Verdict::CompileError)
    }

    /// Apply a judging outcome, producing the terminal record
    pub fn finish(mut self, outcome: JudgeOutcome) -> Self {
        self.status = SubmissionStatus::Finished(outcome.verdict);
        self.score = outcome.score;
        self.max_runtime_ms = outcome.max_runtime_ms;
        self.report = outcome.tests.map(TestReport::new);
        self.compile_output = outcome.compile_output;
        self.message = outcome.message;
        self
    }
}

/// Everything the judging engine decides about one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub verdict: Verdict,
    pub score: u32,
    pub max_runtime_ms: u64,
    pub tests: Option<Vec<TestRecord>>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
}

impl JudgeOutcome {
    pub fn compile_error(diagnostic: String) -> Self {
        Self {
            verdict: Verdict::CompileError,
            score: 0,
            max_runtime_ms: 0,
            tests: None,
            compile_output: Some(diagnostic),
            message: None,
        }
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::SystemError,
            score: 0,
            max_runtime_ms: 0,
            tests: None,
            compile_output: None,
            message: Some(message.into()),
        }
    }
}

/// Append-only audit row written after every judged submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub contest_id: String,
    pub contestant: String,
    pub problem_id: String,
    pub submission_id: Uuid,
    pub is_accepted: bool,
    pub is_compile_error: bool,
    pub created_at: DateTime<Utc>,
}

impl Attempt {
    pub fn for_submission(submission: &Submission, created_at: DateTime<Utc>) -> Self {
        let verdict = submission.status.verdict();
        Self {
            contest_id: submission.contest_id.clone(),
            contestant: submission.contestant.clone(),
            problem_id: submission.problem_id.clone(),
            submission_id: submission.id,
            is_accepted: verdict == Some(Verdict::Accepted),
            is_compile_error: verdict == Some(Verdict::CompileError),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(serde_json::to_string(&Verdict::Accepted).unwrap(), "\"AC\"");
        assert_eq!(serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(), "\"TLE\"");
        assert_eq!(serde_json::to_string(&Verdict::SystemError).unwrap(), "\"SystemError\"");
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        let judging = serde_json::to_string(&SubmissionStatus::Judging).unwrap();
        assert_eq!(judging, "\"judging\"");

        let wa: SubmissionStatus = serde_json::from_str("\"WA\"").unwrap();
        assert_eq!(wa, SubmissionStatus::Finished(Verdict::WrongAnswer));

        assert!(serde_json::from_str::<SubmissionStatus>("\"pending\"").is_err());
    }

    #[test]
    fn test_record_uses_camel_case_and_no_stdout() {
        let record = TestRecord {
            index: 1,
            verdict: Verdict::RuntimeError,
            runtime_ms: 12,
            stderr: "boom".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["index"], 1);
        assert_eq!(value["verdict"], "RE");
        assert_eq!(value["runtimeMs"], 12);
        assert!(value.get("stdout").is_none());
    }

    #[test]
    fn test_report_rejects_unknown_schema() {
        let ok: TestReport = serde_json::from_str(r#"{"schema":1,"tests":[]}"#).unwrap();
        assert!(ok.tests.is_empty());
        let err = serde_json::from_str::<TestReport>(r#"{"schema":7,"tests":[]}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported result schema version 7"));
    }

    #[test]
    fn test_submission_with_unknown_report_schema_fails_to_load() {
        let outcome = JudgeOutcome {
            verdict: Verdict::Accepted,
            score: 100,
            max_runtime_ms: 5,
            tests: Some(vec![TestRecord {
                index: 1,
                verdict: Verdict::Accepted,
                runtime_ms: 5,
                stderr: String::new(),
            }]),
            compile_output: None,
            message: None,
        };
        let done = Submission::new("alice", "c1", "A", "cpp", "int main(){}", Utc::now()).finish(outcome);

        let mut value = serde_json::to_value(&done).unwrap();
        let reloaded: Submission = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(reloaded, done);

        value["report"]["schema"] = serde_json::json!(99);
        assert!(serde_json::from_value::<Submission>(value).is_err());
    }

    #[test]
    fn test_problem_defaults_and_ordering() {
        let problem: Problem = serde_json::from_str(
            r#"{"id":"A","test_cases":[
                {"ordinal":2,"input_path":"b","output_path":"b"},
                {"ordinal":1,"input_path":"a","output_path":"a"}]}"#,
        )
        .unwrap();
        assert_eq!(problem.time_limit_ms, 2000);
        assert_eq!(problem.score, 100);
        let ordinals: Vec<u32> = problem.ordered_test_cases().iter().map(|t| t.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(problem.next_ordinal(), 3);
    }

    #[test]
    fn test_finish_sets_terminal_fields() {
        let sub = Submission::new("alice", "c1", "A", "cpp", "int main(){}", Utc::now());
        let done = sub.finish(JudgeOutcome::compile_error("error: expected ';'".to_string()));
        assert_eq!(done.status, SubmissionStatus::Finished(Verdict::CompileError));
        assert!(done.is_compile_error());
        assert!(done.report.is_none());
        assert_eq!(done.compile_output.as_deref(), Some("error: expected ';'"));

        let attempt = Attempt::for_submission(&done, Utc::now());
        assert!(attempt.is_compile_error);
        assert!(!attempt.is_accepted);
    }
}
