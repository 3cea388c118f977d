/// Test Evaluator - Language-Agnostic Verdict Logic
///
/// **Core Responsibility:**
/// Turn raw process results into per-test verdicts and reduce those into a
/// submission verdict and score.
///
/// **Critical Properties:**
/// - Knows nothing about processes, toolchains or storage
/// - Pure functions: (run result, expected output) → verdict
///
/// **Classification (first match wins):**
/// 1. Runner failed to start the process → SystemError
/// 2. Timed out → TLE
/// 3. Non-blank stderr → RE
/// 4. Normalized stdout equals normalized expected → AC, otherwise WA
///
/// **Normalization Rules:**
/// - Every `\r` is removed
/// - Leading and trailing whitespace is trimmed
/// - Internal whitespace and case are preserved
///
/// **Scoring Rules:**
/// - All-or-nothing: the problem weight iff every test is AC
use crate::runner::RunResult;
use arbiter_common::types::{TestRecord, Verdict};

/// Normalize output for comparison
pub fn normalize_output(output: &str) -> String {
    output.replace('\r', "").trim().to_string()
}

/// Classify a single test run
pub fn classify(run: &RunResult, expected: &str) -> Verdict {
    if run.spawn_failed {
        Verdict::SystemError
    } else if run.timed_out {
        Verdict::TimeLimitExceeded
    } else if !run.stderr.trim().is_empty() {
        Verdict::RuntimeError
    } else if normalize_output(&run.stdout) == normalize_output(expected) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

/// Build the persisted record for one run. Captured stdout is dropped here.
pub fn record(index: u32, verdict: Verdict, run: &RunResult) -> TestRecord {
    TestRecord {
        index,
        verdict,
        runtime_ms: run.elapsed_ms,
        stderr: run.stderr.clone(),
    }
}

/// Reduce per-test verdicts into the submission verdict.
///
/// AC when every test is AC (vacuously true for no tests); otherwise the
/// first of TLE, RE, WA that occurs anywhere; otherwise SystemError.
pub fn reduce(verdicts: &[Verdict]) -> Verdict {
    if verdicts.iter().all(|v| *v == Verdict::Accepted) {
        return Verdict::Accepted;
    }
    [
        Verdict::TimeLimitExceeded,
        Verdict::RuntimeError,
        Verdict::WrongAnswer,
    ]
    .into_iter()
    .find(|candidate| verdicts.contains(candidate))
    .unwrap_or(Verdict::SystemError)
}

/// All-or-nothing score
pub fn score(verdict: Verdict, weight: u32) -> u32 {
    if verdict == Verdict::Accepted {
        weight
    } else {
        0
    }
}

pub fn max_runtime(records: &[TestRecord]) -> u64 {
    records.iter().map(|r| r.runtime_ms).max().unwrap_or(0)
}
