/// End-to-end judging tests
///
/// These tests drive the engine through real processes:
/// 1. Interpreted and compiled paths both reach AC
/// 2. Each contestant verdict (WA, TLE, RE, CE) is produced by the right program
/// 3. Infrastructure faults become SystemError
/// 4. Reduction picks TLE over an earlier WA
/// 5. Workspaces are removed afterwards
///
/// Languages are small `sh` wrappers so no compiler is required.

#[cfg(test)]
mod judging_tests {
    use crate::engine::{EngineSettings, JudgeEngine};
    use crate::toolchain::{CommandTemplate, LanguageConfig, ToolchainRegistry};
    use arbiter_common::fixtures::FixtureStore;
    use arbiter_common::types::{Problem, Submission, TestCase, Verdict};
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// `compile` and `run` are a program followed by its argument templates
    fn language(name: &str, compile: Option<&[&str]>, run: &[&str]) -> LanguageConfig {
        let template = |parts: &[&str]| CommandTemplate::new(parts[0], &parts[1..]);
        LanguageConfig {
            name: name.to_string(),
            file_extension: "sh".to_string(),
            compile: compile.map(template),
            run: template(run),
        }
    }

    fn test_languages() -> ToolchainRegistry {
        ToolchainRegistry::from_languages(vec![
            language("sh", None, &["sh", "{source}"]),
            language("shc", Some(&["cp", "{source}", "{artifact}"]), &["sh", "{artifact}"]),
            language(
                "broken",
                Some(&["sh", "-c", "echo 'main.sh:1: syntax error' >&2; exit 1"]),
                &["sh", "{artifact}"],
            ),
            language("slow-compiler", Some(&["sleep", "5"]), &["sh", "{artifact}"]),
            language("no-compiler", Some(&["/nonexistent/cc", "{source}"]), &["sh", "{artifact}"]),
            language("no-interpreter", None, &["/nonexistent/interp", "{source}"]),
        ])
        .unwrap()
    }

    struct Harness {
        dir: TempDir,
        fixtures: Arc<FixtureStore>,
        engine: JudgeEngine,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let fixtures = Arc::new(FixtureStore::new(dir.path().join("fixtures")));
        let engine = JudgeEngine::new(
            Arc::new(test_languages()),
            fixtures.clone(),
            EngineSettings {
                compile_timeout_ms: 300,
                work_root: Some(dir.path().join("work")),
            },
        );
        Harness { dir, fixtures, engine }
    }

    /// Store (input, expected) pairs and build a problem over them
    async fn problem(h: &Harness, cases: &[(&str, &str)], time_limit_ms: u64) -> Problem {
        let mut problem = Problem {
            id: "double".to_string(),
            title: "Double It".to_string(),
            time_limit_ms,
            memory_limit_kb: 65536,
            score: 100,
            test_cases: Vec::new(),
        };
        for (input, expected) in cases {
            let input = h.fixtures.put(input.as_bytes()).await.unwrap();
            let output = h.fixtures.put(expected.as_bytes()).await.unwrap();
            let ordinal = problem.next_ordinal();
            problem.test_cases.push(TestCase {
                ordinal,
                input_path: input.path,
                output_path: output.path,
                input_name: format!("{}.in", ordinal),
                output_name: format!("{}.out", ordinal),
                input_size: input.size,
                output_size: output.size,
            });
        }
        problem
    }

    fn submission(language: &str, source: &str) -> Submission {
        Submission::new("alice", "spring", "double", language, source, Utc::now())
    }

    const DOUBLE: &str = "read x\necho $((x * 2))\n";

    #[tokio::test]
    async fn test_interpreted_submission_accepted() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n"), ("21\n", "42\r\n")], 2000).await;

        let outcome = h.engine.judge(&submission("sh", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::Accepted);
        assert_eq!(outcome.score, 100);
        let tests = outcome.tests.unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].index, 1);
        assert_eq!(tests[1].index, 2);
        assert!(tests.iter().all(|t| t.verdict == Verdict::Accepted));
        assert!(outcome.compile_output.is_none());
    }

    #[tokio::test]
    async fn test_compiled_submission_runs_artifact() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("shc", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::Accepted);
        assert_eq!(outcome.score, 100);
    }

    #[tokio::test]
    async fn test_wrong_answer() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("sh", "echo 11\n"), &problem).await;

        assert_eq!(outcome.verdict, Verdict::WrongAnswer);
        assert_eq!(outcome.score, 0);
    }

    #[tokio::test]
    async fn test_time_limit_exceeded() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 300).await;

        let outcome = h.engine.judge(&submission("sh", "sleep 2\n"), &problem).await;

        assert_eq!(outcome.verdict, Verdict::TimeLimitExceeded);
        assert!(outcome.max_runtime_ms >= 300);
    }

    #[tokio::test]
    async fn test_runtime_error_keeps_stderr() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h
            .engine
            .judge(&submission("sh", "echo 10\necho 'division by zero' >&2\n"), &problem)
            .await;

        assert_eq!(outcome.verdict, Verdict::RuntimeError);
        let tests = outcome.tests.unwrap();
        assert!(tests[0].stderr.contains("division by zero"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_is_judged_on_output() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("sh", "echo 10\nexit 3\n"), &problem).await;

        assert_eq!(outcome.verdict, Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_later_timeout_beats_earlier_wrong_answer() {
        let h = harness();
        let problem = problem(&h, &[("1\n", "2\n"), ("2\n", "4\n")], 300).await;
        let source = "read x\nif [ \"$x\" = \"2\" ]; then sleep 2; else echo wrong; fi\n";

        let outcome = h.engine.judge(&submission("sh", source), &problem).await;

        let tests = outcome.tests.clone().unwrap();
        assert_eq!(tests[0].verdict, Verdict::WrongAnswer);
        assert_eq!(tests[1].verdict, Verdict::TimeLimitExceeded);
        assert_eq!(outcome.verdict, Verdict::TimeLimitExceeded);
    }

    #[tokio::test]
    async fn test_tests_run_in_ordinal_order() {
        let h = harness();
        let mut problem = problem(&h, &[("1\n", "2\n"), ("3\n", "999\n")], 2000).await;
        problem.test_cases.reverse();

        let outcome = h.engine.judge(&submission("sh", DOUBLE), &problem).await;

        let tests = outcome.tests.unwrap();
        assert_eq!(tests[0].verdict, Verdict::Accepted);
        assert_eq!(tests[1].verdict, Verdict::WrongAnswer);
    }

    #[tokio::test]
    async fn test_compile_error_keeps_diagnostic_and_skips_tests() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("broken", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::CompileError);
        assert_eq!(outcome.score, 0);
        assert!(outcome.tests.is_none());
        assert!(outcome.compile_output.unwrap().contains("syntax error"));
    }

    #[tokio::test]
    async fn test_compile_timeout_is_compile_error() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("slow-compiler", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::CompileError);
        assert!(outcome.compile_output.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_compiler_is_system_error() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("no-compiler", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::SystemError);
        assert!(outcome.message.unwrap().contains("compiler unavailable"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_system_error() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("no-interpreter", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::SystemError);
        assert_eq!(outcome.tests.unwrap()[0].verdict, Verdict::SystemError);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_system_error() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        let outcome = h.engine.judge(&submission("cobol", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::SystemError);
        assert!(outcome.message.unwrap().contains("unsupported language"));
        assert!(outcome.tests.is_none());
    }

    #[tokio::test]
    async fn test_zero_test_cases_is_accepted() {
        let h = harness();
        let problem = problem(&h, &[], 2000).await;

        let outcome = h.engine.judge(&submission("shc", DOUBLE), &problem).await;

        assert_eq!(outcome.verdict, Verdict::Accepted);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.max_runtime_ms, 0);
        assert!(outcome.tests.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_fixture_reads_as_empty() {
        let h = harness();
        let mut problem = problem(&h, &[], 2000).await;
        problem.test_cases.push(TestCase {
            ordinal: 1,
            input_path: "00/missing-input".to_string(),
            output_path: "00/missing-output".to_string(),
            input_name: "1.in".to_string(),
            output_name: "1.out".to_string(),
            input_size: 0,
            output_size: 0,
        });

        let outcome = h.engine.judge(&submission("sh", "cat\n"), &problem).await;

        assert_eq!(outcome.verdict, Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_workspace_is_removed() {
        let h = harness();
        let problem = problem(&h, &[("5\n", "10\n")], 2000).await;

        h.engine.judge(&submission("shc", DOUBLE), &problem).await;

        let work = h.dir.path().join("work");
        let leftovers = std::fs::read_dir(&work).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
