/// Submission Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Load a queued submission, have the engine judge it and write the single
/// terminal record followed by its Attempt.
///
/// This module is the glue layer. It knows nothing about:
/// - How code executes (engine's job)
/// - How verdicts are decided (evaluator's job)
///
/// Judging runs in its own task so that a panic inside the engine still ends
/// in a `SystemError` record rather than a submission stuck in `judging`.
use crate::engine::JudgeEngine;
use anyhow::{Context, Result};
use arbiter_common::error::StoreError;
use arbiter_common::store::RecordStore;
use arbiter_common::types::{Attempt, JudgeOutcome, Problem, Submission, Verdict};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Executor {
    store: Arc<dyn RecordStore>,
    engine: Arc<JudgeEngine>,
}

impl Executor {
    pub fn new(store: Arc<dyn RecordStore>, engine: Arc<JudgeEngine>) -> Self {
        Self { store, engine }
    }

    /// Judge one submission by id.
    ///
    /// Returns the terminal verdict written, or `None` when there was nothing
    /// to do (unknown id, already judged).
    #[tracing::instrument(skip(self), fields(submission_id = %submission_id))]
    pub async fn execute(&self, submission_id: Uuid) -> Result<Option<Verdict>> {
        let submission = match self
            .store
            .get_submission(&submission_id)
            .await
            .context("Failed to load submission")?
        {
            Some(submission) => submission,
            None => {
                warn!("Submission not found, dropping job");
                return Ok(None);
            }
        };
        if submission.status.is_terminal() {
            info!(status = %submission.status.as_str(), "Submission already judged, skipping");
            return Ok(None);
        }

        let outcome = match self.store.get_problem(&submission.problem_id).await {
            Ok(Some(problem)) => self.judge_isolated(&submission, problem).await,
            Ok(None) => JudgeOutcome::system_error(format!(
                "problem '{}' not found",
                submission.problem_id
            )),
            Err(e) => JudgeOutcome::system_error(format!("failed to load problem: {}", e)),
        };

        let finished = match self.persist(submission.finish(outcome)).await? {
            Some(finished) => finished,
            None => return Ok(None),
        };

        self.store
            .append_attempt(&Attempt::for_submission(&finished, Utc::now()))
            .await
            .context("Failed to append attempt")?;

        let verdict = finished.status.verdict();
        info!(
            verdict = ?verdict,
            score = finished.score,
            max_runtime_ms = finished.max_runtime_ms,
            "Result persisted"
        );
        Ok(verdict)
    }

    async fn judge_isolated(&self, submission: &Submission, problem: Problem) -> JudgeOutcome {
        let engine = self.engine.clone();
        let owned = submission.clone();
        let task = tokio::spawn(async move { engine.judge(&owned, &problem).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Judging task aborted");
                JudgeOutcome::system_error(format!("judging task failed: {}", e))
            }
        }
    }

    /// Terminal write. A failed write is retried once as a `SystemError`
    /// record so the store never keeps a submission in `judging`.
    async fn persist(&self, finished: Submission) -> Result<Option<Submission>> {
        match self.store.finish_submission(&finished).await {
            Ok(()) => Ok(Some(finished)),
            Err(StoreError::AlreadyTerminal(_)) => {
                warn!("Submission was finished concurrently, discarding result");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Failed to persist result");
                let fallback = finished.finish(JudgeOutcome::system_error(format!(
                    "failed to persist result: {}",
                    e
                )));
                self.store
                    .finish_submission(&fallback)
                    .await
                    .context("Failed to persist SystemError fallback")?;
                Ok(Some(fallback))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::toolchain::{CommandTemplate, LanguageConfig, ToolchainRegistry};
    use arbiter_common::fixtures::FixtureStore;
    use arbiter_common::store::MemoryStore;
    use arbiter_common::types::{SubmissionStatus, TestCase};
    use tempfile::TempDir;

    pub(crate) async fn setup() -> (TempDir, Arc<MemoryStore>, Executor) {
        let dir = tempfile::tempdir().unwrap();
        let fixtures = Arc::new(FixtureStore::new(dir.path().join("fixtures")));
        let input = fixtures.put(b"4\n").await.unwrap();
        let output = fixtures.put(b"8\n").await.unwrap();

        let store = Arc::new(MemoryStore::new());
        store
            .put_problem(&Problem {
                id: "double".to_string(),
                title: "Double It".to_string(),
                time_limit_ms: 2000,
                memory_limit_kb: 65536,
                score: 100,
                test_cases: vec![TestCase {
                    ordinal: 1,
                    input_path: input.path,
                    output_path: output.path,
                    input_name: "1.in".to_string(),
                    output_name: "1.out".to_string(),
                    input_size: input.size,
                    output_size: output.size,
                }],
            })
            .await
            .unwrap();

        let toolchains = ToolchainRegistry::from_languages(vec![LanguageConfig {
            name: "sh".to_string(),
            file_extension: "sh".to_string(),
            compile: None,
            run: CommandTemplate::new("sh", &["{source}"]),
        }])
        .unwrap();
        let engine = JudgeEngine::new(Arc::new(toolchains), fixtures, EngineSettings::default());
        let executor = Executor::new(store.clone(), Arc::new(engine));
        (dir, store, executor)
    }

    pub(crate) async fn submit(store: &MemoryStore, problem_id: &str, source: &str) -> Uuid {
        let submission = Submission::new("alice", "spring", problem_id, "sh", source, Utc::now());
        store.create_submission(&submission).await.unwrap();
        submission.id
    }

    #[tokio::test]
    async fn test_execute_writes_terminal_record_and_attempt() {
        let (_dir, store, executor) = setup().await;
        let id = submit(&store, "double", "read x\necho $((x * 2))\n").await;

        let verdict = executor.execute(id).await.unwrap();
        assert_eq!(verdict, Some(Verdict::Accepted));

        let stored = store.get_submission(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Finished(Verdict::Accepted));
        assert_eq!(stored.score, 100);
        assert_eq!(stored.report.unwrap().tests.len(), 1);

        let attempts = store.attempts("spring").await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].is_accepted);
        assert_eq!(attempts[0].submission_id, id);
    }

    #[tokio::test]
    async fn test_missing_problem_is_system_error() {
        let (_dir, store, executor) = setup().await;
        let id = submit(&store, "ghost", "echo 1\n").await;

        let verdict = executor.execute(id).await.unwrap();
        assert_eq!(verdict, Some(Verdict::SystemError));

        let stored = store.get_submission(&id).await.unwrap().unwrap();
        assert!(stored.message.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_already_judged_submission_is_skipped() {
        let (_dir, store, executor) = setup().await;
        let id = submit(&store, "double", "echo 8\n").await;

        assert_eq!(executor.execute(id).await.unwrap(), Some(Verdict::Accepted));
        assert_eq!(executor.execute(id).await.unwrap(), None);
        assert_eq!(store.attempts("spring").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_submission_is_dropped() {
        let (_dir, _store, executor) = setup().await;
        assert_eq!(executor.execute(Uuid::new_v4()).await.unwrap(), None);
    }
}
