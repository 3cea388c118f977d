/// Judging Engine - One Submission, One Outcome
///
/// **Core Responsibility:**
/// Drive a submission from `judging` to a terminal verdict: prepare a
/// workspace, compile when the language needs it, run every test case in
/// ordinal order and reduce the per-test verdicts.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to judge (workspaces, toolchains, the runner)
/// - Engine does NOT persist anything; the executor owns the terminal write
/// - Verdict rules live in the evaluator
///
/// **State Machine:**
/// `Prepare → Compile? → Run(0..n) → Reduce → Done`
///
/// Every transition is a fallible `advance`; the driver turns any error into
/// a `SystemError` outcome so no path can leave a submission unresolved.
use crate::evaluator;
use crate::runner::{self, RunResult};
use crate::toolchain::{LanguageConfig, Toolchain, ToolchainRegistry, ARTIFACT_NAME};
use anyhow::{Context, Result};
use arbiter_common::fixtures::FixtureStore;
use arbiter_common::types::{JudgeOutcome, Problem, Submission, TestRecord, Verdict};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub compile_timeout_ms: u64,
    pub work_root: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            compile_timeout_ms: 20_000,
            work_root: None,
        }
    }
}

/// Scratch directory holding the source file and compiled artifact.
/// Removed when dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    source: PathBuf,
    artifact: PathBuf,
}

impl Workspace {
    fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[derive(Debug)]
enum Phase {
    Prepare,
    Compile(Workspace),
    Run {
        workspace: Workspace,
        next: usize,
        records: Vec<TestRecord>,
    },
    Reduce(Vec<TestRecord>),
    Done(JudgeOutcome),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Compile(_) => "compile",
            Phase::Run { .. } => "run",
            Phase::Reduce(_) => "reduce",
            Phase::Done(_) => "done",
        }
    }
}

pub struct JudgeEngine {
    toolchains: Arc<ToolchainRegistry>,
    fixtures: Arc<FixtureStore>,
    settings: EngineSettings,
}

impl JudgeEngine {
    pub fn new(
        toolchains: Arc<ToolchainRegistry>,
        fixtures: Arc<FixtureStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            toolchains,
            fixtures,
            settings,
        }
    }

    /// Judge a submission against a problem. Never fails: faults become
    /// `SystemError` outcomes carrying the fault description.
    #[tracing::instrument(
        skip(self, submission, problem),
        fields(submission_id = %submission.id, language = %submission.language, problem_id = %problem.id)
    )]
    pub async fn judge(&self, submission: &Submission, problem: &Problem) -> JudgeOutcome {
        let toolchain = match self.toolchains.get(&submission.language) {
            Ok(toolchain) => toolchain,
            Err(e) => {
                warn!(error = %e, "Refusing to judge");
                return JudgeOutcome::system_error(e.to_string());
            }
        };

        let mut phase = Phase::Prepare;
        loop {
            if let Phase::Done(outcome) = phase {
                info!(
                    verdict = %outcome.verdict,
                    score = outcome.score,
                    max_runtime_ms = outcome.max_runtime_ms,
                    "Judging finished"
                );
                return outcome;
            }
            let from = phase.name();
            phase = match self.advance(phase, toolchain, submission, problem).await {
                Ok(next) => next,
                Err(e) => {
                    warn!(phase = from, error = %format!("{:#}", e), "Judging fault");
                    Phase::Done(JudgeOutcome::system_error(format!("{:#}", e)))
                }
            };
        }
    }

    async fn advance(
        &self,
        phase: Phase,
        toolchain: &LanguageConfig,
        submission: &Submission,
        problem: &Problem,
    ) -> Result<Phase> {
        match phase {
            Phase::Prepare => {
                let workspace = self.prepare(toolchain, &submission.source).await?;
                if toolchain.needs_compile() {
                    Ok(Phase::Compile(workspace))
                } else {
                    Ok(Phase::Run {
                        workspace,
                        next: 0,
                        records: Vec::new(),
                    })
                }
            }
            Phase::Compile(workspace) => self.compile(toolchain, workspace).await,
            Phase::Run {
                workspace,
                next,
                records,
            } => self.run_next(toolchain, problem, workspace, next, records).await,
            Phase::Reduce(records) => Ok(Phase::Done(Self::reduce(problem, records))),
            done @ Phase::Done(_) => Ok(done),
        }
    }

    async fn prepare(&self, toolchain: &LanguageConfig, source: &str) -> Result<Workspace> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("arbiter-");
        let dir = match &self.settings.work_root {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .with_context(|| format!("Failed to create work root {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create workspace")?;

        let source_path = dir.path().join(toolchain.source_file_name());
        tokio::fs::write(&source_path, source)
            .await
            .context("Failed to write source file")?;
        let artifact = dir.path().join(ARTIFACT_NAME);

        debug!(workspace = %dir.path().display(), "Workspace ready");
        Ok(Workspace {
            dir,
            source: source_path,
            artifact,
        })
    }

    async fn compile(&self, toolchain: &LanguageConfig, workspace: Workspace) -> Result<Phase> {
        if let Some(command) = toolchain.compile_command(&workspace.source, &workspace.artifact) {
            let result = runner::run(
                &command,
                b"",
                self.settings.compile_timeout_ms,
                Some(workspace.path()),
            )
            .await;

            if let Some(outcome) = self.compile_outcome(&result) {
                return Ok(Phase::Done(outcome));
            }
            debug!(elapsed_ms = result.elapsed_ms, "Compilation succeeded");
        }

        Ok(Phase::Run {
            workspace,
            next: 0,
            records: Vec::new(),
        })
    }

    /// Terminal outcome for a failed compile, `None` when the run may proceed
    fn compile_outcome(&self, result: &RunResult) -> Option<JudgeOutcome> {
        if result.spawn_failed {
            return Some(JudgeOutcome::system_error(format!(
                "compiler unavailable: {}",
                result.stderr.trim()
            )));
        }
        if result.timed_out {
            info!(timeout_ms = self.settings.compile_timeout_ms, "Compilation timed out");
            return Some(JudgeOutcome::compile_error(format!(
                "compilation timed out after {} ms",
                self.settings.compile_timeout_ms
            )));
        }
        if result.exit_code != Some(0) {
            info!(exit_code = ?result.exit_code, "Compilation failed");
            return Some(JudgeOutcome::compile_error(format!(
                "{}\n{}",
                result.stdout, result.stderr
            )));
        }
        None
    }

    async fn run_next(
        &self,
        toolchain: &LanguageConfig,
        problem: &Problem,
        workspace: Workspace,
        next: usize,
        mut records: Vec<TestRecord>,
    ) -> Result<Phase> {
        let tests = problem.ordered_test_cases();
        let Some(test) = tests.get(next) else {
            return Ok(Phase::Reduce(records));
        };

        let input = self.fixtures.read_or_empty(&test.input_path).await;
        let expected = self.fixtures.read_or_empty(&test.output_path).await;
        let command = toolchain.run_command(&workspace.source, &workspace.artifact);

        let result = runner::run(&command, &input, problem.time_limit_ms, Some(workspace.path())).await;
        let verdict = evaluator::classify(&result, &String::from_utf8_lossy(&expected));
        let index = next as u32 + 1;

        debug!(
            test = index,
            ordinal = test.ordinal,
            verdict = %verdict,
            elapsed_ms = result.elapsed_ms,
            "Test finished"
        );
        records.push(evaluator::record(index, verdict, &result));

        Ok(Phase::Run {
            workspace,
            next: next + 1,
            records,
        })
    }

    fn reduce(problem: &Problem, records: Vec<TestRecord>) -> JudgeOutcome {
        let verdicts: Vec<Verdict> = records.iter().map(|r| r.verdict).collect();
        let verdict = evaluator::reduce(&verdicts);
        let message = (verdict == Verdict::SystemError)
            .then(|| "a test could not be executed".to_string());
        JudgeOutcome {
            verdict,
            score: evaluator::score(verdict, problem.score),
            max_runtime_ms: evaluator::max_runtime(&records),
            tests: Some(records),
            compile_output: None,
            message,
        }
    }
}
