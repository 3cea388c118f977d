/// Scoreboard Aggregator - Contest Standings
///
/// **Core Responsibility:**
/// Reduce the submissions of one contest into ranked per-contestant rows.
///
/// **Rules:**
/// - Submissions are scanned per (contestant, problem) in creation order
/// - Compile errors never count as a try and never stop the scan, but they do
///   mark the cell as tried
/// - Submissions still `judging` are treated as if they did not exist
/// - The scan stops at the first AC; every counted submission before it is a wrong try
/// - Penalty = whole seconds from contest start to that AC + 5 minutes per wrong try
/// - Ranking: score descending, then penalty ascending, stable otherwise
///
/// Rows are derived on every read and never stored.
use crate::error::StoreError;
use crate::store::RecordStore;
use crate::types::{Contest, Problem, Submission, SubmissionStatus, Verdict};
use serde::Serialize;
use tracing::warn;

/// Seconds added for each non-CE submission before the first AC
pub const WRONG_TRY_PENALTY_SECONDS: u64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    NoSubmit,
    TriedNoAc,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreboardCell {
    pub problem_id: String,
    pub status: CellStatus,
    pub score: u32,
    /// Wrong tries before AC when solved, total counted tries otherwise
    pub tries: u32,
    pub penalty_seconds: u64,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreboardRow {
    pub rank: usize,
    pub contestant: String,
    pub total_score: u32,
    pub total_penalty_seconds: u64,
    pub penalty_display: String,
    pub cells: Vec<ScoreboardCell>,
}

/// Render seconds as `MM:SS`; minutes keep growing past 59
pub fn format_penalty(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn seconds_since_start(contest: &Contest, submission: &Submission) -> u64 {
    let elapsed_ms = (submission.created_at - contest.start).num_milliseconds();
    elapsed_ms.div_euclid(1000).max(0) as u64
}

fn compute_cell(contest: &Contest, problem: &Problem, history: &[&Submission]) -> ScoreboardCell {
    let mut tries_before_ac = 0u32;
    let mut first_ac = None;
    let mut submitted = false;

    for submission in history {
        if submission.status.is_terminal() {
            submitted = true;
        }
        match submission.status {
            SubmissionStatus::Judging => continue,
            SubmissionStatus::Finished(Verdict::CompileError) => continue,
            SubmissionStatus::Finished(Verdict::Accepted) => {
                first_ac = Some(*submission);
                break;
            }
            SubmissionStatus::Finished(_) => tries_before_ac += 1,
        }
    }

    match first_ac {
        Some(ac) => {
            let penalty_seconds = seconds_since_start(contest, ac)
                + u64::from(tries_before_ac) * WRONG_TRY_PENALTY_SECONDS;
            let display = if tries_before_ac > 0 {
                format!("{} ({})", problem.score, tries_before_ac)
            } else {
                problem.score.to_string()
            };
            ScoreboardCell {
                problem_id: problem.id.clone(),
                status: CellStatus::Accepted,
                score: problem.score,
                tries: tries_before_ac,
                penalty_seconds,
                display,
            }
        }
        // Without an AC the scan saw every counted submission
        None if submitted => ScoreboardCell {
            problem_id: problem.id.clone(),
            status: CellStatus::TriedNoAc,
            score: 0,
            tries: tries_before_ac,
            penalty_seconds: 0,
            display: format!("({})", tries_before_ac),
        },
        None => ScoreboardCell {
            problem_id: problem.id.clone(),
            status: CellStatus::NoSubmit,
            score: 0,
            tries: 0,
            penalty_seconds: 0,
            display: "-".to_string(),
        },
    }
}

/// Candidate contestants: registrations, or everyone who submitted when
/// nobody registered (in order of first submission)
fn candidates(registrations: &[String], submissions: &[&Submission]) -> Vec<String> {
    if !registrations.is_empty() {
        return registrations.to_vec();
    }
    let mut seen: Vec<String> = Vec::new();
    for submission in submissions {
        if !seen.contains(&submission.contestant) {
            seen.push(submission.contestant.clone());
        }
    }
    seen
}

/// Pure standings computation over already-loaded records.
///
/// `problems` should follow the contest's display order; submissions from
/// other contests are ignored.
pub fn compute(
    contest: &Contest,
    problems: &[Problem],
    registrations: &[String],
    submissions: &[Submission],
) -> Vec<ScoreboardRow> {
    let mut ordered: Vec<&Submission> = submissions
        .iter()
        .filter(|s| s.contest_id == contest.id)
        .collect();
    ordered.sort_by_key(|s| s.created_at);

    let mut rows: Vec<ScoreboardRow> = candidates(registrations, &ordered)
        .into_iter()
        .map(|contestant| {
            let cells: Vec<ScoreboardCell> = problems
                .iter()
                .map(|problem| {
                    let history: Vec<&Submission> = ordered
                        .iter()
                        .copied()
                        .filter(|s| s.contestant == contestant && s.problem_id == problem.id)
                        .collect();
                    compute_cell(contest, problem, &history)
                })
                .collect();

            let total_score = cells.iter().map(|c| c.score).sum();
            let total_penalty_seconds = cells
                .iter()
                .filter(|c| c.status == CellStatus::Accepted)
                .map(|c| c.penalty_seconds)
                .sum();

            ScoreboardRow {
                rank: 0,
                contestant,
                total_score,
                total_penalty_seconds,
                penalty_display: format_penalty(total_penalty_seconds),
                cells,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.total_penalty_seconds.cmp(&b.total_penalty_seconds))
    });

    // Exact ties share a rank
    for i in 0..rows.len() {
        rows[i].rank = if i > 0
            && rows[i].total_score == rows[i - 1].total_score
            && rows[i].total_penalty_seconds == rows[i - 1].total_penalty_seconds
        {
            rows[i - 1].rank
        } else {
            i + 1
        };
    }

    rows
}

/// Load a contest's records and compute its standings.
///
/// Returns `None` when the contest does not exist.
pub async fn compute_for(
    store: &dyn RecordStore,
    contest_id: &str,
) -> Result<Option<Vec<ScoreboardRow>>, StoreError> {
    let Some(contest) = store.get_contest(contest_id).await? else {
        return Ok(None);
    };

    let mut problems = Vec::with_capacity(contest.problem_ids.len());
    for problem_id in &contest.problem_ids {
        match store.get_problem(problem_id).await? {
            Some(problem) => problems.push(problem),
            None => warn!(contest_id, problem_id = %problem_id, "Contest references missing problem"),
        }
    }

    let registrations = store.registrations(contest_id).await?;
    let submissions = store.contest_submissions(contest_id).await?;

    Ok(Some(compute(&contest, &problems, &registrations, &submissions)))
}
