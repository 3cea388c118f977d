// HTTP route handlers for the Arbiter API

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use arbiter_common::error::StoreError;
use arbiter_common::scoreboard;
use arbiter_common::types::{JudgeOutcome, Submission, TestRecord, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Safety limit to keep pathological sources out of the store
const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Most rows a submissions listing returns
pub const SUBMISSION_LIST_LIMIT: usize = 200;

/// What non-admins see instead of a system error's real cause
pub const GENERIC_SYSTEM_ERROR: &str = "The judge hit an internal error. Please contact the organizers.";

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub contestant: String,
    pub language: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: String,
}

/// Filters for GET /contests/{cid}/submissions
#[derive(Debug, Default, Deserialize)]
pub struct SubmissionListQuery {
    pub problem: Option<String>,
    /// Required for non-admins, who only ever see their own submissions
    pub contestant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub contestant: String,
}

#[derive(Debug, Serialize)]
pub struct TestView {
    pub index: u32,
    pub verdict: Verdict,
    pub runtime_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// Submission as returned by GET /submissions/{id}
#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub id: Uuid,
    pub contestant: String,
    pub contest_id: String,
    pub problem_id: String,
    pub language: String,
    pub status: String,
    pub score: u32,
    pub max_runtime_ms: u64,
    pub tests: Vec<TestView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionView {
    /// Per-test stderr, source and system error causes are admin-only
    pub fn new(submission: &Submission, admin: bool) -> Self {
        let tests = submission
            .report
            .as_ref()
            .map(|report| report.tests.iter().map(|t| test_view(t, admin)).collect())
            .unwrap_or_default();

        let message = match submission.status.verdict() {
            Some(Verdict::SystemError) if !admin => Some(GENERIC_SYSTEM_ERROR.to_string()),
            _ => submission.message.clone(),
        };

        Self {
            id: submission.id,
            contestant: submission.contestant.clone(),
            contest_id: submission.contest_id.clone(),
            problem_id: submission.problem_id.clone(),
            language: submission.language.clone(),
            status: submission.status.as_str().to_string(),
            score: submission.score,
            max_runtime_ms: submission.max_runtime_ms,
            tests,
            compile_output: submission.compile_output.clone(),
            message,
            source: admin.then(|| submission.source.clone()),
            created_at: submission.created_at,
        }
    }
}

fn test_view(record: &TestRecord, admin: bool) -> TestView {
    TestView {
        index: record.index,
        verdict: record.verdict,
        runtime_ms: record.runtime_ms,
        stderr: admin.then(|| record.stderr.clone()),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn store_failure(context: &str, e: StoreError) -> Response {
    error!(error = %e, "{}", context);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
}

/// Bearer token check against ADMIN_TOKEN. No token configured means no admins.
pub fn is_admin(headers: &HeaderMap, admin_token: Option<&str>) -> bool {
    let Some(expected) = admin_token.filter(|t| !t.is_empty()) else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim() == expected)
        .unwrap_or(false)
}

/// POST /contests/:contest_id/problems/:problem_id/submissions
pub async fn submit_solution(
    State(state): State<Arc<AppState>>,
    Path((contest_id, problem_id)): Path<(String, String)>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    if payload.contestant.trim().is_empty() || payload.language.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "contestant and language are required");
    }
    if payload.source.len() > MAX_SOURCE_BYTES {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "source exceeds 1 MiB");
    }

    let contest = match state.store.get_contest(&contest_id).await {
        Ok(Some(contest)) => contest,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "contest not found"),
        Err(e) => return store_failure("Failed to load contest", e),
    };
    if !contest.has_problem(&problem_id) {
        return error_response(StatusCode::NOT_FOUND, "problem not found in contest");
    }
    match state.store.get_problem(&problem_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "problem not found"),
        Err(e) => return store_failure("Failed to load problem", e),
    }

    let now = Utc::now();
    if !contest.is_running(now) {
        metrics::SUBMISSIONS_REJECTED.with_label_values(&["not_running"]).inc();
        return error_response(StatusCode::CONFLICT, "contest is not running");
    }

    // Refuse before creating the record so a full queue leaves nothing behind
    match state.queue.depth().await {
        Ok(depth) if depth >= state.max_queue_depth => {
            warn!(depth, "Judge queue full, refusing submission");
            metrics::SUBMISSIONS_REJECTED.with_label_values(&["queue_full"]).inc();
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "judge queue is full, retry later");
        }
        Ok(_) => {}
        Err(e) => return store_failure("Failed to read queue depth", e),
    }

    let submission = Submission::new(
        payload.contestant.trim(),
        contest_id.as_str(),
        problem_id.as_str(),
        payload.language.trim(),
        payload.source,
        now,
    );
    if let Err(e) = state.store.create_submission(&submission).await {
        return store_failure("Failed to create submission", e);
    }

    if let Err(e) = state.queue.push(submission.id, state.max_queue_depth).await {
        // The record exists already; close it instead of leaving it in `judging`
        let full = matches!(e, StoreError::QueueFull(_));
        error!(submission_id = %submission.id, error = %e, "Failed to queue submission");
        let closed = submission
            .clone()
            .finish(JudgeOutcome::system_error(format!("failed to queue submission: {}", e)));
        if let Err(e) = state.store.finish_submission(&closed).await {
            error!(submission_id = %submission.id, error = %e, "Failed to close unqueued submission");
        }
        if full {
            metrics::SUBMISSIONS_REJECTED.with_label_values(&["queue_full"]).inc();
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "judge queue is full, retry later");
        }
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to queue submission");
    }

    metrics::SUBMISSIONS_RECEIVED
        .with_label_values(&[submission.language.as_str()])
        .inc();
    info!(
        submission_id = %submission.id,
        contest_id = %contest_id,
        problem_id = %problem_id,
        language = %submission.language,
        source_size = submission.source.len(),
        "Submission queued"
    );

    (
        StatusCode::CREATED,
        Json(SubmitResponse {
            submission_id: submission.id.to_string(),
        }),
    )
        .into_response()
}

/// GET /submissions/:submission_id
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let id = match Uuid::parse_str(&submission_id) {
        Ok(id) => id,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid submission ID format"),
    };

    match state.store.get_submission(&id).await {
        Ok(Some(submission)) => {
            let admin = is_admin(&headers, state.admin_token.as_deref());
            (StatusCode::OK, Json(SubmissionView::new(&submission, admin))).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "submission not found"),
        Err(e) => store_failure("Failed to load submission", e),
    }
}

/// GET /contests/:contest_id/submissions - newest first
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    Query(query): Query<SubmissionListQuery>,
    headers: HeaderMap,
) -> Response {
    let admin = is_admin(&headers, state.admin_token.as_deref());
    let contestant = query.contestant.as_deref().map(str::trim).filter(|c| !c.is_empty());
    if !admin && contestant.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "contestant is required");
    }

    match state.store.get_contest(&contest_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "contest not found"),
        Err(e) => return store_failure("Failed to load contest", e),
    }

    let mut submissions = match state.store.contest_submissions(&contest_id).await {
        Ok(submissions) => submissions,
        Err(e) => return store_failure("Failed to list submissions", e),
    };
    submissions.retain(|s| {
        contestant.map_or(true, |c| s.contestant == c)
            && query.problem.as_deref().map_or(true, |p| s.problem_id == p)
    });
    // Stored oldest first; reverse so equal timestamps also come out newest first
    submissions.reverse();
    submissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let views: Vec<SubmissionView> = submissions
        .iter()
        .take(SUBMISSION_LIST_LIMIT)
        .map(|s| SubmissionView::new(s, admin))
        .collect();
    (StatusCode::OK, Json(views)).into_response()
}

/// POST /contests/:contest_id/registrations
pub async fn register_contestant(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
    Json(payload): Json<RegisterRequest>,
) -> Response {
    let contestant = payload.contestant.trim();
    if contestant.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "contestant is required");
    }

    match state.store.get_contest(&contest_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "contest not found"),
        Err(e) => return store_failure("Failed to load contest", e),
    }

    if let Err(e) = state.store.register(&contest_id, contestant).await {
        return store_failure("Failed to register contestant", e);
    }
    info!(contest_id = %contest_id, contestant, "Contestant registered");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "contest_id": contest_id, "contestant": contestant })),
    )
        .into_response()
}

/// GET /contests/:contest_id/scoreboard
pub async fn get_scoreboard(
    State(state): State<Arc<AppState>>,
    Path(contest_id): Path<String>,
) -> Response {
    let timer = metrics::SCOREBOARD_SECONDS.start_timer();
    let result = scoreboard::compute_for(state.store.as_ref(), &contest_id).await;
    timer.observe_duration();

    match result {
        Ok(Some(rows)) => (StatusCode::OK, Json(rows)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "contest not found"),
        Err(e) => store_failure("Failed to compute scoreboard", e),
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics")
        }
    }
}
