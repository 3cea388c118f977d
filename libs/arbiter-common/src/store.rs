/// Record store and judge queue abstractions.
///
/// The API, worker and CLI only ever talk to these traits. Production wires
/// them to Redis (see `redis.rs`); tests use the in-memory backends below.
use crate::error::StoreError;
use crate::types::{Attempt, Contest, Problem, Submission, SubmissionStatus};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put_problem(&self, problem: &Problem) -> Result<(), StoreError>;
    async fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError>;

    async fn put_contest(&self, contest: &Contest) -> Result<(), StoreError>;
    async fn get_contest(&self, contest_id: &str) -> Result<Option<Contest>, StoreError>;

    async fn register(&self, contest_id: &str, contestant: &str) -> Result<(), StoreError>;
    async fn registrations(&self, contest_id: &str) -> Result<Vec<String>, StoreError>;

    /// Insert a new submission. It must be in the `judging` state.
    async fn create_submission(&self, submission: &Submission) -> Result<(), StoreError>;
    async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>, StoreError>;
    /// All submissions of a contest in creation order
    async fn contest_submissions(&self, contest_id: &str) -> Result<Vec<Submission>, StoreError>;

    /// Single terminal write. Fails with `AlreadyTerminal` unless the stored
    /// record is still `judging`.
    async fn finish_submission(&self, submission: &Submission) -> Result<(), StoreError>;

    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;
    async fn attempts(&self, contest_id: &str) -> Result<Vec<Attempt>, StoreError>;
}

/// FIFO of submission ids waiting for a judging worker
#[async_trait]
pub trait JudgeQueue: Send + Sync {
    /// Enqueue, refusing with `QueueFull` once `max_depth` items are pending
    async fn push(&self, submission_id: Uuid, max_depth: usize) -> Result<(), StoreError>;
    /// Wait up to `timeout` for the next id
    async fn pop(&self, timeout: Duration) -> Result<Option<Uuid>, StoreError>;
    async fn depth(&self) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    problems: HashMap<String, Problem>,
    contests: HashMap<String, Contest>,
    registrations: HashMap<String, Vec<String>>,
    submissions: HashMap<Uuid, Submission>,
    contest_index: HashMap<String, Vec<Uuid>>,
    attempts: HashMap<String, Vec<Attempt>>,
}

/// Process-local record store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means another test thread panicked mid-write
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put_problem(&self, problem: &Problem) -> Result<(), StoreError> {
        self.lock().problems.insert(problem.id.clone(), problem.clone());
        Ok(())
    }

    async fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        Ok(self.lock().problems.get(problem_id).cloned())
    }

    async fn put_contest(&self, contest: &Contest) -> Result<(), StoreError> {
        self.lock().contests.insert(contest.id.clone(), contest.clone());
        Ok(())
    }

    async fn get_contest(&self, contest_id: &str) -> Result<Option<Contest>, StoreError> {
        Ok(self.lock().contests.get(contest_id).cloned())
    }

    async fn register(&self, contest_id: &str, contestant: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let regs = inner.registrations.entry(contest_id.to_string()).or_default();
        if !regs.iter().any(|c| c == contestant) {
            regs.push(contestant.to_string());
        }
        Ok(())
    }

    async fn registrations(&self, contest_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .registrations
            .get(contest_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.submissions.insert(submission.id, submission.clone());
        inner
            .contest_index
            .entry(submission.contest_id.clone())
            .or_default()
            .push(submission.id);
        Ok(())
    }

    async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.lock().submissions.get(id).cloned())
    }

    async fn contest_submissions(&self, contest_id: &str) -> Result<Vec<Submission>, StoreError> {
        let inner = self.lock();
        let ids = match inner.contest_index.get(contest_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.submissions.get(id).cloned())
            .collect())
    }

    async fn finish_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.submissions.get_mut(&submission.id) {
            Some(stored) if stored.status == SubmissionStatus::Judging => {
                *stored = submission.clone();
                Ok(())
            }
            Some(_) => Err(StoreError::AlreadyTerminal(submission.id)),
            None => Err(StoreError::not_found("submission", submission.id)),
        }
    }

    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        self.lock()
            .attempts
            .entry(attempt.contest_id.clone())
            .or_default()
            .push(attempt.clone());
        Ok(())
    }

    async fn attempts(&self, contest_id: &str) -> Result<Vec<Attempt>, StoreError> {
        Ok(self.lock().attempts.get(contest_id).cloned().unwrap_or_default())
    }
}

/// Process-local judge queue
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<Uuid>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&self) -> Option<Uuid> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

#[async_trait]
impl JudgeQueue for MemoryQueue {
    async fn push(&self, submission_id: Uuid, max_depth: usize) -> Result<(), StoreError> {
        {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            if items.len() >= max_depth {
                return Err(StoreError::QueueFull(items.len()));
            }
            items.push_back(submission_id);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Uuid>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(id) = self.take() {
                return Ok(Some(id));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.take());
            }
        }
    }

    async fn depth(&self) -> Result<usize, StoreError> {
        Ok(self.items.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}
