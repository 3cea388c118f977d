use crate::error::StoreError;
use crate::store::{JudgeQueue, RecordStore};
use crate::types::{Attempt, Contest, Problem, Submission, SubmissionStatus};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Redis key semantics - shared by API, worker and CLI so the layout never drifts

pub const KEY_PREFIX: &str = "arbiter";
pub const JUDGE_QUEUE: &str = "arbiter:queue:judge";

pub fn problem_key(problem_id: &str) -> String {
    format!("{}:problem:{}", KEY_PREFIX, problem_id)
}

pub fn contest_key(contest_id: &str) -> String {
    format!("{}:contest:{}", KEY_PREFIX, contest_id)
}

pub fn submission_key(id: &Uuid) -> String {
    format!("{}:submission:{}", KEY_PREFIX, id)
}

/// Status is kept beside the record so the terminal write can compare-and-set on it
pub fn status_key(id: &Uuid) -> String {
    format!("{}:status:{}", KEY_PREFIX, id)
}

pub fn contest_submissions_key(contest_id: &str) -> String {
    format!("{}:contest:{}:submissions", KEY_PREFIX, contest_id)
}

pub fn registrations_key(contest_id: &str) -> String {
    format!("{}:contest:{}:registrations", KEY_PREFIX, contest_id)
}

pub fn attempts_key(contest_id: &str) -> String {
    format!("{}:contest:{}:attempts", KEY_PREFIX, contest_id)
}

// KEYS[1] = status key, KEYS[2] = record key
// ARGV[1] = expected status, ARGV[2] = record json, ARGV[3] = new status
const FINISH_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SET', KEYS[1], ARGV[3])
return 1
"#;

// KEYS[1] = queue, ARGV[1] = submission id, ARGV[2] = max depth
const PUSH_SCRIPT: &str = r#"
local depth = redis.call('LLEN', KEYS[1])
if depth >= tonumber(ARGV[2]) then
  return -1
end
return redis.call('RPUSH', KEYS[1], ARGV[1])
"#;

/// Connections parked between blocking pops. A BLPOP stalls every request
/// pipelined behind it, so each concurrent popper checks out its own.
#[derive(Debug)]
pub(crate) struct IdleConnections<C> {
    idle: Mutex<Vec<C>>,
}

impl<C> Default for IdleConnections<C> {
    fn default() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }
}

impl<C> IdleConnections<C> {
    pub(crate) fn take(&self) -> Option<C> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    pub(crate) fn put_back(&self, conn: C) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Redis-backed record store and judge queue. Record operations share one
/// multiplexed connection; blocking pops never touch it.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    blocking: Arc<IdleConnections<MultiplexedConnection>>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            blocking: Arc::default(),
        })
    }

    async fn blocking_conn(&self) -> Result<MultiplexedConnection, StoreError> {
        match self.blocking.take() {
            Some(conn) => Ok(conn),
            None => Ok(self.client.get_multiplexed_async_connection().await?),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(value)?;
        let _: () = conn.set(key, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn put_problem(&self, problem: &Problem) -> Result<(), StoreError> {
        self.set_json(&problem_key(&problem.id), problem).await
    }

    async fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        self.get_json(&problem_key(problem_id)).await
    }

    async fn put_contest(&self, contest: &Contest) -> Result<(), StoreError> {
        self.set_json(&contest_key(&contest.id), contest).await
    }

    async fn get_contest(&self, contest_id: &str) -> Result<Option<Contest>, StoreError> {
        self.get_json(&contest_key(contest_id)).await
    }

    async fn register(&self, contest_id: &str, contestant: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(registrations_key(contest_id), contestant).await?;
        Ok(())
    }

    async fn registrations(&self, contest_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = conn.smembers(registrations_key(contest_id)).await?;
        // Sets are unordered; sort so scoreboard tie order is stable between reads
        members.sort();
        Ok(members)
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(submission)?;
        let _: () = redis::pipe()
            .atomic()
            .set(submission_key(&submission.id), payload)
            .ignore()
            .set(status_key(&submission.id), submission.status.as_str())
            .ignore()
            .rpush(
                contest_submissions_key(&submission.contest_id),
                submission.id.to_string(),
            )
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>, StoreError> {
        self.get_json(&submission_key(id)).await
    }

    async fn contest_submissions(&self, contest_id: &str) -> Result<Vec<Submission>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .lrange(contest_submissions_key(contest_id), 0, -1)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .map(|id| submission_key(&id))
            .collect();
        let payloads: Vec<Option<String>> = conn.mget(keys).await?;

        let mut submissions = Vec::with_capacity(payloads.len());
        for payload in payloads.into_iter().flatten() {
            submissions.push(serde_json::from_str(&payload)?);
        }
        Ok(submissions)
    }

    async fn finish_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(submission)?;
        let outcome: i64 = redis::Script::new(FINISH_SCRIPT)
            .key(status_key(&submission.id))
            .key(submission_key(&submission.id))
            .arg(SubmissionStatus::JUDGING)
            .arg(payload)
            .arg(submission.status.as_str())
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(()),
            0 => Err(StoreError::AlreadyTerminal(submission.id)),
            _ => Err(StoreError::not_found("submission", submission.id)),
        }
    }

    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(attempt)?;
        let _: () = conn.rpush(attempts_key(&attempt.contest_id), payload).await?;
        Ok(())
    }

    async fn attempts(&self, contest_id: &str) -> Result<Vec<Attempt>, StoreError> {
        let mut conn = self.conn.clone();
        let rows: Vec<String> = conn.lrange(attempts_key(contest_id), 0, -1).await?;
        rows.iter()
            .map(|row| serde_json::from_str(row).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl JudgeQueue for RedisStore {
    /// RPUSH guarded by a depth check, FIFO with the BLPOP in `pop`
    async fn push(&self, submission_id: Uuid, max_depth: usize) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let depth: i64 = redis::Script::new(PUSH_SCRIPT)
            .key(JUDGE_QUEUE)
            .arg(submission_id.to_string())
            .arg(max_depth)
            .invoke_async(&mut conn)
            .await?;
        if depth < 0 {
            return Err(StoreError::QueueFull(max_depth));
        }
        Ok(())
    }

    /// BLPOP with timeout so workers can observe shutdown between pops.
    /// A connection that errored is dropped rather than parked again.
    async fn pop(&self, timeout: Duration) -> Result<Option<Uuid>, StoreError> {
        let mut conn = self.blocking_conn().await?;
        let result: Option<(String, String)> =
            conn.blpop(JUDGE_QUEUE, timeout.as_secs_f64()).await?;
        self.blocking.put_back(conn);

        match result {
            Some((_key, payload)) => {
                let id = Uuid::parse_str(&payload).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::TypeError,
                        "invalid submission id in queue",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn depth(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let depth: usize = conn.llen(JUDGE_QUEUE).await?;
        Ok(depth)
    }
}
