// Bounded pool of judging workers pulling submission ids from the judge queue.
//
// Each worker judges one submission at a time; the pool size caps how many
// submissions (and therefore contestant processes) run concurrently.
use crate::executor::Executor;
use arbiter_common::store::JudgeQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// How long a worker blocks on the queue before re-checking for shutdown
const DEFAULT_POLL: Duration = Duration::from_secs(5);

pub struct WorkerPool {
    executor: Arc<Executor>,
    queue: Arc<dyn JudgeQueue>,
    concurrency: usize,
    poll: Duration,
}

impl WorkerPool {
    pub fn new(executor: Arc<Executor>, queue: Arc<dyn JudgeQueue>, concurrency: usize) -> Self {
        Self {
            executor,
            queue,
            concurrency: concurrency.max(1),
            poll: DEFAULT_POLL,
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Run until `shutdown` flips to true. Workers finish the submission they
    /// hold before exiting.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(workers = self.concurrency, "Starting worker pool");

        let handles: Vec<_> = (0..self.concurrency)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    self.executor.clone(),
                    self.queue.clone(),
                    self.poll,
                    shutdown.clone(),
                ))
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

#[instrument(skip(executor, queue, poll, shutdown))]
async fn worker_loop(
    worker: usize,
    executor: Arc<Executor>,
    queue: Arc<dyn JudgeQueue>,
    poll: Duration,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        let stopping = *shutdown.borrow();
        if stopping {
            break;
        }
        match queue.pop(poll).await {
            Ok(Some(submission_id)) => {
                info!(submission_id = %submission_id, "Received job");
                if let Err(e) = executor.execute(submission_id).await {
                    error!(submission_id = %submission_id, error = %format!("{:#}", e), "Job failed");
                }
            }
            // Timeout - check for shutdown
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Queue error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    info!("Worker stopped");
}
