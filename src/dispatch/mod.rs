//! Bounded job dispatcher.
//!
//! A fixed pool of workers drains one shared queue and runs a single
//! handler per job. Workers handle jobs one at a time, so at most `N`
//! handler invocations are in flight no matter how many producers submit.
//!
//! The queue has room for a single job, so at most `N` jobs are in flight
//! plus one waiting in the queue. Once that slot is taken the next
//! producer waits in [`JobQueue::submit`]. A slow chat API therefore
//! throttles every producer instead of growing a backlog.

pub mod job;

pub use job::{Job, Message, MessageResponse};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pool size used when the configuration does not say otherwise.
pub const DEFAULT_WORKERS: usize = 5;

/// Processes one job. Implementations report failures through the job
/// itself (e.g. the message's response channel) and never panic.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job);
}

/// Returned when the dispatcher is gone and no worker will take the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dispatcher job queue is closed")]
pub struct QueueClosed;

/// Submission side of the shared job queue. Cheap to clone; workers exit
/// once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Hand a job to the pool, waiting while all workers are busy.
    pub async fn submit(&self, job: Job) -> Result<(), QueueClosed> {
        self.tx.send(job).await.map_err(|_| QueueClosed)
    }
}

/// Worker pool configuration: a concurrency limit and the handler.
pub struct Dispatcher {
    workers: usize,
    handler: Arc<dyn JobHandler>,
}

impl Dispatcher {
    /// A limit of zero is bumped to one worker.
    pub fn new(workers: usize, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            workers: workers.max(1),
            handler,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn the workers and return the running pool plus its queue.
    pub fn start(self) -> (RunningDispatcher, JobQueue) {
        let (tx, rx) = mpsc::channel(1);
        let rx = Arc::new(Mutex::new(rx));

        let joins = (1..=self.workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let handler = Arc::clone(&self.handler);
                tokio::spawn(run_worker(worker_id, rx, handler))
            })
            .collect();

        info!(workers = self.workers, "dispatcher started");
        (RunningDispatcher { joins }, JobQueue { tx })
    }
}

/// Handles of the spawned workers.
pub struct RunningDispatcher {
    joins: Vec<JoinHandle<()>>,
}

impl RunningDispatcher {
    /// Wait for every worker to exit. Workers finish their current job and
    /// exit once all [`JobQueue`] handles are dropped.
    pub async fn shutdown(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "dispatcher worker ended abnormally");
            }
        }
        info!("dispatcher stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    handler: Arc<dyn JobHandler>,
) {
    debug!(worker = worker_id, "worker waiting for jobs");
    loop {
        // Only the receive is under the lock; handling runs unlocked.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };
        handler.handle(job).await;
    }
    debug!(worker = worker_id, "worker exiting, queue closed");
}
