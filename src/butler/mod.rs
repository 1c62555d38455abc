//! Orchestrator: one dispatcher, many senders.
//!
//! Senders are registered on a [`ButlerBuilder`]; once built, the list is
//! frozen, so serving and stopping never race with registration.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, JobHandler, DEFAULT_WORKERS};
use crate::sender::Sender;

/// How a deadline-bounded stop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every sender acknowledged in time.
    Graceful,
    /// The grace period ran out first.
    Forced,
}

pub struct ButlerBuilder {
    handler: Arc<dyn JobHandler>,
    workers: usize,
    senders: Vec<Arc<dyn Sender>>,
}

impl ButlerBuilder {
    /// Dispatcher pool size, [`DEFAULT_WORKERS`] unless set.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn register_sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn build(self) -> Butler {
        Butler {
            handler: self.handler,
            workers: self.workers,
            senders: self.senders,
        }
    }
}

pub struct Butler {
    handler: Arc<dyn JobHandler>,
    workers: usize,
    senders: Vec<Arc<dyn Sender>>,
}

impl Butler {
    /// Start building a butler whose dispatcher runs `handler` per job.
    pub fn builder(handler: Arc<dyn JobHandler>) -> ButlerBuilder {
        ButlerBuilder {
            handler,
            workers: DEFAULT_WORKERS,
            senders: Vec::new(),
        }
    }

    pub fn sender_names(&self) -> Vec<&str> {
        self.senders.iter().map(|s| s.name()).collect()
    }

    /// Start the dispatcher and every sender, each on its own task, and wait
    /// until all senders have returned. The dispatcher is drained before
    /// this returns.
    pub async fn serve(&self) {
        let (dispatcher, jobs) = Dispatcher::new(self.workers, Arc::clone(&self.handler)).start();

        info!(
            senders = self.senders.len(),
            workers = self.workers,
            "butler serving"
        );

        let tasks: Vec<_> = self
            .senders
            .iter()
            .map(|sender| {
                let sender = Arc::clone(sender);
                let jobs = jobs.clone();
                tokio::spawn(async move {
                    debug!(sender = sender.name(), "starting sender");
                    sender.start(jobs).await;
                    debug!(sender = sender.name(), "sender returned");
                })
            })
            .collect();

        // The senders hold the only remaining queue handles.
        drop(jobs);

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "sender task ended abnormally");
            }
        }

        dispatcher.shutdown().await;
        info!("butler stopped serving");
    }

    /// Stop every sender concurrently and wait for all acknowledgements.
    pub async fn stop(&self) {
        join_all(self.senders.iter().map(|sender| async move {
            sender.stop().await;
            debug!(sender = sender.name(), "sender acknowledged stop");
        }))
        .await;
    }

    /// [`Butler::stop`] bounded by `grace`. What to do about a `Forced`
    /// outcome is left to the caller.
    pub async fn stop_with_deadline(&self, grace: Duration) -> ShutdownOutcome {
        match tokio::time::timeout(grace, self.stop()).await {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "senders did not stop in time");
                ShutdownOutcome::Forced
            }
        }
    }
}
