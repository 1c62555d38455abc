//! The producer side of the bot.
//!
//! A [`Sender`] is an independent watcher that submits jobs to the shared
//! dispatcher queue. The orchestrator runs each one on its own task.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::dispatch::JobQueue;

/// Lifecycle contract for job producers.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Run the producer loop. Does not return until [`Sender::stop`] has
    /// been called and the loop has unwound.
    async fn start(&self, jobs: JobQueue);

    /// Ask the loop to exit at its next safe point and wait until it has.
    /// Callers invoke this once.
    async fn stop(&self);
}

/// Stop flag plus exit acknowledgement for a single run loop.
///
/// `arm` is called when the loop starts, `finish` when it has unwound and
/// `fire` from `stop()`. Firing before the loop starts is remembered, so a
/// late `start` returns immediately instead of running forever.
pub struct StopSignal {
    stop_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
    running: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            done_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Mark the loop as running and hand it a receiver to select on.
    pub fn arm(&self) -> watch::Receiver<bool> {
        self.done_tx.send_replace(false);
        self.running.store(true, Ordering::SeqCst);
        self.stop_tx.subscribe()
    }

    /// The loop has unwound; releases anyone waiting in [`StopSignal::fire`].
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.done_tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Signal the loop and wait for it to acknowledge. Returns at once when
    /// no loop is running.
    pub async fn fire(&self) {
        let mut done = self.done_tx.subscribe();
        self.stop_tx.send_replace(true);
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        // done_tx lives in self, so the channel cannot close under us
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
