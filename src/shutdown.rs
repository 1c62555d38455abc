//! Signal-driven shutdown with a grace-period failsafe.
//!
//! On SIGINT, SIGHUP or SIGTERM the butler is asked to stop. Stopping the
//! senders and draining the dispatcher must both fit inside the grace
//! period; otherwise the outcome is [`ShutdownOutcome::Forced`] and the
//! process entry point terminates the process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use tracing::{info, warn};

use crate::butler::{Butler, ShutdownOutcome};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Process termination signals, installed up front so a failure to
/// register them is reported at startup.
#[cfg(unix)]
pub struct KillSignals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl KillSignals {
    pub fn install() -> Result<Self> {
        use color_eyre::eyre::Context;
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup()).wrap_err("failed to watch SIGHUP")?,
            interrupt: signal(SignalKind::interrupt()).wrap_err("failed to watch SIGINT")?,
            terminate: signal(SignalKind::terminate()).wrap_err("failed to watch SIGTERM")?,
        })
    }

    /// Resolve on the first signal; returns its name.
    pub async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
pub struct KillSignals;

#[cfg(not(unix))]
impl KillSignals {
    pub fn install() -> Result<Self> {
        Ok(Self)
    }

    pub async fn recv(self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}

/// Serve until every sender returns on its own or `trigger` resolves.
///
/// After the trigger the grace period starts: senders are stopped and the
/// serve loop drained against one shared deadline.
pub async fn serve_until<F>(butler: Arc<Butler>, trigger: F, grace: Duration) -> ShutdownOutcome
where
    F: Future<Output = ()>,
{
    let serve = butler.serve();
    tokio::pin!(serve);

    tokio::select! {
        () = &mut serve => {
            info!("all senders returned");
            return ShutdownOutcome::Graceful;
        }
        () = trigger => {}
    }

    let deadline = tokio::time::Instant::now() + grace;
    info!(grace_ms = grace.as_millis() as u64, "shutting down");

    if butler.stop_with_deadline(grace).await == ShutdownOutcome::Forced {
        return ShutdownOutcome::Forced;
    }

    match tokio::time::timeout_at(deadline, &mut serve).await {
        Ok(()) => ShutdownOutcome::Graceful,
        Err(_) => {
            warn!("dispatcher did not drain before the grace period ended");
            ShutdownOutcome::Forced
        }
    }
}
