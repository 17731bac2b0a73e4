//! Background task that owns the sync loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::engine::SyncEngine;
use crate::auth::SessionToken;

/// Non-blocking, coalescing wake signal for the sync worker.
///
/// Any number of wakes before the worker next waits collapse into one cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
}

impl SyncTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Handle to a running sync worker
#[derive(Debug)]
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the worker, cancelling any in-flight cycle.
    ///
    /// Entries of a cancelled cycle stay pending and are retried next time.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(error) = self.join.await {
            tracing::error!("Sync worker ended abnormally: {error}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

pub struct SyncWorker;

impl SyncWorker {
    /// Spawn the worker on the current runtime. The first cycle runs immediately.
    pub fn spawn(engine: SyncEngine, trigger: SyncTrigger) -> SyncHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run(engine, trigger, shutdown_rx));
        SyncHandle { shutdown, join }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Push,
    Pull,
    Stop,
}

async fn run(engine: SyncEngine, trigger: SyncTrigger, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = engine.settings().pull_interval().map(pull_ticker);
    let mut session = engine.session_watch();
    let mut wake = Wake::Pull;

    tracing::info!("Sync worker started");
    while wake != Wake::Stop {
        let cycle = async {
            if wake == Wake::Pull {
                engine.run_full_cycle().await
            } else {
                engine.run_cycle().await
            }
        };

        let retry_at = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            result = cycle => match result {
                Ok(report) => report.next_retry_in.map(|delay| Instant::now() + delay),
                Err(error) => {
                    tracing::error!("Sync cycle failed: {error}");
                    None
                }
            },
        };

        wake = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => Wake::Stop,
            () = trigger.notified() => Wake::Push,
            () = tick(&mut ticker) => Wake::Pull,
            () = sleep_until(retry_at) => Wake::Push,
            () = session_restored(&mut session) => Wake::Pull,
        };
    }
    tracing::info!("Sync worker stopped");
}

fn pull_ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped handle also stops the worker.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves when a usable token appears again
async fn session_restored(session: &mut Option<watch::Receiver<Option<SessionToken>>>) {
    let Some(rx) = session else {
        return std::future::pending().await;
    };
    loop {
        if rx.changed().await.is_err() {
            *session = None;
            return std::future::pending().await;
        }
        if rx.borrow_and_update().is_some() {
            return;
        }
    }
}
