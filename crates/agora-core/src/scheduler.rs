//! # Rank Scheduler
//!
//! Owns the periodic ranking sweep: one sweep on [`RankScheduler::start`],
//! then one per period on a background task until [`RankScheduler::stop`].
//!
//! Lifecycle is `Created -> Running -> Stopped`. Stopping is final and never
//! interrupts a sweep that is already running; the background loop only
//! looks at the shutdown signal between sweeps.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ranking::RankingEngine;

/// Period of the reference deployment.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("rank scheduler is already running")]
    AlreadyRunning,

    #[error("rank scheduler was stopped and cannot be restarted")]
    Stopped,

    #[error("rank scheduler task panicked: {0}")]
    Join(String),
}

enum Inner {
    Created,
    /// Initial sweep in progress. The lock is not held across it.
    Starting {
        swept: Arc<Notify>,
    },
    Running {
        task: JoinHandle<()>,
        shutdown: Arc<Notify>,
    },
    Stopped,
}

pub struct RankScheduler {
    engine: Arc<RankingEngine>,
    period: Duration,
    inner: Mutex<Inner>,
}

impl RankScheduler {
    pub fn new(engine: Arc<RankingEngine>, period: Duration) -> Self {
        Self {
            engine,
            period,
            inner: Mutex::new(Inner::Created),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        match *self.inner.lock().await {
            Inner::Created => SchedulerState::Created,
            Inner::Starting { .. } | Inner::Running { .. } => SchedulerState::Running,
            Inner::Stopped => SchedulerState::Stopped,
        }
    }

    /// Runs one sweep, then spawns the periodic loop.
    ///
    /// Fails with [`SchedulerError::AlreadyRunning`] if started twice and
    /// with [`SchedulerError::Stopped`] after [`stop`](Self::stop), including
    /// a stop that arrives during the initial sweep.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let swept = Arc::new(Notify::new());
        {
            let mut inner = self.inner.lock().await;
            match *inner {
                Inner::Created => {}
                Inner::Starting { .. } | Inner::Running { .. } => {
                    return Err(SchedulerError::AlreadyRunning)
                }
                Inner::Stopped => return Err(SchedulerError::Stopped),
            }
            *inner = Inner::Starting { swept: swept.clone() };
        }

        // Wakes a waiting `stop` even if this future is dropped mid-sweep.
        let done = NotifyOnDrop(swept);
        sweep(&self.engine).await;
        drop(done);

        let mut inner = self.inner.lock().await;
        if !matches!(*inner, Inner::Starting { .. }) {
            return Err(SchedulerError::Stopped);
        }
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run(self.engine.clone(), self.period, shutdown.clone()));
        *inner = Inner::Running { task, shutdown };

        info!(period_secs = self.period.as_secs_f64(), "rank scheduler started");
        Ok(())
    }

    /// Cancels future ticks and waits for the loop to exit, letting an
    /// in-flight sweep finish first. Stopping twice is a no-op.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().await;
        let previous = std::mem::replace(&mut *inner, Inner::Stopped);
        match previous {
            Inner::Running { task, shutdown } => {
                shutdown.notify_one();
                task.await.map_err(|e| SchedulerError::Join(e.to_string()))?;
                info!("rank scheduler stopped");
            }
            Inner::Starting { swept } => {
                drop(inner);
                swept.notified().await;
                info!("rank scheduler stopped during its initial sweep");
            }
            Inner::Created => debug!("rank scheduler stopped before it was started"),
            Inner::Stopped => {}
        }
        Ok(())
    }
}

impl Drop for RankScheduler {
    fn drop(&mut self) {
        if let Inner::Running { shutdown, .. } = self.inner.get_mut() {
            shutdown.notify_one();
        }
    }
}

struct NotifyOnDrop(Arc<Notify>);

impl Drop for NotifyOnDrop {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

async fn sweep(engine: &RankingEngine) {
    if let Err(e) = engine.recompute_all().await {
        warn!(error = %e, "ranking sweep aborted, retrying on next tick");
    }
}

async fn run(engine: Arc<RankingEngine>, period: Duration, shutdown: Arc<Notify>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
        }
        sweep(&engine).await;
    }
}
