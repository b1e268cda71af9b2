//! Fire-and-forget side tasks.
//!
//! Jobs run at most once, are never retried, and report failures only to the
//! log. Callers get no completion signal; `wait_idle` exists for shutdown.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `job` on the runtime and returns immediately.
    pub fn spawn<F, E>(&self, name: &'static str, job: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();

        tokio::spawn(async move {
            match job.await {
                Ok(()) => debug!(task = name, "Background task finished"),
                Err(e) => warn!(task = name, error = %e, "Background task failed"),
            }
            if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Number of jobs that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until every spawned job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_spawn_runs_job() {
        let tasks = BackgroundTasks::new();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        tasks.spawn("flag", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });

        tasks.wait_idle().await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_job_is_not_retried() {
        let tasks = BackgroundTasks::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        tasks.spawn("failing", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("boom")
        });

        tasks.wait_idle().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_with_no_jobs_returns() {
        BackgroundTasks::new().wait_idle().await;
    }
}
