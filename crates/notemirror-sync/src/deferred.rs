//! Delayed background work, such as clearing a status reaction a few
//! seconds after it was applied.
//!
//! Tasks run on the tokio runtime. Failures are logged with the task name;
//! they never propagate to the trigger that scheduled them.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use notemirror_core::Result;

/// Handle to the background tasks scheduled by the orchestrator.
#[derive(Clone, Default)]
pub struct DeferredTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`.
    pub fn schedule<F>(&self, name: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        // Reap finished tasks so the set does not grow without bound
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!(subsystem = "sync", component = "deferred", error = ?e, "Deferred task panicked");
            }
        }
        tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let start = Instant::now();
            match task.await {
                Ok(()) => debug!(
                    subsystem = "sync",
                    component = "deferred",
                    op = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Deferred task completed"
                ),
                Err(e) => warn!(
                    subsystem = "sync",
                    component = "deferred",
                    op = name,
                    error = %e,
                    "Deferred task failed"
                ),
            }
        });
    }

    /// Tasks scheduled and not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Wait for every scheduled task to finish. Returns how many ran.
    pub async fn drain(&self) -> usize {
        let mut drained = 0;
        loop {
            // Swap the set out so no lock is held across an await
            let mut batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return drained;
            }
            while let Some(finished) = batch.join_next().await {
                drained += 1;
                if let Err(e) = finished {
                    error!(subsystem = "sync", component = "deferred", error = ?e, "Deferred task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notemirror_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let deferred = DeferredTasks::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let scheduled_at = tokio::time::Instant::now();

        deferred.schedule("count", Duration::from_secs(3), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert_eq!(deferred.drain().await, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(scheduled_at.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_failures_are_contained() {
        let deferred = DeferredTasks::new();
        deferred.schedule("fail", Duration::ZERO, async {
            Err(Error::transient("vendor down"))
        });
        deferred.schedule("ok", Duration::ZERO, async { Ok(()) });

        assert_eq!(deferred.drain().await, 2);
        assert_eq!(deferred.pending(), 0);
    }
}
