//! Structured supervision for background work.
//!
//! Every poll loop and manual trigger runs under a [`TaskSupervisor`]. A task
//! that returns `Err` or panics is logged and kept in a bounded failure log
//! instead of disappearing with its join handle.

use std::{
    any::Any,
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tokio_util::task::TaskTracker,
    tracing::{debug, error, warn},
};

use crate::error::Result;

pub const DEFAULT_FAILURE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub login_id: String,
    pub task: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    failures: Arc<Mutex<VecDeque<TaskFailure>>>,
    capacity: usize,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_CAPACITY)
    }
}

impl TaskSupervisor {
    pub fn new(capacity: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Run `fut` in the background on behalf of `login_id`.
    pub fn spawn<F>(&self, login_id: &str, task: &str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let login_id = login_id.to_string();
        let task = task.to_string();
        let failures = Arc::clone(&self.failures);
        let capacity = self.capacity;

        // The inner task isolates panics so the wrapper can observe them.
        let inner = tokio::spawn(fut);
        self.tracker.spawn(async move {
            let error = match inner.await {
                Ok(Ok(())) => {
                    debug!(login_id = %login_id, task = %task, "task finished");
                    return;
                },
                Ok(Err(e)) => e.to_string(),
                Err(join) if join.is_panic() => {
                    format!("panicked: {}", panic_message(join.into_panic()))
                },
                Err(join) => format!("aborted: {join}"),
            };

            error!(
                login_id = %login_id,
                task = %task,
                error = %error,
                "supervised task failed"
            );
            let mut failures = failures.lock().unwrap_or_else(|e| e.into_inner());
            failures.push_back(TaskFailure {
                login_id,
                task,
                error,
                at: Utc::now(),
            });
            while failures.len() > capacity {
                failures.pop_front();
            }
        });
    }

    /// Most recent failures, oldest first.
    pub fn failures(&self) -> Vec<TaskFailure> {
        let failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.iter().cloned().collect()
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker and wait up to `grace` for running tasks. Returns
    /// whether everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !finished {
            warn!(
                remaining = self.tracker.len(),
                "supervised tasks still running after shutdown grace period"
            );
        }
        finished
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}
