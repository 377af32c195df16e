//! Supervised set of background tasks with panic isolation

use super::{Shutdown, ShutdownSignal};
use crate::telemetry::{increment_counter, CounterMetric};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Tasks spawned against one shared cancellation signal.
///
/// Every task runs behind a panic boundary: a panic is logged as an
/// abnormal exit and the task ends without taking anything else down and
/// without being restarted.
pub struct TaskSet {
    shutdown: Shutdown,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self {
            shutdown: Shutdown::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Signal handed to every task in the set
    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Fire the shared cancellation signal
    pub fn cancel(&self) {
        self.shutdown.trigger();
    }

    /// Spawn a task into the set.
    ///
    /// Returns `false` without spawning once the set has been cancelled.
    pub async fn spawn<F, E>(&self, name: impl Into<String>, future: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        let mut handles = self.handles.lock().await;
        if self.is_cancelled() {
            tracing::debug!(task = %name, "Task set cancelled, not spawning");
            return false;
        }

        handles.retain(|(_, handle)| !handle.is_finished());

        let task = name.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => tracing::info!(task = %task, "Task exited"),
                Ok(Err(e)) => tracing::warn!(task = %task, error = %e, "Task exited with error"),
                Err(panic) => {
                    increment_counter(CounterMetric::TaskPanics, 1);
                    tracing::error!(
                        task = %task,
                        panic = %panic_message(panic.as_ref()),
                        "Task exited abnormally"
                    );
                }
            }
        });

        tracing::debug!(task = %name, "Spawned task");
        handles.push((name, handle));
        true
    }

    /// Tasks spawned and not yet observed as finished
    pub async fn active_count(&self) -> usize {
        let handles = self.handles.lock().await;
        handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Await every task in the set, including ones spawned while waiting
    pub async fn join_all(&self) {
        loop {
            let batch: Vec<(String, JoinHandle<()>)> = {
                let mut handles = self.handles.lock().await;
                handles.drain(..).collect()
            };
            if batch.is_empty() {
                break;
            }

            for (name, handle) in batch {
                if let Err(e) = handle.await {
                    tracing::warn!(task = %name, error = %e, "Task join failed");
                }
            }
        }
    }
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
