//! Bounded runner for background completions
//!
//! The second half of each handshake runs after the initiating response has
//! been sent. Tasks share a fixed number of slots and each one, including its
//! wait for a slot, is cut off at a fixed deadline that never exceeds the
//! pending window, so a stuck peer cannot block a later retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct CallbackRunner {
    semaphore: Arc<Semaphore>,
    workers: usize,
    timeout: Duration,
}

impl CallbackRunner {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            timeout,
        }
    }

    /// Dispatch `work` without awaiting it. The handle lets callers observe
    /// settlement or abort; dropping it detaches the task.
    pub fn spawn<F>(&self, label: &'static str, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let bounded = async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    warn!(task = label, "Callback runner closed");
                    return;
                };
                work.await;
            };

            if tokio::time::timeout(timeout, bounded).await.is_err() {
                warn!(task = label, timeout_secs = timeout.as_secs(), "Background completion timed out");
            }
        })
    }

    /// Completions currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.workers - self.semaphore.available_permits()
    }
}
