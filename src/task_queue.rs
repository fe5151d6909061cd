//! Bounded FIFO task runner with per-task timeout and drain
//!
//! Tasks are started in submission order, at most `max_concurrent` at a
//! time. A timeout settles the caller's future but does not cancel the
//! task itself: it keeps running detached and its result is dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{HarError, Result};

/// Default number of concurrently running tasks
pub const DEFAULT_MAX_CONCURRENT: usize = 1;

/// Default per-task timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;
type DrainSignal = Shared<oneshot::Receiver<()>>;

struct Inner {
    queue: VecDeque<Job>,
    active: usize,
    drain: Option<(oneshot::Sender<()>, DrainSignal)>,
}

impl Inner {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }
}

/// Task queue with concurrency control and automatic timeout handling
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
    max_concurrent: usize,
    timeout: Duration,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .field("active", &self.active_tasks())
            .field("queued", &self.queued_tasks())
            .finish()
    }
}

impl TaskQueue {
    /// Create a new task queue
    ///
    /// # Panics
    ///
    /// Panics if `max_concurrent` is 0
    #[must_use]
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");

        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                active: 0,
                drain: None,
            })),
            max_concurrent,
            timeout,
        }
    }

    /// Submit a task. It starts immediately if a slot is free, otherwise
    /// once every task submitted before it has started.
    ///
    /// The returned future resolves with the task result, the task error,
    /// or [`HarError::Timeout`], whichever comes first. Must be called from
    /// within a Tokio runtime.
    pub fn submit<F, Fut, T>(&self, task: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let timeout = self.timeout;

        let job: Job = Box::new(move || {
            async move {
                let handle = tokio::spawn(task());
                let outcome = match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(HarError::Task(e.to_string())),
                    Err(_) => Err(HarError::Timeout(timeout)),
                };
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        self.lock().queue.push_back(job);
        self.process();

        async move {
            rx.await
                .unwrap_or_else(|_| Err(HarError::Task("task dropped".to_string())))
        }
    }

    /// Wait until the queue is empty and no task is running.
    ///
    /// Concurrent callers share one wait.
    pub async fn drain(&self) {
        let signal = {
            let mut inner = self.lock();
            if inner.is_idle() {
                return;
            }

            match &inner.drain {
                Some((_, signal)) => signal.clone(),
                None => {
                    let (tx, rx) = oneshot::channel();
                    let signal = rx.shared();
                    inner.drain = Some((tx, signal.clone()));
                    signal
                }
            }
        };

        let _ = signal.await;
    }

    /// Number of running tasks
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.lock().active
    }

    /// Number of tasks waiting for a slot
    #[must_use]
    pub fn queued_tasks(&self) -> usize {
        self.lock().queue.len()
    }

    /// Maximum number of concurrently running tasks
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start queued tasks up to the concurrency limit
    fn process(&self) {
        loop {
            let job = {
                let mut inner = self.lock();
                if inner.active >= self.max_concurrent {
                    return;
                }
                let Some(job) = inner.queue.pop_front() else {
                    return;
                };
                inner.active += 1;
                job
            };

            let queue = self.clone();
            tokio::spawn(async move {
                job().await;
                queue.complete();
            });
        }
    }

    fn complete(&self) {
        self.lock().active -= 1;
        self.process();

        let mut inner = self.lock();
        if inner.is_idle() {
            if let Some((tx, _)) = inner.drain.take() {
                debug!("Task queue drained");
                let _ = tx.send(());
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_CONCURRENT,
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
        )
    }
}
