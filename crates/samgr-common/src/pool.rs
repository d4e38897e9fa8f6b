//! Bounded worker pool.
//!
//! `TaskPool` runs submitted futures on the tokio runtime with at most
//! `concurrency` of them in flight. Submissions wait in a bounded queue;
//! when the queue is full `submit` fails with [`Error::QueueFull`] instead of
//! blocking the caller. Callers that must not lose a task take a
//! [`PoolSlot`] with `reserve`, which waits for room. A panicking task is
//! caught and logged, and never takes the dispatcher down with it.

use crate::errors::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Default queue capacity for pools that do not configure one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Task = BoxFuture<'static, ()>;

/// Handle to a bounded worker pool. Cloning shares the pool.
///
/// The dispatcher exits once every handle is dropped, after draining the
/// tasks already accepted.
#[derive(Clone)]
pub struct TaskPool {
    name: Arc<str>,
    job_tx: mpsc::Sender<Task>,
    queue_capacity: usize,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("name", &self.name)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl TaskPool {
    /// Creates a pool. Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, concurrency: usize, queue_capacity: usize) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let concurrency = concurrency.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Task>(queue_capacity);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let dispatcher_name = Arc::clone(&name);
        tokio::spawn(async move {
            Self::dispatcher_loop(dispatcher_name, job_rx, semaphore, concurrency).await;
        });

        debug!(
            "TaskPool '{}' started with {} workers, queue {}",
            name, concurrency, queue_capacity
        );

        Self {
            name,
            job_tx,
            queue_capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for a free queue slot.
    ///
    /// Dropping the slot unused gives the room back.
    pub async fn reserve(&self) -> Result<PoolSlot> {
        let permit = self
            .job_tx
            .clone()
            .reserve_owned()
            .await
            .map_err(|_| Error::transport(format!("task pool '{}' is closed", self.name)))?;
        Ok(PoolSlot { permit })
    }

    /// Queues a task without waiting.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.job_tx.try_send(task.boxed()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::queue_full(self.name.to_string(), self.queue_capacity)
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::transport(format!("task pool '{}' is closed", self.name))
            }
        })
    }

    async fn dispatcher_loop(
        name: Arc<str>,
        mut job_rx: mpsc::Receiver<Task>,
        semaphore: Arc<Semaphore>,
        max_in_flight: usize,
    ) {
        let mut join_set: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                maybe_job = job_rx.recv() => {
                    let Some(job) = maybe_job else {
                        debug!("TaskPool '{}': channel closed, draining tasks", name);
                        break;
                    };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(e) => {
                            error!("TaskPool '{}' semaphore closed unexpectedly: {}", name, e);
                            continue;
                        }
                    };

                    let task_name = Arc::clone(&name);
                    join_set.spawn(async move {
                        let _permit = permit;
                        Self::run_with_panic_recovery(&task_name, job).await;
                    });

                    // Finished tasks stay in the JoinSet until joined.
                    while join_set.len() > max_in_flight {
                        let _ = join_set.join_next().await;
                    }
                }
                join_res = join_set.join_next(), if !join_set.is_empty() => {
                    if let Some(Err(e)) = join_res {
                        warn!("TaskPool '{}' worker ended abnormally: {}", name, e);
                    }
                }
            }
        }

        while let Some(res) = join_set.join_next().await {
            if let Err(e) = res {
                warn!("TaskPool '{}' worker ended abnormally during drain: {}", name, e);
            }
        }
    }

    async fn run_with_panic_recovery(name: &str, job: Task) {
        if let Err(panic_info) = AssertUnwindSafe(job).catch_unwind().await {
            let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!("{}", Error::task_panic(name, panic_msg));
        }
    }
}

/// A reserved place in a pool's queue.
pub struct PoolSlot {
    permit: mpsc::OwnedPermit<Task>,
}

impl PoolSlot {
    /// Queues `task` in the reserved place. Never fails.
    pub fn submit<F>(self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.permit.send(task.boxed());
    }
}
