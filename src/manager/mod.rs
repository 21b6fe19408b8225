//! Download manager
//!
//! Schedules item downloads across a fixed-size worker pool with bounded
//! memory, retries transient failures with linear backoff, serializes
//! mutations per task, and maintains the task/item status invariants.
//!
//! The manager and its methods are organized by domain:
//! - [`worker`] - worker loop and the item state machine
//! - [`fetch`] - resumable single-stream HTTP download
//! - [`recovery`] - crash-recovery requeue at startup

mod fetch;
mod recovery;
mod worker;


use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::TaskStore;
use crate::types::{Task, TaskId};

/// Work queue capacity; producers block when it fills up, which is the
/// admission-control backpressure for task creation
const QUEUE_CAPACITY: usize = 1024;

/// Number of per-task lock shards. Tasks are mapped onto shards by hashed
/// id, so memory stays capped no matter how many tasks the process sees;
/// two tasks sharing a shard only serialize against each other.
const LOCK_SHARDS: usize = 64;

/// Worker pool size used when the configured count is zero
const DEFAULT_WORKER_COUNT: usize = 4;

/// An in-memory work reference: one item of one task
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    pub(crate) task_id: TaskId,
    pub(crate) item_index: usize,
}

/// Download manager configuration
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Directory downloaded files land in
    pub data_dir: PathBuf,

    /// Worker pool size (0 falls back to 4)
    pub worker_count: usize,

    /// Maximum retries per item; 0 means a single attempt
    pub max_retry_per_item: u32,

    /// Linear backoff base: attempt `n` is re-queued after `n * base_backoff`
    pub base_backoff: Duration,

    /// Trigger a store snapshot every N processed tickets; 0 disables
    pub snapshot_every_n: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            worker_count: DEFAULT_WORKER_COUNT,
            max_retry_per_item: 3,
            base_backoff: Duration::from_millis(500),
            snapshot_every_n: 0,
        }
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            worker_count: config.workers,
            max_retry_per_item: config.retry_max,
            base_backoff: config.retry_backoff,
            snapshot_every_n: config.snapshot_every_n,
        }
    }
}

/// Fixed pool of mutex shards serializing all mutations of a single task
pub(crate) struct TaskLocks {
    shards: Vec<Arc<Mutex<()>>>,
}

impl TaskLocks {
    fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count).map(|_| Arc::new(Mutex::new(()))).collect();
        Self { shards }
    }

    /// The shard lock guarding a task's items
    pub(crate) fn for_task(&self, id: &TaskId) -> Arc<Mutex<()>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        Arc::clone(&self.shards[index])
    }
}

/// The download manager: worker pool, bounded ticket queue, per-task
/// serialization, and the retry scheduler
///
/// Owned behind an `Arc`; workers and retry timers hold clones of the same
/// instance.
pub struct DownloadManager {
    pub(crate) config: ManagerConfig,
    pub(crate) store: Arc<TaskStore>,
    pub(crate) client: reqwest::Client,
    pub(crate) queue_tx: mpsc::Sender<Ticket>,
    pub(crate) queue_rx: Mutex<mpsc::Receiver<Ticket>>,
    pub(crate) task_locks: TaskLocks,
    pub(crate) cancel: CancellationToken,
    accepting_new: AtomicBool,
    stopped: AtomicBool,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    pub(crate) processed: AtomicUsize,
}

impl DownloadManager {
    /// Create a manager over an open store
    ///
    /// A zero `worker_count` is normalized to the default of 4. The HTTP
    /// client carries no request timeout: downloads may be large and slow,
    /// and outer operational policy can impose one if needed.
    pub fn new(store: Arc<TaskStore>, mut config: ManagerConfig) -> Self {
        if config.worker_count == 0 {
            config.worker_count = DEFAULT_WORKER_COUNT;
        }
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            config,
            store,
            client: reqwest::Client::new(),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            task_locks: TaskLocks::new(LOCK_SHARDS),
            cancel: CancellationToken::new(),
            accepting_new: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            processed: AtomicUsize::new(0),
        }
    }

    /// Run the crash-recovery requeue, then spawn the worker pool
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.requeue_incomplete().await?;

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.worker_count {
            let manager = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                manager.run_worker(worker_id).await;
            }));
        }
        tracing::info!(workers = self.config.worker_count, "Download manager started");
        Ok(())
    }

    /// Create a task from a batch of URLs and enqueue every item
    ///
    /// Persists the task before any ticket is enqueued; a store failure
    /// rejects the request. Enqueueing blocks while the queue is full.
    pub async fn create_task(&self, urls: Vec<String>) -> Result<TaskId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if urls.is_empty() {
            return Err(Error::InvalidRequest("urls is required".to_string()));
        }

        let task = Task::new(urls);
        self.store.upsert(&task).await?;

        let task_id = task.id.clone();
        for item_index in 0..task.items.len() {
            let ticket = Ticket {
                task_id: task_id.clone(),
                item_index,
            };
            self.queue_tx
                .send(ticket)
                .await
                .map_err(|_| Error::ShuttingDown)?;
        }

        tracing::info!(task_id = %task_id, items = task.items.len(), "Task created");
        Ok(task_id)
    }

    /// All tasks, ordered by creation time (then id, for a stable listing)
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks = self.store.list().await;
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    /// Fetch a single task by id
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.store.get(id).await
    }

    /// Stop accepting work, signal the workers, and wait for them to drain
    ///
    /// Single-shot: later calls return `Ok` immediately. Workers finish the
    /// ticket they hold and exit between tickets; if they have not drained
    /// by the deadline a `ShutdownTimedOut` error is returned and they are
    /// left running detached rather than killed mid-copy.
    pub async fn stop_and_wait(&self, deadline: Duration) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.accepting_new.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };

        let drain = async {
            for handle in handles {
                if let Err(error) = handle.await {
                    tracing::warn!(%error, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(deadline, drain).await {
            Ok(()) => {
                tracing::info!("Download manager stopped");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Shutdown deadline expired with workers still running"
                );
                Err(Error::ShutdownTimedOut)
            }
        }
    }
}
