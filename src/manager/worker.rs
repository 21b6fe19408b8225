//! Worker loop and the item state machine
//!
//! Workers pull tickets off the shared queue, serialize on the owning
//! task's lock shard, and drive items queued → downloading → done/error.
//! Every persisted transition goes through the store; store failures here
//! are logged with context rather than crashing the worker, and the
//! in-memory state stays authoritative until restart.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use super::{fetch, DownloadManager, Ticket};
use crate::error::Error;
use crate::types::{ItemStatus, Task, TaskStatus};

impl DownloadManager {
    /// A single worker: loop over tickets until the stop signal fires
    pub(crate) async fn run_worker(self: Arc<Self>, worker_id: usize) {
        tracing::debug!(worker_id, "Worker started");
        while let Some(ticket) = self.next_ticket().await {
            let lock = self.task_locks.for_task(&ticket.task_id);
            let guard = lock.lock().await;
            self.process_ticket(&ticket).await;
            drop(guard);

            let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
            if self.config.snapshot_every_n > 0 && processed % self.config.snapshot_every_n == 0 {
                match self.store.save_snapshot().await {
                    Ok(()) => tracing::debug!(processed, "Periodic snapshot written"),
                    Err(error) => tracing::warn!(%error, "Periodic snapshot failed"),
                }
            }
        }
        tracing::debug!(worker_id, "Worker stopped");
    }

    /// Wait for the next ticket, honoring the stop signal at both the
    /// receiver-lock and receive await points
    async fn next_ticket(&self) -> Option<Ticket> {
        let mut queue = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            guard = self.queue_rx.lock() => guard,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            ticket = queue.recv() => ticket,
        }
    }

    /// Drive one ticket through the state machine (caller holds the task's
    /// lock shard)
    async fn process_ticket(self: &Arc<Self>, ticket: &Ticket) {
        let Some(mut task) = self.store.get(&ticket.task_id).await else {
            tracing::warn!(task_id = %ticket.task_id, "Ticket references unknown task");
            return;
        };
        if ticket.item_index >= task.items.len() {
            tracing::warn!(
                task_id = %ticket.task_id,
                item = ticket.item_index,
                "Ticket references out-of-range item"
            );
            return;
        }
        if task.items[ticket.item_index].status == ItemStatus::Done {
            // Already finished (e.g. completed just before a restart requeue).
            return;
        }

        let (url, file_name) = {
            let item = &mut task.items[ticket.item_index];
            item.status = ItemStatus::Downloading;
            item.started_at = Some(Utc::now());
            (item.url.clone(), item.file_name.clone())
        };
        task.status = TaskStatus::Running;
        self.persist(&task).await;

        let report =
            fetch::fetch_to_disk(&self.client, &url, &self.config.data_dir, &file_name).await;

        {
            let item = &mut task.items[ticket.item_index];
            if let Some(expected) = report.size_expected {
                item.size_expected = expected;
            }
            item.size_downloaded = report.size_downloaded;
        }

        match report.result {
            Ok(()) => {
                {
                    let item = &mut task.items[ticket.item_index];
                    item.status = ItemStatus::Done;
                    item.completed_at = Some(Utc::now());
                    item.error_message = None;
                }
                if task.all_done() {
                    task.status = TaskStatus::Completed;
                }
                let completed = task.status == TaskStatus::Completed;
                self.persist(&task).await;
                tracing::info!(
                    task_id = %task.id,
                    item = ticket.item_index,
                    file = %file_name,
                    bytes = task.items[ticket.item_index].size_downloaded,
                    "Item downloaded"
                );
                if completed {
                    tracing::info!(task_id = %task.id, "Task completed");
                }
            }
            Err(error) => self.retry_or_fail(task, ticket.item_index, error).await,
        }
    }

    /// Record a failed attempt and either schedule a delayed retry or, once
    /// retries are exhausted and nothing is left in flight, fail the task
    async fn retry_or_fail(self: &Arc<Self>, mut task: Task, item_index: usize, cause: Error) {
        let attempts = {
            let item = &mut task.items[item_index];
            item.attempts += 1;
            item.status = ItemStatus::Error;
            item.error_message = Some(cause.to_string());
            item.attempts
        };
        self.persist(&task).await;

        if attempts <= self.config.max_retry_per_item {
            let delay = self.config.base_backoff * attempts;
            tracing::warn!(
                task_id = %task.id,
                item = item_index,
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %cause,
                "Item failed, retry scheduled"
            );
            let manager = Arc::clone(self);
            let task_id = task.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                manager.requeue_after_backoff(task_id, item_index).await;
            });
            return;
        }

        tracing::error!(
            task_id = %task.id,
            item = item_index,
            attempts,
            error = %cause,
            "Item failed permanently"
        );
        if !task.any_active() {
            task.status = TaskStatus::Failed;
            self.persist(&task).await;
            tracing::error!(task_id = %task.id, "Task failed");
        }
    }

    /// Timer callback for a scheduled retry
    ///
    /// Re-acquires the task's lock shard and re-reads the task before
    /// touching anything, so the flip back to `queued` cannot race a reader
    /// or another worker. The enqueue happens after the lock is released:
    /// blocking on a full queue while holding a shard lock could stall the
    /// very workers that would drain it.
    async fn requeue_after_backoff(self: &Arc<Self>, task_id: crate::types::TaskId, item_index: usize) {
        if self.cancel.is_cancelled() {
            return;
        }

        let lock = self.task_locks.for_task(&task_id);
        {
            let _guard = lock.lock().await;
            let Some(mut task) = self.store.get(&task_id).await else {
                return;
            };
            let Some(item) = task.items.get_mut(item_index) else {
                return;
            };
            if item.status != ItemStatus::Error {
                // A restart requeue beat the timer; don't enqueue twice.
                return;
            }
            item.status = ItemStatus::Queued;
            self.persist(&task).await;
        }

        let ticket = Ticket {
            task_id: task_id.clone(),
            item_index,
        };
        if self.queue_tx.send(ticket).await.is_err() {
            tracing::debug!(task_id = %task_id, "Queue closed, dropping retry ticket");
        }
    }

    /// Persist a task, logging (not propagating) store failures
    pub(crate) async fn persist(&self, task: &Task) {
        if let Err(error) = self.store.update(task).await {
            tracing::error!(task_id = %task.id, %error, "Failed to persist task state");
        }
    }
}
