//! Crash-recovery requeue
//!
//! The queue is in-memory only, so a restart loses every ticket. Recovery
//! walks the persisted tasks and re-enters each non-terminal item into the
//! pipeline before the workers spawn. `.part` files are not touched: their
//! presence makes the next GET resume from the correct offset.

use super::{DownloadManager, Ticket};
use crate::error::{Error, Result};
use crate::types::{ItemStatus, TaskStatus};

impl DownloadManager {
    /// Reconcile persisted state with the (empty) queue after a restart
    ///
    /// Every item that is not `done` is reset to `queued` (error message
    /// and timestamps cleared, the attempts counter preserved), persisted,
    /// and re-enqueued exactly once. A task whose items are all `done` is
    /// reconciled to `completed`; every other task is reset to `pending`.
    pub(crate) async fn requeue_incomplete(&self) -> Result<()> {
        let tasks = self.store.list().await;
        let mut requeued = 0usize;

        for mut task in tasks {
            let mut pending_indices = Vec::new();
            for (index, item) in task.items.iter_mut().enumerate() {
                if item.status == ItemStatus::Done {
                    continue;
                }
                item.status = ItemStatus::Queued;
                item.error_message = None;
                item.started_at = None;
                item.completed_at = None;
                pending_indices.push(index);
            }

            let target_status = if task.all_done() {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            };
            let dirty = !pending_indices.is_empty() || task.status != target_status;
            task.status = target_status;
            if dirty {
                self.store.update(&task).await?;
            }

            for item_index in pending_indices {
                let ticket = Ticket {
                    task_id: task.id.clone(),
                    item_index,
                };
                self.queue_tx
                    .send(ticket)
                    .await
                    .map_err(|_| Error::ShuttingDown)?;
                requeued += 1;
            }
        }

        if requeued > 0 {
            tracing::info!(requeued, "Re-queued unfinished items after restart");
        }
        Ok(())
    }
}
