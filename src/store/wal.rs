//! Write-ahead log records and file plumbing
//!
//! The WAL is an append-only file of newline-delimited JSON records, fsynced
//! after every append. Replay is tolerant of a torn final line: a crash can
//! cut the last record mid-write, so replay stops at the first line that does
//! not parse instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::types::{Task, TaskId};

/// A single mutation recorded in the write-ahead log
///
/// Serialized as `{"type": "upsert_task" | "update_task", "data": {...}}`.
/// Both arms apply identically on replay (last-writer-wins by task id); the
/// distinction exists only for human inspection of the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WalRecord {
    /// A new or replacement task record
    UpsertTask {
        /// The full task state
        task: Task,
    },
    /// A mutation of an existing task record
    UpdateTask {
        /// Id of the mutated task
        task_id: TaskId,
        /// The full task state after the mutation
        task: Task,
    },
}

impl WalRecord {
    /// Apply this record to an in-memory task map (last-writer-wins)
    pub fn apply(self, tasks: &mut HashMap<TaskId, Task>) {
        match self {
            WalRecord::UpsertTask { task } => {
                tasks.insert(task.id.clone(), task);
            }
            WalRecord::UpdateTask { task_id, task } => {
                tasks.insert(task_id, task);
            }
        }
    }
}

/// Replay WAL contents onto a task map
///
/// Applies records in order until the first line that does not parse; the
/// tail may have been cut by a crash mid-append. Returns the number of
/// records applied.
pub fn replay(contents: &str, tasks: &mut HashMap<TaskId, Task>) -> usize {
    let mut applied = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WalRecord>(line) {
            Ok(record) => {
                record.apply(tasks);
                applied += 1;
            }
            Err(error) => {
                tracing::debug!(%error, "Stopping WAL replay at unparseable tail");
                break;
            }
        }
    }
    applied
}

/// Append-mode handle on the write-ahead log
///
/// Held exclusively by the store for the process lifetime; every append is
/// flushed and fsynced before the caller sees success.
pub struct WalWriter {
    file: File,
    path: PathBuf,
}

impl WalWriter {
    /// Open (creating if absent) the WAL for appending
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append one record and fsync it to disk
    pub async fn append(&mut self, record: &WalRecord) -> crate::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.sync_all().await?;
        Ok(())
    }

    /// Truncate the log to zero length and fsync
    ///
    /// Called after a snapshot has been renamed into place; the append-mode
    /// handle keeps writing at the (new) end of the file.
    pub async fn rotate(&mut self) -> std::io::Result<()> {
        self.file.set_len(0).await?;
        self.file.sync_all().await?;
        tracing::debug!(path = %self.path.display(), "Rotated write-ahead log");
        Ok(())
    }

    /// Final fsync before the handle is dropped
    pub async fn finish(mut self) -> std::io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await
    }
}
