//! Durable task store
//!
//! Crash-safe persistence of the task map with a single-writer,
//! multi-reader contract. Every mutation is appended to an fsynced
//! write-ahead log before it becomes visible in memory; periodic snapshots
//! consolidate the log so restart replay stays bounded.
//!
//! ## On-disk layout (all files in one state directory)
//!
//! - `state.snapshot.json`: pretty-printed JSON object, task id to task
//! - `state.snapshot.json.tmp`: transient, only exists mid-snapshot
//! - `state.wal`: newline-delimited JSON records, see [`wal`]
//!
//! ## Durability contract
//!
//! An `upsert`/`update` that returns `Ok` is fsynced to the WAL and survives
//! a crash. Snapshots only shorten replay time; they are not required for
//! correctness. The WAL is rotated (truncated) after each snapshot rename,
//! under the writer lock, so no record can land between the state copy and
//! the truncation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::types::{Task, TaskId};

pub mod wal;


use wal::{WalRecord, WalWriter};

/// Snapshot filename within the state directory
pub const SNAPSHOT_FILE: &str = "state.snapshot.json";
/// Transient snapshot filename used for the atomic rename
const SNAPSHOT_TMP_FILE: &str = "state.snapshot.json.tmp";
/// Write-ahead log filename within the state directory
pub const WAL_FILE: &str = "state.wal";

/// Durable store of task records
///
/// Lock order is always map before WAL writer; `save_snapshot` acquires the
/// writer lock while still holding the shared map lock for exactly this
/// reason.
pub struct TaskStore {
    state_dir: PathBuf,
    tasks: RwLock<HashMap<TaskId, Task>>,
    wal: Mutex<Option<WalWriter>>,
}

impl TaskStore {
    /// Open the store, creating the state directory if absent
    ///
    /// Installs the snapshot (if readable), replays the WAL on top of it,
    /// then opens the WAL for appending. A snapshot that exists but does not
    /// parse is a hard error unless `force_reset` is set, in which case the
    /// store logs a warning and starts empty.
    pub async fn open(state_dir: impl Into<PathBuf>, force_reset: bool) -> Result<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir).await?;

        let mut tasks = HashMap::new();

        let snapshot_path = state_dir.join(SNAPSHOT_FILE);
        match fs::read(&snapshot_path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<TaskId, Task>>(&bytes) {
                Ok(snapshot) => {
                    tracing::debug!(tasks = snapshot.len(), "Loaded snapshot");
                    tasks = snapshot;
                }
                Err(error) if force_reset => {
                    tracing::warn!(
                        path = %snapshot_path.display(),
                        %error,
                        "Snapshot is unreadable, starting empty (FORCE_RESET)"
                    );
                }
                Err(error) => {
                    return Err(Error::CorruptSnapshot {
                        path: snapshot_path,
                        reason: error.to_string(),
                    });
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        let wal_path = state_dir.join(WAL_FILE);
        match fs::read_to_string(&wal_path).await {
            Ok(contents) => {
                let applied = wal::replay(&contents, &mut tasks);
                if applied > 0 {
                    tracing::debug!(applied, "Replayed write-ahead log");
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        let writer = WalWriter::open(&wal_path).await?;

        tracing::info!(
            state_dir = %state_dir.display(),
            tasks = tasks.len(),
            "Task store opened"
        );

        Ok(Self {
            state_dir,
            tasks: RwLock::new(tasks),
            wal: Mutex::new(Some(writer)),
        })
    }

    /// Write a new or replacement task record
    ///
    /// Returns only after the record is fsynced to the WAL; on error the
    /// in-memory map is left untouched.
    pub async fn upsert(&self, task: &Task) -> Result<()> {
        self.write_record(task, WalRecord::UpsertTask { task: task.clone() })
            .await
    }

    /// Mutate an existing task record
    ///
    /// Mechanically identical to [`upsert`](Self::upsert); the WAL record
    /// type differs only for human inspection of the log.
    pub async fn update(&self, task: &Task) -> Result<()> {
        self.write_record(
            task,
            WalRecord::UpdateTask {
                task_id: task.id.clone(),
                task: task.clone(),
            },
        )
        .await
    }

    async fn write_record(&self, task: &Task, record: WalRecord) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let mut wal = self.wal.lock().await;
        let writer = wal.as_mut().ok_or(Error::StoreClosed)?;
        writer.append(&record).await?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    /// Fetch a task by id
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Owned copies of all task records, safe to iterate without the lock
    pub async fn list(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Number of stored tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// True when no tasks are stored
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Write a consolidated snapshot and rotate the WAL
    ///
    /// The map is copied under the shared lock; the WAL writer lock is taken
    /// before the map lock is released so the truncation cannot lose a
    /// record appended after the copy. The snapshot lands via write-to-tmp
    /// plus atomic rename.
    pub async fn save_snapshot(&self) -> Result<()> {
        let (snapshot, mut wal) = {
            let tasks = self.tasks.read().await;
            let wal = self.wal.lock().await;
            (tasks.clone(), wal)
        };
        let writer = wal.as_mut().ok_or(Error::StoreClosed)?;

        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.state_dir.join(SNAPSHOT_TMP_FILE);
        let snapshot_path = self.state_dir.join(SNAPSHOT_FILE);
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &snapshot_path).await?;
        writer.rotate().await?;

        tracing::debug!(tasks = snapshot.len(), "Snapshot saved");
        Ok(())
    }

    /// Flush and close the WAL handle; idempotent
    pub async fn close(&self) -> Result<()> {
        let mut wal = self.wal.lock().await;
        if let Some(writer) = wal.take() {
            writer.finish().await?;
            tracing::debug!("Task store closed");
        }
        Ok(())
    }

    /// The state directory this store persists into
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}
