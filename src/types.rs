//! Core types for fetchd
//!
//! The task/item model shared by the store, the download manager, and the
//! REST API, plus the deterministic URL-to-filename derivation that lets a
//! restarted process find its earlier partial downloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Unique identifier for a task
///
/// A 128-bit random value, hex-encoded to 32 lowercase characters. The id
/// is opaque to every component except the store, which uses it as the map
/// key, so it serializes transparently as a plain JSON string.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random task id
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Borrow the hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, no item picked up yet (also the post-restart reset state)
    Pending,
    /// At least one item has been picked up by a worker
    Running,
    /// Every item finished successfully
    Completed,
    /// At least one item exhausted its retries and nothing is left in flight
    Failed,
}

/// Item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting in the work queue
    Queued,
    /// A worker is streaming the response body to disk
    Downloading,
    /// Downloaded and renamed into place
    Done,
    /// Last attempt failed; terminal once retries are exhausted
    Error,
}

/// A user-submitted batch of URLs to download, plus its lifecycle state
///
/// The `items` ordering is position-stable for the task's lifetime: tickets
/// reference items by index, so items are never inserted, removed, or
/// reordered after creation.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// When the task was submitted
    pub created_at: DateTime<Utc>,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// One item per submitted URL, in submission order
    pub items: Vec<Item>,
}

/// One URL within a task; the unit of scheduling and retry
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Item {
    /// Source URL, opaque to the core
    pub url: String,

    /// Deterministic on-disk filename derived from the URL
    pub file_name: String,

    /// Current item status
    pub status: ItemStatus,

    /// Number of failed attempts so far (monotonically increasing)
    #[serde(default)]
    pub attempts: u32,

    /// Last failure cause, absent when the item has never failed or has
    /// since succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Total expected size in bytes, 0 (and omitted) when unknown
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size_expected: u64,

    /// Bytes successfully written to disk
    #[serde(default)]
    pub size_downloaded: u64,

    /// When a worker first picked the item up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the item reached `done`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Task {
    /// Build a new pending task with one queued item per URL
    pub fn new(urls: Vec<String>) -> Self {
        let items = urls.into_iter().map(Item::new).collect();
        Self {
            id: TaskId::generate(),
            created_at: Utc::now(),
            status: TaskStatus::Pending,
            items,
        }
    }

    /// True when every item has finished successfully
    pub fn all_done(&self) -> bool {
        self.items.iter().all(|item| item.status == ItemStatus::Done)
    }

    /// True while any item is still queued or downloading
    pub fn any_active(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item.status, ItemStatus::Queued | ItemStatus::Downloading))
    }
}

impl Item {
    /// Build a queued item for a URL with its derived filename
    pub fn new(url: String) -> Self {
        let file_name = derive_file_name(&url);
        Self {
            url,
            file_name,
            status: ItemStatus::Queued,
            attempts: 0,
            error_message: None,
            size_expected: 0,
            size_downloaded: 0,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Derive a deterministic filename from a URL
///
/// The name is a pure function of the URL string: SHA-256 of the full URL,
/// first 16 bytes hex-encoded (32 characters). When the URL path's basename
/// carries an extension of 1 to 10 characters (dot included) and contains no
/// `?`, the extension is appended so the downloaded file stays openable;
/// otherwise the bare hex name is used. Replays and restarts therefore always
/// map a URL to the same partial file. Collisions are treated as user error.
pub fn derive_file_name(raw_url: &str) -> String {
    let digest = Sha256::digest(raw_url.as_bytes());
    let stem = hex::encode(&digest[..16]);

    if let Ok(parsed) = url::Url::parse(raw_url) {
        let base = parsed.path().rsplit('/').next().unwrap_or("");
        if !base.is_empty() && base != "." && !base.contains('?') {
            if let Some(dot) = base.rfind('.') {
                let ext = &base[dot..];
                if ext.len() <= 10 {
                    return format!("{stem}{ext}");
                }
            }
        }
    }
    stem
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn expected_stem(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        hex::encode(&digest[..16])
    }

    // --- TaskId generation ---

    #[test]
    fn generated_id_is_32_lowercase_hex_chars() {
        let id = TaskId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "id should be lowercase hex, got {id}"
        );
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_ne!(a, b, "two generated ids must differ");
    }

    #[test]
    fn task_id_serializes_as_plain_string() {
        let id = TaskId::from("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
    }

    // --- derive_file_name ---

    #[test]
    fn file_name_is_pure_function_of_url() {
        let url = "http://host/path/archive.zip";
        assert_eq!(
            derive_file_name(url),
            derive_file_name(url),
            "same URL must always yield the same name"
        );
    }

    #[test]
    fn file_name_keeps_short_extension() {
        let url = "http://host/a.zip";
        let name = derive_file_name(url);
        assert_eq!(name, format!("{}.zip", expected_stem(url)));
        assert_eq!(name.len(), 36);
    }

    #[test]
    fn file_name_without_extension_is_bare_hex() {
        let url = "http://h/x";
        let name = derive_file_name(url);
        assert_eq!(name, expected_stem(url));
        assert_eq!(name.len(), 32, "bare name is exactly 32 hex chars");
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn file_name_ignores_overlong_extension() {
        // ".verylongext" is 12 chars including the dot, over the 10-char cap
        let url = "http://host/file.verylongext";
        assert_eq!(derive_file_name(url), expected_stem(url));
    }

    #[test]
    fn file_name_keeps_ten_char_extension() {
        // ".abcdefghi" is exactly 10 chars including the dot
        let url = "http://host/file.abcdefghi";
        let name = derive_file_name(url);
        assert!(
            name.ends_with(".abcdefghi"),
            "10-char extension is kept, got {name}"
        );
    }

    #[test]
    fn file_name_hashes_full_url_so_query_changes_the_name() {
        let a = derive_file_name("http://host/a.zip?v=1");
        let b = derive_file_name("http://host/a.zip?v=2");
        assert_ne!(a, b, "query string is part of the hashed URL");
    }

    #[test]
    fn file_name_for_root_path_is_bare_hex() {
        let url = "http://host/";
        assert_eq!(derive_file_name(url), expected_stem(url));
    }

    #[test]
    fn file_name_for_unparseable_url_is_bare_hex() {
        let url = "not a url at all";
        let name = derive_file_name(url);
        assert_eq!(name, expected_stem(url));
        assert_eq!(name.len(), 32);
    }

    #[test]
    fn file_names_differ_for_different_urls() {
        assert_ne!(
            derive_file_name("http://host/a.zip"),
            derive_file_name("http://host/b.zip")
        );
    }

    // --- model serialization ---

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&TaskStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&TaskStatus::Failed).unwrap(), "\"failed\"");
        assert_eq!(serde_json::to_string(&ItemStatus::Queued).unwrap(), "\"queued\"");
        assert_eq!(
            serde_json::to_string(&ItemStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(serde_json::to_string(&ItemStatus::Done).unwrap(), "\"done\"");
        assert_eq!(serde_json::to_string(&ItemStatus::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn fresh_item_omits_unset_optional_fields() {
        let item = Item::new("http://host/a.zip".to_string());
        let value = serde_json::to_value(&item).unwrap();
        let object = value.as_object().unwrap();

        assert!(object.get("error_message").is_none(), "unset error_message is omitted");
        assert!(object.get("size_expected").is_none(), "zero size_expected is omitted");
        assert!(object.get("started_at").is_none());
        assert!(object.get("completed_at").is_none());
        assert_eq!(object["size_downloaded"], 0, "size_downloaded is always present");
        assert_eq!(object["status"], "queued");
    }

    #[test]
    fn item_with_progress_serializes_all_fields() {
        let mut item = Item::new("http://host/a.zip".to_string());
        item.size_expected = 100;
        item.size_downloaded = 40;
        item.error_message = Some("bad status: 500 Internal Server Error".to_string());
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["size_expected"], 100);
        assert_eq!(value["size_downloaded"], 40);
        assert_eq!(value["error_message"], "bad status: 500 Internal Server Error");
    }

    #[test]
    fn task_round_trips_through_json() {
        let task = Task::new(vec![
            "http://host/a.zip".to_string(),
            "http://host/b".to_string(),
        ]);
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, task.id);
        assert_eq!(back.items.len(), 2);
        assert_eq!(back.items[0].url, "http://host/a.zip");
        assert_eq!(back.items[1].url, "http://host/b");
        assert_eq!(back.status, TaskStatus::Pending);
    }

    #[test]
    fn new_task_preserves_url_order() {
        let urls: Vec<String> = (0..5).map(|i| format!("http://host/file-{i}.bin")).collect();
        let task = Task::new(urls.clone());
        let item_urls: Vec<&str> = task.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(item_urls, urls.iter().map(String::as_str).collect::<Vec<_>>());
    }

    // --- completion helpers ---

    #[test]
    fn all_done_requires_every_item_done() {
        let mut task = Task::new(vec!["http://h/a".into(), "http://h/b".into()]);
        assert!(!task.all_done());

        task.items[0].status = ItemStatus::Done;
        assert!(!task.all_done());

        task.items[1].status = ItemStatus::Done;
        assert!(task.all_done());
    }

    #[test]
    fn any_active_covers_queued_and_downloading() {
        let mut task = Task::new(vec!["http://h/a".into(), "http://h/b".into()]);
        assert!(task.any_active(), "fresh items are queued");

        task.items[0].status = ItemStatus::Error;
        task.items[1].status = ItemStatus::Downloading;
        assert!(task.any_active());

        task.items[1].status = ItemStatus::Done;
        assert!(!task.any_active(), "error + done leaves nothing in flight");
    }
}
