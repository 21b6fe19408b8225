//! End-to-end scenarios over the full store + manager pipeline against a
//! mock HTTP origin.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use fetchd::{
    derive_file_name, DownloadManager, ItemStatus, ManagerConfig, Task, TaskId, TaskStatus,
    TaskStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Service {
    manager: Arc<DownloadManager>,
    data_dir: PathBuf,
    state_dir: PathBuf,
    _dir: TempDir,
}

async fn start_service(mutate: impl FnOnce(&mut ManagerConfig)) -> Service {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let state_dir = dir.path().join("state");

    let store = Arc::new(TaskStore::open(&state_dir, false).await.unwrap());
    let mut config = ManagerConfig {
        data_dir: data_dir.clone(),
        worker_count: 2,
        max_retry_per_item: 2,
        base_backoff: Duration::from_millis(10),
        snapshot_every_n: 0,
    };
    mutate(&mut config);

    let manager = Arc::new(DownloadManager::new(store, config));
    manager.start().await.unwrap();

    Service {
        manager,
        data_dir,
        state_dir,
        _dir: dir,
    }
}

async fn wait_for_status(service: &Service, id: &TaskId, status: TaskStatus) -> Task {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        if let Some(task) = service.manager.get(id).await {
            if task.status == status {
                return task;
            }
        }
        assert!(
            Instant::now() < deadline,
            "task {id} did not reach {status:?} in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Scenario: one URL, origin answers 200 with a small body. The task
/// completes, the file lands under its derived name with the right bytes,
/// and the item records its sizes.
#[tokio::test]
async fn single_url_download_completes_with_derived_filename() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"XYZ".to_vec()))
        .mount(&origin)
        .await;

    let service = start_service(|_| {}).await;
    let url = format!("{}/a.zip", origin.uri());
    let id = service.manager.create_task(vec![url.clone()]).await.unwrap();

    let task = wait_for_status(&service, &id, TaskStatus::Completed).await;

    let item = &task.items[0];
    assert_eq!(item.status, ItemStatus::Done);
    assert_eq!(item.size_downloaded, 3);
    assert_eq!(item.size_expected, 3);

    let expected_name = derive_file_name(&url);
    assert!(expected_name.ends_with(".zip"));
    assert_eq!(item.file_name, expected_name);

    let file_path = service.data_dir.join(&expected_name);
    assert_eq!(std::fs::read(&file_path).unwrap(), b"XYZ");
    assert_eq!(
        std::fs::metadata(&file_path).unwrap().len(),
        item.size_downloaded
    );

    service
        .manager
        .stop_and_wait(Duration::from_secs(5))
        .await
        .unwrap();
}

/// Scenario: two URLs where one origin path always fails. The healthy item
/// completes, the failing item exhausts its retries with
/// `attempts = max_retry + 1`, and the task ends `failed`.
#[tokio::test]
async fn mixed_outcome_task_ends_failed_after_retry_exhaustion() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad.bin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/good.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&origin)
        .await;

    let service = start_service(|config| {
        config.max_retry_per_item = 2;
        config.base_backoff = Duration::from_millis(10);
    })
    .await;

    let bad_url = format!("{}/bad.bin", origin.uri());
    let good_url = format!("{}/good.bin", origin.uri());
    let id = service
        .manager
        .create_task(vec![bad_url, good_url])
        .await
        .unwrap();

    let task = wait_for_status(&service, &id, TaskStatus::Failed).await;

    let bad = &task.items[0];
    assert_eq!(bad.status, ItemStatus::Error);
    assert_eq!(bad.attempts, 3, "initial attempt + 2 retries");
    assert_eq!(
        bad.error_message.as_deref(),
        Some("bad status: 500 Internal Server Error")
    );

    let good = &task.items[1];
    assert_eq!(good.status, ItemStatus::Done);
    assert_eq!(good.size_downloaded, 2);

    service
        .manager
        .stop_and_wait(Duration::from_secs(5))
        .await
        .unwrap();
}

/// Scenario: a process died mid-download leaving persisted `downloading`
/// state and a `.part` file. After restart, recovery re-queues the item and
/// the worker resumes with a `Range` request; the origin's 206 completes
/// the file.
#[tokio::test]
async fn restart_resumes_partial_download_with_range_request() {
    let origin = MockServer::start().await;
    // Only the correctly-ranged request is mocked; a full re-fetch would
    // 404 and fail the test.
    Mock::given(method("GET"))
        .and(path("/big.bin"))
        .and(header("Range", "bytes=5-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b" WORLD".to_vec()))
        .mount(&origin)
        .await;

    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let state_dir = dir.path().join("state");
    let url = format!("{}/big.bin", origin.uri());
    let file_name = derive_file_name(&url);

    // Simulate the pre-crash world: persisted mid-flight task + partial file.
    let task_id = {
        let store = TaskStore::open(&state_dir, false).await.unwrap();
        let mut task = Task::new(vec![url.clone()]);
        task.status = TaskStatus::Running;
        task.items[0].status = ItemStatus::Downloading;
        task.items[0].attempts = 1;
        task.items[0].size_downloaded = 5;
        store.upsert(&task).await.unwrap();
        store.close().await.unwrap();
        task.id
    };
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join(format!("{file_name}.part")), b"HELLO").unwrap();

    // Restart.
    let store = Arc::new(TaskStore::open(&state_dir, false).await.unwrap());
    let manager = Arc::new(DownloadManager::new(
        store,
        ManagerConfig {
            data_dir: data_dir.clone(),
            worker_count: 1,
            max_retry_per_item: 0,
            base_backoff: Duration::from_millis(10),
            snapshot_every_n: 0,
        },
    ));
    manager.start().await.unwrap();

    let service = Service {
        manager,
        data_dir: data_dir.clone(),
        state_dir,
        _dir: dir,
    };
    let task = wait_for_status(&service, &task_id, TaskStatus::Completed).await;

    let item = &task.items[0];
    assert_eq!(item.status, ItemStatus::Done);
    assert_eq!(item.size_downloaded, 11, "offset + resumed bytes");
    assert_eq!(item.attempts, 1, "attempts counter survives the restart");

    let contents = std::fs::read(service.data_dir.join(&file_name)).unwrap();
    assert_eq!(contents, b"HELLO WORLD");

    service
        .manager
        .stop_and_wait(Duration::from_secs(5))
        .await
        .unwrap();
}

/// Scenario: a URL with no path extension gets a bare 32-hex filename.
#[tokio::test]
async fn extension_less_url_yields_bare_hex_filename() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .mount(&origin)
        .await;

    let service = start_service(|_| {}).await;
    let url = format!("{}/x", origin.uri());
    let id = service.manager.create_task(vec![url.clone()]).await.unwrap();

    let task = wait_for_status(&service, &id, TaskStatus::Completed).await;

    let name = &task.items[0].file_name;
    assert_eq!(name.len(), 32);
    assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(service.data_dir.join(name).exists());

    service
        .manager
        .stop_and_wait(Duration::from_secs(5))
        .await
        .unwrap();
}

/// Scenario: three tasks of three items each drain through a two-worker
/// pool; every item ends `done` and every file exists.
#[tokio::test]
async fn worker_pool_drains_multiple_tasks() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&origin)
        .await;

    let service = start_service(|config| config.worker_count = 2).await;

    let mut ids = Vec::new();
    for task_index in 0..3 {
        let urls: Vec<String> = (0..3)
            .map(|item_index| format!("{}/t{task_index}-i{item_index}.bin", origin.uri()))
            .collect();
        ids.push(service.manager.create_task(urls).await.unwrap());
    }

    for id in &ids {
        let task = wait_for_status(&service, id, TaskStatus::Completed).await;
        assert_eq!(task.items.len(), 3);
        for item in &task.items {
            assert_eq!(item.status, ItemStatus::Done);
            assert!(service.data_dir.join(&item.file_name).exists());
        }
    }

    let listed = service.manager.list().await;
    assert_eq!(listed.len(), 3);

    service
        .manager
        .stop_and_wait(Duration::from_secs(5))
        .await
        .unwrap();
}

/// Scenario: with `snapshot_every_n = 5` and 12 processed items, snapshots
/// fire and rotate the WAL, so the log stays far shorter than the full
/// mutation history.
#[tokio::test]
async fn snapshot_cadence_rotates_the_wal() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"snap".to_vec()))
        .mount(&origin)
        .await;

    let service = start_service(|config| {
        config.worker_count = 1;
        config.snapshot_every_n = 5;
    })
    .await;

    let mut ids = Vec::new();
    for task_index in 0..4 {
        let urls: Vec<String> = (0..3)
            .map(|item_index| format!("{}/s{task_index}-{item_index}.bin", origin.uri()))
            .collect();
        ids.push(service.manager.create_task(urls).await.unwrap());
    }
    for id in &ids {
        wait_for_status(&service, id, TaskStatus::Completed).await;
    }
    service
        .manager
        .stop_and_wait(Duration::from_secs(5))
        .await
        .unwrap();

    let snapshot_path = service.state_dir.join("state.snapshot.json");
    assert!(snapshot_path.exists(), "periodic snapshots must have fired");
    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    assert!(
        !snapshot.as_object().unwrap().is_empty(),
        "snapshot carries task records"
    );

    // 12 items produce roughly 30 WAL records in total (4 upserts plus
    // per-item downloading/done updates). Rotation at the 5th and 10th
    // processed items leaves only the post-rotation tail behind.
    let wal = std::fs::read_to_string(service.state_dir.join("state.wal")).unwrap();
    let lines = wal.lines().filter(|line| !line.trim().is_empty()).count();
    assert!(
        lines < 15,
        "WAL should have been rotated by periodic snapshots, found {lines} records"
    );

    // Restart sees the snapshot + tail, not an empty world.
    let reopened = TaskStore::open(&service.state_dir, false).await.unwrap();
    assert_eq!(reopened.list().await.len(), 4);
}

/// Restart with nothing in flight is a no-op: completed tasks stay
/// completed and nothing is re-queued.
#[tokio::test]
async fn restart_after_clean_completion_requeues_nothing() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"done".to_vec()))
        .mount(&origin)
        .await;

    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let state_dir = dir.path().join("state");

    let id = {
        let store = Arc::new(TaskStore::open(&state_dir, false).await.unwrap());
        let manager = Arc::new(DownloadManager::new(
            Arc::clone(&store),
            ManagerConfig {
                data_dir: data_dir.clone(),
                worker_count: 1,
                max_retry_per_item: 0,
                base_backoff: Duration::from_millis(10),
                snapshot_every_n: 0,
            },
        ));
        manager.start().await.unwrap();
        let id = manager
            .create_task(vec![format!("{}/once.bin", origin.uri())])
            .await
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            if manager.get(&id).await.unwrap().status == TaskStatus::Completed {
                break;
            }
            assert!(Instant::now() < deadline, "first run did not complete");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        manager.stop_and_wait(Duration::from_secs(5)).await.unwrap();
        store.close().await.unwrap();
        id
    };

    let store = Arc::new(TaskStore::open(&state_dir, false).await.unwrap());
    let manager = Arc::new(DownloadManager::new(
        Arc::clone(&store),
        ManagerConfig {
            data_dir,
            worker_count: 1,
            max_retry_per_item: 0,
            base_backoff: Duration::from_millis(10),
            snapshot_every_n: 0,
        },
    ));
    manager.start().await.unwrap();

    let task = manager.get(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.items[0].status, ItemStatus::Done);

    manager.stop_and_wait(Duration::from_secs(5)).await.unwrap();
}
