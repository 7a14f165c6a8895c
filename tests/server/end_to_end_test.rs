//! Foreground server driving a real background context.

#[path = "../common/mod.rs"]
mod common;

use common::{
    files, next_response, snapshot_factory, snapshot_files, snapshot_request, worker_settings,
    SNAPSHOT, TEST_BACKGROUND_NAME, TIMEOUT,
};
use serde_json::json;
use twinlsp::analysis::request::ANALYSIS_COMPLETE;
use twinlsp::entry::entry_script;
use twinlsp::server::{ForegroundServer, ServerError};

fn server() -> ForegroundServer {
    ForegroundServer::new(
        worker_settings(),
        entry_script(TEST_BACKGROUND_NAME, snapshot_factory()),
    )
}

#[tokio::test]
async fn test_background_mirrors_foreground_files() {
    let server = server();
    let workspace = server
        .initialize(files(&[
            ("/src/app.py", "import util"),
            ("/src/util.py", "VALUE = 1"),
            ("/pyrightconfig.json", "{}"),
        ]))
        .unwrap();
    let background = workspace.background().clone();
    let mut responses = background.take_responses().unwrap();

    tokio::time::timeout(TIMEOUT, background.wait_ready())
        .await
        .expect("handshake did not complete");

    server.create_file("file:///src/new_module.py").unwrap();
    server.delete_file("file:///src/util.py").unwrap();
    background.enqueue_request(snapshot_request()).unwrap();

    let snapshot = next_response(&mut responses, SNAPSHOT).await;
    assert_eq!(snapshot_files(&snapshot), server.file_system().files());
    assert_eq!(
        snapshot_files(&snapshot),
        files(&[
            ("/pyrightconfig.json", "{}"),
            ("/src/app.py", "import util"),
            ("/src/new_module.py", ""),
        ])
    );
    assert_eq!(snapshot.data["workerIndex"], json!(1));
    assert_eq!(snapshot.data["workerData"], json!({"rootPath": "/", "workerIndex": 1}));

    server.shutdown().await;
}

#[tokio::test]
async fn test_every_change_invalidates_the_workspace() {
    let server = server();
    let workspace = server.initialize(files(&[("/a.py", "")])).unwrap();
    let mut responses = workspace.background().take_responses().unwrap();

    server.create_file("/b.py").unwrap();
    server.delete_file("/a.py").unwrap();
    assert_eq!(workspace.invalidation_count(), 3);

    let first = next_response(&mut responses, ANALYSIS_COMPLETE).await;
    assert_eq!(
        first.data,
        json!({"reason": "settingsChanged", "fileCount": 1, "pass": 1, "searchPaths": []})
    );

    let second = next_response(&mut responses, ANALYSIS_COMPLETE).await;
    assert_eq!(
        second.data,
        json!({"reason": "reanalyzed", "fileCount": 2, "pass": 2, "searchPaths": []})
    );

    let third = next_response(&mut responses, ANALYSIS_COMPLETE).await;
    assert_eq!(
        third.data,
        json!({"reason": "reanalyzed", "fileCount": 1, "pass": 3, "searchPaths": []})
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_initialize_twice_is_rejected() {
    let server = server();
    server.initialize(files(&[("/a.py", "x")])).unwrap();

    assert!(matches!(
        server.initialize(files(&[("/b.py", "y")])),
        Err(ServerError::AlreadyInitialized)
    ));
    assert_eq!(server.initial_files(), Some(files(&[("/a.py", "x")])));
    assert_eq!(server.workspaces().len(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_changes_before_initialize_stay_local() {
    let server = server();
    server.create_file("/early.py").unwrap();

    assert!(server.workspaces().is_empty());
    assert_eq!(server.file_system().files(), files(&[("/early.py", "")]));
}

#[tokio::test]
async fn test_deleting_a_missing_file_is_harmless() {
    let server = server();
    let workspace = server.initialize(files(&[("/kept.py", "pass")])).unwrap();
    let background = workspace.background().clone();
    let mut responses = background.take_responses().unwrap();

    server.delete_file("file:///never/existed.py").unwrap();
    background.enqueue_request(snapshot_request()).unwrap();

    let snapshot = next_response(&mut responses, SNAPSHOT).await;
    assert_eq!(snapshot_files(&snapshot), files(&[("/kept.py", "pass")]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_releases_workspaces() {
    let server = server();
    let workspace = server.initialize(files(&[("/a.py", "")])).unwrap();
    tokio::time::timeout(TIMEOUT, workspace.background().wait_ready())
        .await
        .expect("handshake did not complete");

    tokio::time::timeout(TIMEOUT, server.shutdown())
        .await
        .expect("shutdown hung");

    assert!(server.workspaces().is_empty());
    assert!(workspace.background().enqueue_request(snapshot_request()).is_err());
}

#[tokio::test]
async fn test_seed_create_delete_converges_on_both_sides() {
    let server = server();
    let workspace = server.initialize(files(&[("/a.txt", "hello")])).unwrap();
    let background = workspace.background().clone();
    let mut responses = background.take_responses().unwrap();

    server.create_file("/b.txt").unwrap();
    server.delete_file("/a.txt").unwrap();
    background.enqueue_request(snapshot_request()).unwrap();

    let expected = files(&[("/b.txt", "")]);
    assert_eq!(server.file_system().files(), expected);
    let snapshot = next_response(&mut responses, SNAPSHOT).await;
    assert_eq!(snapshot_files(&snapshot), expected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_failed_initialize_can_be_retried() {
    let mut settings = worker_settings();
    settings.root_path = "${TWINLSP_TEST_ROOT_NEVER_SET}".to_string();
    let server = ForegroundServer::new(
        settings,
        entry_script(TEST_BACKGROUND_NAME, snapshot_factory()),
    );

    for _ in 0..2 {
        assert!(matches!(
            server.initialize(files(&[("/a.py", "x")])),
            Err(ServerError::Settings(_))
        ));
    }
    assert_eq!(server.initial_files(), None);
    assert!(server.workspaces().is_empty());
    assert!(server.file_system().files().is_empty());
}

#[tokio::test]
async fn test_deleting_a_directory_still_reaches_the_background() {
    let server = server();
    let workspace = server.initialize(files(&[("/pkg/a.py", "")])).unwrap();
    let background = workspace.background().clone();
    let mut responses = background.take_responses().unwrap();

    server.delete_file("file:///pkg").unwrap();
    assert_eq!(workspace.invalidation_count(), 2);
    background.enqueue_request(snapshot_request()).unwrap();

    let snapshot = next_response(&mut responses, SNAPSHOT).await;
    assert_eq!(snapshot_files(&snapshot), files(&[("/pkg/a.py", "")]));
    assert_eq!(server.file_system().files(), files(&[("/pkg/a.py", "")]));

    server.shutdown().await;
}
