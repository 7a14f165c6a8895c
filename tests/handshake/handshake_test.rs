//! Startup handshake between the foreground and a real background context.

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{
    files, next_response, snapshot_factory, snapshot_files, snapshot_request, SNAPSHOT,
    TEST_BACKGROUND_NAME, TIMEOUT,
};
use serde_json::json;
use twinlsp::entry::entry_script;
use twinlsp::handshake::foreground::{
    BackgroundAnalysisOptions, HandshakeState, WorkerIndexAllocator,
};
use twinlsp::handshake::{BackgroundAnalysis, HandshakeError};
use twinlsp::threads::{self, Script, Value};

fn options() -> BackgroundAnalysisOptions {
    BackgroundAnalysisOptions {
        background_name: TEST_BACKGROUND_NAME.to_string(),
        root_path: "/workspace".to_string(),
        cancellation_channel_name: None,
        warn_after: None,
    }
}

fn start(allocator: &WorkerIndexAllocator) -> BackgroundAnalysis {
    let script = entry_script(TEST_BACKGROUND_NAME, snapshot_factory());
    BackgroundAnalysis::new(&script, options(), allocator).unwrap()
}

async fn ready(background: &BackgroundAnalysis) {
    tokio::time::timeout(TIMEOUT, background.wait_ready())
        .await
        .expect("handshake did not complete");
}

#[tokio::test]
async fn test_not_ready_until_handshake_completes() {
    let background = start(&WorkerIndexAllocator::new());

    assert!(!background.is_ready());
    assert_eq!(
        background.handshake_state(),
        HandshakeState::AwaitingWorkerStarted
    );

    ready(&background).await;
    assert!(background.is_ready());
    assert_eq!(background.handshake_state(), HandshakeState::Ready);

    background.terminate().await;
}

#[tokio::test]
async fn test_handshake_listener_is_removed_when_ready() {
    let background = start(&WorkerIndexAllocator::new());
    // Handshake listener plus response listener.
    assert_eq!(background.worker().context().listener_count(), 2);

    ready(&background).await;
    assert_eq!(background.worker().context().listener_count(), 1);

    background.terminate().await;
}

#[tokio::test]
async fn test_background_receives_initialization_data() {
    let background = start(&WorkerIndexAllocator::new());
    let mut responses = background.take_responses().unwrap();

    background.enqueue_request(snapshot_request()).unwrap();
    let snapshot = next_response(&mut responses, SNAPSHOT).await;

    assert_eq!(snapshot.data["workerIndex"], json!(1));
    assert_eq!(snapshot.data["threadId"], json!(TEST_BACKGROUND_NAME));
    assert_eq!(snapshot.data["isMainThread"], json!(false));
    assert_eq!(
        snapshot.data["workerData"],
        json!({"rootPath": "/workspace", "workerIndex": 1})
    );

    background.terminate().await;
}

#[tokio::test]
async fn test_shared_allocator_gives_distinct_indices() {
    let allocator = WorkerIndexAllocator::new();
    let first = start(&allocator);
    let second = start(&allocator);

    assert_eq!(first.worker_index(), 1);
    assert_eq!(second.worker_index(), 2);

    let mut responses = second.take_responses().unwrap();
    second.enqueue_request(snapshot_request()).unwrap();
    let snapshot = next_response(&mut responses, SNAPSHOT).await;
    assert_eq!(snapshot.data["workerIndex"], json!(2));

    first.terminate().await;
    second.terminate().await;
}

#[tokio::test]
async fn test_requests_queued_before_readiness_keep_their_order() {
    let background = start(&WorkerIndexAllocator::new());
    let mut responses = background.take_responses().unwrap();
    assert!(!background.is_ready());

    background
        .initial_files(&files(&[("/workspace/main.py", "import os")]))
        .unwrap();
    background.enqueue_request(snapshot_request()).unwrap();
    background.create_file("file:///workspace/extra.py").unwrap();
    background.enqueue_request(snapshot_request()).unwrap();
    background.delete_file("/workspace/main.py").unwrap();
    background.enqueue_request(snapshot_request()).unwrap();

    let first = snapshot_files(&next_response(&mut responses, SNAPSHOT).await);
    assert_eq!(first, files(&[("/workspace/main.py", "import os")]));

    let second = snapshot_files(&next_response(&mut responses, SNAPSHOT).await);
    assert_eq!(
        second,
        files(&[("/workspace/extra.py", ""), ("/workspace/main.py", "import os")])
    );

    let third = snapshot_files(&next_response(&mut responses, SNAPSHOT).await);
    assert_eq!(third, files(&[("/workspace/extra.py", "")]));

    background.terminate().await;
}

#[tokio::test]
async fn test_unknown_and_out_of_order_status_messages_are_ignored() {
    // Announces a status nobody knows and a premature "initialized", but
    // never starts properly.
    let script = Script::new("test://confused", |_scope| {
        let Some(parent) = threads::parent_port() else {
            return;
        };
        let _ = parent.post_message(Value::object([("status", Value::from("warmingUp"))]), None);
        let _ = parent.post_message(
            Value::object([("status", Value::from("backgroundWorkerInitialized"))]),
            None,
        );
    });
    let background = BackgroundAnalysis::new(&script, options(), &WorkerIndexAllocator::new()).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!background.is_ready());
    assert_eq!(
        background.handshake_state(),
        HandshakeState::AwaitingWorkerStarted
    );

    background.terminate().await;
}

#[tokio::test]
async fn test_silent_background_never_becomes_ready() {
    let script = Script::new("test://silent", |_scope| {});
    let mut options = options();
    options.warn_after = Some(Duration::from_millis(20));
    let background = BackgroundAnalysis::new(&script, options, &WorkerIndexAllocator::new()).unwrap();

    background.enqueue_request(snapshot_request()).unwrap();
    let waited = tokio::time::timeout(Duration::from_millis(200), background.wait_ready()).await;
    assert!(waited.is_err());
    assert!(!background.is_ready());

    assert_eq!(background.terminate().await, 1);
}

#[tokio::test]
async fn test_enqueue_after_terminate_is_rejected() {
    let background = start(&WorkerIndexAllocator::new());
    ready(&background).await;
    background.terminate().await;

    assert!(matches!(
        background.enqueue_request(snapshot_request()),
        Err(HandshakeError::Terminated)
    ));
}
