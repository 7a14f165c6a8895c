//! Worker emulation across two execution contexts.

#[path = "../common/mod.rs"]
mod common;

use common::recv;
use serde::Serialize;
use tokio::sync::mpsc;
use twinlsp::threads::{
    self, ContextOptions, EventKind, MessageChannel, Script, ThreadsError, TransferItem, Value,
    Worker, WorkerOptions,
};

/// Child script that posts every message it receives straight back.
fn echo_script() -> Script {
    Script::new("test://echo", |_scope| {
        let Some(parent) = threads::parent_port() else {
            return;
        };
        let reply = parent.clone();
        parent.on(EventKind::Message, move |value| {
            let _ = reply.post_message(value, None);
        });
    })
}

/// Child script that describes its own context on load.
fn introspect_script() -> Script {
    Script::new("test://introspect", |_scope| {
        let Some(parent) = threads::parent_port() else {
            return;
        };
        let report = Value::object([
            ("threadId", Value::from(threads::thread_id())),
            ("isMainThread", Value::from(threads::is_main_thread())),
            ("hasWorkerData", Value::from(threads::worker_data().is_some())),
        ]);
        let _ = parent.post_message(report, None);
    })
}

fn named(name: &str) -> Option<ContextOptions> {
    Some(ContextOptions {
        name: Some(name.to_string()),
    })
}

fn collect(worker: &Worker) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    worker.on(EventKind::Message, move |value| {
        let _ = tx.send(value);
    });
    rx
}

#[derive(Debug, Serialize)]
struct Diagnostic {
    message: String,
    line: u32,
}

#[tokio::test]
async fn test_echo_round_trip() {
    let worker = Worker::new(&echo_script(), None, named("echo")).unwrap();
    let mut inbox = collect(&worker);

    worker
        .post_message(Value::object([("n", Value::from(1u32))]), None)
        .unwrap();
    worker
        .post_message(Value::object([("n", Value::from(2u32))]), None)
        .unwrap();

    assert_eq!(recv(&mut inbox).await.get("n"), Some(&Value::from(1u32)));
    assert_eq!(recv(&mut inbox).await.get("n"), Some(&Value::from(2u32)));

    assert_eq!(worker.terminate().await, 1);
}

#[tokio::test]
async fn test_child_sees_its_name_and_default_role() {
    let worker = Worker::new(&introspect_script(), None, named("analysis-1")).unwrap();
    let mut inbox = collect(&worker);

    let report = recv(&mut inbox).await;
    assert_eq!(report.get("threadId").and_then(Value::as_str), Some("analysis-1"));
    assert_eq!(report.get("isMainThread"), Some(&Value::from(false)));
    assert_eq!(report.get("hasWorkerData"), Some(&Value::from(false)));

    worker.terminate().await;
}

#[tokio::test]
async fn test_name_falls_back_to_worker_options() {
    let options = WorkerOptions {
        name: Some("from-options".to_string()),
        worker_data: None,
    };
    let worker = Worker::new(&introspect_script(), Some(options), None).unwrap();
    let mut inbox = collect(&worker);

    let report = recv(&mut inbox).await;
    assert_eq!(report.get("threadId").and_then(Value::as_str), Some("from-options"));
    assert_eq!(worker.name(), "from-options");

    worker.terminate().await;
}

#[tokio::test]
async fn test_construction_time_worker_data_is_not_delivered() {
    let options = WorkerOptions {
        name: None,
        worker_data: Some(Value::from("ignored")),
    };
    let worker = Worker::new(&introspect_script(), Some(options), named("no-data")).unwrap();
    let mut inbox = collect(&worker);

    let report = recv(&mut inbox).await;
    assert_eq!(report.get("hasWorkerData"), Some(&Value::from(false)));

    worker.terminate().await;
}

#[tokio::test]
async fn test_nested_domain_objects_cross_as_plain_data() {
    let worker = Worker::new(&echo_script(), None, named("echo-domain")).unwrap();
    let mut inbox = collect(&worker);

    let payload = Value::object([
        ("responseType", Value::from("diagnostics")),
        (
            "data",
            Value::object([(
                "items",
                Value::Array(vec![Value::domain(Diagnostic {
                    message: "unused import".to_string(),
                    line: 4,
                })]),
            )]),
        ),
    ]);
    worker.post_message(payload, None).unwrap();

    let echoed = recv(&mut inbox).await.to_json().unwrap();
    assert_eq!(
        echoed,
        serde_json::json!({
            "responseType": "diagnostics",
            "data": {"items": [{"message": "unused import", "line": 4}]}
        })
    );

    worker.terminate().await;
}

#[tokio::test]
async fn test_transferred_port_reaches_the_child() {
    // The child answers on whatever port arrives in the `port` field.
    let script = Script::new("test://port-reply", |_scope| {
        let Some(parent) = threads::parent_port() else {
            return;
        };
        parent.on(EventKind::Message, |value| {
            if let Some(port) = value.get("port").and_then(Value::as_port) {
                let _ = port.post_message(Value::from(threads::thread_id()), None);
            }
        });
    });
    let worker = Worker::new(&script, None, named("port-child")).unwrap();

    let channel = MessageChannel::new();
    let (tx, mut replies) = mpsc::unbounded_channel();
    channel.port1.on(EventKind::Message, move |value| {
        let _ = tx.send(value);
    });

    worker
        .post_message(
            Value::object([("port", Value::Port(channel.port2.clone()))]),
            Some(vec![TransferItem::Port(channel.port2.clone())]),
        )
        .unwrap();

    assert_eq!(recv(&mut replies).await, Value::from("port-child"));

    worker.terminate().await;
}

#[tokio::test]
async fn test_terminate_is_idempotent() {
    let worker = Worker::new(&echo_script(), None, named("twice")).unwrap();
    assert_eq!(worker.terminate().await, 1);
    assert_eq!(worker.terminate().await, 1);
}

#[test]
fn test_new_without_runtime_fails() {
    let result = Worker::new(&echo_script(), None, named("no-runtime"));
    assert!(matches!(result, Err(ThreadsError::NoRuntime)));
}
