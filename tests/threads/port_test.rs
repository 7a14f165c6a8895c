//! MessagePort and MessageChannel emulation within one context.

#[path = "../common/mod.rs"]
mod common;

use common::recv;
use serde::Serialize;
use tokio::sync::mpsc;
use twinlsp::threads::{
    DataCloneError, EventKind, MessageChannel, MessagePort, SharedBuffer, ThreadsError,
    TransferItem, Value,
};

fn collect(port: &MessagePort) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    port.on(EventKind::Message, move |value| {
        let _ = tx.send(value);
    });
    rx
}

#[derive(Debug, Serialize)]
struct FileRef {
    uri: String,
    version: u32,
}

#[tokio::test]
async fn test_channel_delivers_in_order() {
    let channel = MessageChannel::new();
    let mut inbox = collect(&channel.port2);

    for i in 0..5u32 {
        channel.port1.post_message(Value::from(i), None).unwrap();
    }
    for i in 0..5u32 {
        assert_eq!(recv(&mut inbox).await, Value::from(i));
    }
}

#[tokio::test]
async fn test_channel_is_duplex() {
    let channel = MessageChannel::new();
    let mut left = collect(&channel.port1);
    let mut right = collect(&channel.port2);

    channel.port1.post_message(Value::from("ping"), None).unwrap();
    assert_eq!(recv(&mut right).await, Value::from("ping"));

    channel.port2.post_message(Value::from("pong"), None).unwrap();
    assert_eq!(recv(&mut left).await, Value::from("pong"));
}

#[tokio::test]
async fn test_domain_objects_are_sent_as_plain_data() {
    let channel = MessageChannel::new();
    let mut inbox = collect(&channel.port2);

    let payload = Value::object([(
        "data",
        Value::Array(vec![Value::domain(FileRef {
            uri: "file:///src/a.py".into(),
            version: 3,
        })]),
    )]);
    channel.port1.post_message(payload, None).unwrap();

    let received = recv(&mut inbox).await;
    let first = &received.get("data").unwrap().as_array().unwrap()[0];
    assert_eq!(first.get("uri").and_then(Value::as_str), Some("file:///src/a.py"));
    assert_eq!(first.get("version"), Some(&Value::from(3u32)));
}

#[tokio::test]
async fn test_port_without_transfer_list_is_rejected() {
    let outer = MessageChannel::new();
    let inner = MessageChannel::new();

    let result = outer
        .port1
        .post_message(Value::object([("port", Value::Port(inner.port2.clone()))]), None);
    assert!(matches!(result, Err(ThreadsError::Marshal(_))));
}

#[tokio::test]
async fn test_port_missing_from_transfer_list_is_rejected() {
    let outer = MessageChannel::new();
    let inner = MessageChannel::new();

    let result = outer.port1.post_message(
        Value::object([("port", Value::Port(inner.port2.clone()))]),
        Some(vec![]),
    );
    assert!(matches!(
        result,
        Err(ThreadsError::DataClone(DataCloneError::PortNotTransferred(_)))
    ));
}

#[tokio::test]
async fn test_transferred_port_arrives_wrapped_and_usable() {
    let outer = MessageChannel::new();
    let inner = MessageChannel::new();
    let mut outer_inbox = collect(&outer.port2);
    let mut inner_inbox = collect(&inner.port1);

    outer
        .port1
        .post_message(
            Value::object([("port", Value::Port(inner.port2.clone()))]),
            Some(vec![TransferItem::Port(inner.port2.clone())]),
        )
        .unwrap();

    let received = recv(&mut outer_inbox).await;
    let port = received
        .get("port")
        .and_then(Value::as_port)
        .cloned()
        .expect("port re-wrapped on arrival");
    assert!(port.ptr_eq(&inner.port2));

    port.post_message(Value::from("through the transferred port"), None)
        .unwrap();
    assert_eq!(
        recv(&mut inner_inbox).await,
        Value::from("through the transferred port")
    );
}

#[tokio::test]
async fn test_shared_buffer_is_shared_not_copied() {
    let channel = MessageChannel::new();
    let mut inbox = collect(&channel.port2);
    let buffer = SharedBuffer::new(4);

    channel
        .port1
        .post_message(Value::Buffer(buffer.clone()), Some(vec![]))
        .unwrap();

    match recv(&mut inbox).await {
        Value::Buffer(received) => {
            received.write_at(0, &[9, 8]);
            assert_eq!(buffer.to_vec(), vec![9, 8, 0, 0]);
        }
        other => panic!("expected a buffer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_and_exit_listeners_are_accepted() {
    let channel = MessageChannel::new();
    let mut inbox = collect(&channel.port2);
    channel
        .port2
        .on(EventKind::Error, |_| panic!("error events are never raised"))
        .on(EventKind::Exit, |_| panic!("exit events are never raised"));

    channel.port1.post_message(Value::from(true), None).unwrap();
    assert_eq!(recv(&mut inbox).await, Value::from(true));
}

#[tokio::test]
async fn test_closed_port_stops_delivery() {
    let channel = MessageChannel::new();
    let mut inbox = collect(&channel.port2);

    channel.port1.post_message(Value::from("before"), None).unwrap();
    assert_eq!(recv(&mut inbox).await, Value::from("before"));

    channel.port2.close();
    channel.port1.post_message(Value::from("after"), None).unwrap();
    tokio::task::yield_now().await;
    assert!(inbox.try_recv().is_err());
}
