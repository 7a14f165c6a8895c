//! Value marshalling between application values and the native primitive.

use super::native::Transferable;
use super::port::{MessagePort, TransferItem};
use super::value::{MarshalError, Value};
use super::{ThreadsError, ThreadsResult};

/// Rebuild arrays and objects, applying `leaf` to every other value.
fn map_tree<F>(value: Value, leaf: &F) -> Result<Value, MarshalError>
where
    F: Fn(Value) -> Result<Value, MarshalError>,
{
    match value {
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|item| map_tree(item, leaf))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => Ok(Value::Object(
            map.into_iter()
                .map(|(key, item)| Ok((key, map_tree(item, leaf)?)))
                .collect::<Result<_, MarshalError>>()?,
        )),
        other => leaf(other),
    }
}

fn map_tree_infallible<F>(value: Value, leaf: &F) -> Value
where
    F: Fn(Value) -> Value,
{
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| map_tree_infallible(item, leaf))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, map_tree_infallible(item, leaf)))
                .collect(),
        ),
        other => leaf(other),
    }
}

/// Make a value safe for the primitive.
///
/// Arrays and objects are copied with every element sanitized, at any depth,
/// so a nested `data` payload is covered as well as the top level. Domain
/// objects become their plain form.
pub fn sanitize_outbound(value: Value) -> Result<Value, MarshalError> {
    map_tree(value, &|leaf| match leaf {
        Value::Domain(object) => Ok(Value::from(object.to_plain()?)),
        other => Ok(other),
    })
}

/// Re-wrap every native port in a received value.
pub fn wrap_inbound(value: Value) -> Value {
    map_tree_infallible(value, &|leaf| match leaf {
        Value::RawPort(port) => Value::Port(MessagePort::new(port)),
        other => other,
    })
}

/// Replace every port wrapper with its native port.
///
/// Wrappers around endpoints that are not native ports are left in place;
/// the primitive rejects them.
pub fn unwrap_for_send(value: Value) -> Value {
    map_tree_infallible(value, &|leaf| match leaf {
        Value::Port(port) => match port.unwrap().as_native() {
            Some(native) => Value::RawPort(native),
            None => Value::Port(port),
        },
        other => other,
    })
}

/// Convert a transfer list to the items the primitive understands.
pub fn unwrap_transfer_list(items: Vec<TransferItem>) -> ThreadsResult<Vec<Transferable>> {
    items
        .into_iter()
        .map(|item| match item {
            TransferItem::Port(port) => port
                .unwrap()
                .as_native()
                .map(Transferable::Port)
                .ok_or(ThreadsError::NotTransferable("MessagePort without a native port")),
            TransferItem::Buffer(buffer) => Ok(Transferable::Buffer(buffer)),
        })
        .collect()
}

/// Serialize to text and parse back.
pub fn text_round_trip(value: &Value) -> Result<Value, MarshalError> {
    let text = serde_json::to_string(&value.to_json()?)?;
    let plain: serde_json::Value = serde_json::from_str(&text)?;
    Ok(plain.into())
}
