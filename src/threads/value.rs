//! Message payload values.
//!
//! A [`Value`] is what travels between execution contexts. Besides the plain
//! JSON shapes it can carry the handles the native primitive knows how to
//! move ([`NativePort`], [`SharedBuffer`]), emulated port wrappers handed to
//! application code, and opaque domain objects that the primitive refuses to
//! clone until they are marshalled into their plain form.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::native::NativePort;
use super::port::MessagePort;

/// Errors raised while converting values to or from their text form.
#[derive(Error, Debug)]
pub enum MarshalError {
    /// Text serialization failed.
    #[error("failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The value holds a handle that has no text representation.
    #[error("{0} cannot be serialized to text")]
    NotSerializable(&'static str),
}

/// An object owned by application code that the native primitive cannot
/// clone, but that survives a text serialize/deserialize round-trip.
pub trait DomainObject: fmt::Debug + Send + Sync {
    /// Name of the concrete type, used in clone errors.
    fn type_name(&self) -> &'static str;

    /// Plain representation, produced by serializing to text and parsing it
    /// back.
    fn to_plain(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl<T> DomainObject for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_plain(&self) -> Result<serde_json::Value, serde_json::Error> {
        let text = serde_json::to_string(self)?;
        serde_json::from_str(&text)
    }
}

/// Shared handle to a domain object.
#[derive(Clone)]
pub struct DomainValue(Arc<dyn DomainObject>);

impl DomainValue {
    pub fn new<T: DomainObject + 'static>(object: T) -> Self {
        Self(Arc::new(object))
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub fn to_plain(&self) -> Result<serde_json::Value, serde_json::Error> {
        self.0.to_plain()
    }

    pub fn ptr_eq(&self, other: &DomainValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Binary buffer whose memory is shared, never copied, by structured clone.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create a zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite bytes starting at `offset`. Bytes past the end are dropped.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> usize {
        let mut bytes = self.bytes.write();
        if offset >= bytes.len() {
            return 0;
        }
        let end = (offset + data.len()).min(bytes.len());
        let written = end - offset;
        bytes[offset..end].copy_from_slice(&data[..written]);
        written
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Whether both handles view the same memory.
    pub fn ptr_eq(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// A message payload.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Shared binary buffer (transferable).
    Buffer(SharedBuffer),
    /// Native port handle, the form the primitive can transfer.
    RawPort(NativePort),
    /// Emulated port handed to application code.
    Port(MessagePort),
    /// Application object that must be marshalled before crossing contexts.
    Domain(DomainValue),
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wrap a domain object.
    pub fn domain<T: DomainObject + 'static>(object: T) -> Self {
        Value::Domain(DomainValue::new(object))
    }

    /// Convert any serializable value into its plain form.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, MarshalError> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Deserialize a typed value from this payload.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, MarshalError> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }

    /// Field lookup on objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&MessagePort> {
        match self {
            Value::Port(port) => Some(port),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Buffer(_) => "SharedBuffer",
            Value::RawPort(_) => "native port",
            Value::Port(_) => "MessagePort",
            Value::Domain(_) => "domain object",
        }
    }

    /// Plain JSON form of this value.
    ///
    /// Domain objects are replaced by their plain representation. Ports and
    /// buffers have no text form and produce an error.
    pub fn to_json(&self) -> Result<serde_json::Value, MarshalError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                serde_json::Value::Object(out)
            }
            Value::Domain(object) => object.to_plain()?,
            Value::Buffer(_) | Value::RawPort(_) | Value::Port(_) => {
                return Err(MarshalError::NotSerializable(self.kind()))
            }
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Buffer(a), Value::Buffer(b)) => a.ptr_eq(b),
            (Value::RawPort(a), Value::RawPort(b)) => a.id() == b.id(),
            (Value::Port(a), Value::Port(b)) => a.ptr_eq(b),
            (Value::Domain(a), Value::Domain(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<SharedBuffer> for Value {
    fn from(buffer: SharedBuffer) -> Self {
        Value::Buffer(buffer)
    }
}

impl From<MessagePort> for Value {
    fn from(port: MessagePort) -> Self {
        Value::Port(port)
    }
}
