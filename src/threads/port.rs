//! Duplex port emulation.
//!
//! [`MessagePort`] gives any native endpoint (an entangled [`NativePort`] or a
//! child context's [`GlobalScope`]) the surface of a threading-API port:
//! inbound values have native ports re-wrapped, outbound values are either
//! transferred or pushed through a text round-trip.

use std::fmt;
use std::sync::Arc;

use super::marshal;
use super::native::{
    native_channel, DataCloneError, Flow, GlobalScope, Listener, ListenerId, NativePort,
    Transferable,
};
use super::value::{SharedBuffer, Value};
use super::ThreadsResult;

/// Event kinds accepted by `on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    /// Accepted but never raised.
    Error,
    /// Accepted but never raised.
    Exit,
}

/// Anything with post/listen/start/close semantics.
pub trait PortEndpoint: Send + Sync {
    fn post_message(&self, value: Value, transfer: Vec<Transferable>) -> Result<(), DataCloneError>;

    fn add_listener(&self, listener: Listener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    fn start(&self) {}

    fn close(&self) {}

    /// The native port behind this endpoint, when it can be transferred.
    fn as_native(&self) -> Option<NativePort> {
        None
    }
}

impl PortEndpoint for NativePort {
    fn post_message(&self, value: Value, transfer: Vec<Transferable>) -> Result<(), DataCloneError> {
        NativePort::post_message(self, value, transfer)
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        NativePort::add_listener(self, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        NativePort::remove_listener(self, id)
    }

    fn start(&self) {
        NativePort::start(self)
    }

    fn close(&self) {
        NativePort::close(self)
    }

    fn as_native(&self) -> Option<NativePort> {
        Some(self.clone())
    }
}

impl PortEndpoint for GlobalScope {
    fn post_message(&self, value: Value, transfer: Vec<Transferable>) -> Result<(), DataCloneError> {
        GlobalScope::post_message(self, value, transfer)
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        GlobalScope::add_listener(self, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        GlobalScope::remove_listener(self, id)
    }

    fn close(&self) {
        GlobalScope::close(self)
    }
}

/// Items an application may list for transfer.
#[derive(Debug, Clone)]
pub enum TransferItem {
    Port(MessagePort),
    Buffer(SharedBuffer),
}

/// Emulated duplex port.
#[derive(Clone)]
pub struct MessagePort {
    delegate: Arc<dyn PortEndpoint>,
}

impl MessagePort {
    pub fn new<E: PortEndpoint + 'static>(delegate: E) -> Self {
        Self {
            delegate: Arc::new(delegate),
        }
    }

    /// The wrapped endpoint.
    pub fn unwrap(&self) -> Arc<dyn PortEndpoint> {
        self.delegate.clone()
    }

    /// Native port id, when this wraps a native port.
    pub fn native_id(&self) -> Option<u64> {
        self.delegate.as_native().map(|port| port.id())
    }

    /// Whether both wrappers share the same endpoint.
    pub fn ptr_eq(&self, other: &MessagePort) -> bool {
        Arc::ptr_eq(&self.delegate, &other.delegate)
            || matches!(
                (self.native_id(), other.native_id()),
                (Some(a), Some(b)) if a == b
            )
    }

    /// Post a value to the other side.
    ///
    /// With a transfer list, nested port wrappers are unwrapped to native
    /// ports and the value is handed to the primitive as is. Without one,
    /// the value goes through a text round-trip first, which turns domain
    /// objects into plain data and rejects handles.
    pub fn post_message(&self, value: Value, transfer: Option<Vec<TransferItem>>) -> ThreadsResult<()> {
        match transfer {
            Some(items) => {
                let transfer = marshal::unwrap_transfer_list(items)?;
                self.delegate
                    .post_message(marshal::unwrap_for_send(value), transfer)?;
            }
            None => {
                let plain = marshal::text_round_trip(&value)?;
                self.delegate.post_message(plain, Vec::new())?;
            }
        }
        Ok(())
    }

    /// Subscribe to an event kind.
    ///
    /// Message listeners receive values with native ports re-wrapped, and
    /// subscribing starts the endpoint. Error and exit listeners are
    /// accepted but never called.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        match kind {
            EventKind::Message => {
                self.delegate.add_listener(Arc::new(move |event| {
                    listener(marshal::wrap_inbound(event.data.clone()));
                    Flow::Continue
                }));
                self.start();
            }
            EventKind::Error | EventKind::Exit => {
                tracing::debug!(?kind, "error and exit events are not propagated by ports");
            }
        }
        self
    }

    pub fn start(&self) {
        self.delegate.start()
    }

    pub fn close(&self) {
        self.delegate.close()
    }
}

impl fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("native_id", &self.native_id())
            .finish()
    }
}

/// A pair of entangled emulated ports.
#[derive(Debug, Clone)]
pub struct MessageChannel {
    pub port1: MessagePort,
    pub port2: MessagePort,
}

impl MessageChannel {
    pub fn new() -> Self {
        let (port1, port2) = native_channel();
        Self {
            port1: MessagePort::new(port1),
            port2: MessagePort::new(port2),
        }
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}
