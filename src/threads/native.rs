//! The native message primitive.
//!
//! This is the only cross-context transport available: entangled ports, a
//! child context's global scope, and the parent-side handle of a child
//! context. Everything is event based. Payloads are structured-cloned on
//! send, listeners run in registration order on the receiving context's
//! runtime, and a listener may stop immediate propagation.
//!
//! Delivery is driven by a pump task on the tokio runtime of the context that
//! started the endpoint. Contexts run current-thread runtimes, so a listener
//! registered before the registering task yields observes every message.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::context;
use super::value::{SharedBuffer, Value};
use super::{ThreadsError, ThreadsResult};

/// Identifier returned by [`EventTarget::add_listener`].
pub type ListenerId = u64;

/// Whether dispatch continues to the next listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop immediate propagation.
    Stop,
}

/// A delivered message.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: Value,
}

/// Raw event listener.
pub type Listener = Arc<dyn Fn(&MessageEvent) -> Flow + Send + Sync>;

/// Errors raised by structured clone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataCloneError {
    #[error("{0} could not be cloned")]
    Uncloneable(String),

    #[error("port {0} must be listed in the transfer list")]
    PortNotTransferred(u64),
}

/// Items the primitive can move between contexts.
#[derive(Debug, Clone)]
pub enum Transferable {
    Port(NativePort),
    Buffer(SharedBuffer),
}

/// Clone a payload the way the primitive does before delivery.
pub fn structured_clone(value: &Value, transfer: &[Transferable]) -> Result<Value, DataCloneError> {
    Ok(match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| structured_clone(item, transfer))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = std::collections::BTreeMap::new();
            for (key, item) in map {
                out.insert(key.clone(), structured_clone(item, transfer)?);
            }
            Value::Object(out)
        }
        Value::RawPort(port) => {
            let listed = transfer
                .iter()
                .any(|t| matches!(t, Transferable::Port(p) if p.id() == port.id()));
            if !listed {
                return Err(DataCloneError::PortNotTransferred(port.id()));
            }
            Value::RawPort(port.clone())
        }
        Value::Port(_) => return Err(DataCloneError::Uncloneable("MessagePort wrapper".into())),
        Value::Domain(object) => {
            return Err(DataCloneError::Uncloneable(object.type_name().to_string()))
        }
        other => other.clone(),
    })
}

#[derive(Default)]
struct Listeners {
    next_id: ListenerId,
    entries: Vec<(ListenerId, Listener)>,
}

/// Ordered listener list with stop-propagation support.
#[derive(Clone, Default)]
pub struct EventTarget {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let mut listeners = self.listeners.lock();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, listener));
        id
    }

    /// Returns `false` when the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        listeners.entries.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.listeners
            .lock()
            .entries
            .iter()
            .any(|(entry, _)| *entry == id)
    }

    /// Run listeners in order until one stops propagation.
    ///
    /// Listeners added during dispatch do not see this event; listeners
    /// removed during dispatch are skipped.
    pub fn dispatch(&self, event: &MessageEvent) -> Flow {
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners.lock().entries.clone();
        for (id, listener) in snapshot {
            if !self.is_registered(id) {
                continue;
            }
            if listener(event) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

struct PortInner {
    id: u64,
    events: EventTarget,
    peer: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    started: AtomicBool,
    closed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// One end of an entangled native channel.
#[derive(Clone)]
pub struct NativePort {
    inner: Arc<PortInner>,
}

/// Create an entangled pair of native ports.
pub fn native_channel() -> (NativePort, NativePort) {
    let (to_second, second_inbox) = mpsc::unbounded_channel();
    let (to_first, first_inbox) = mpsc::unbounded_channel();
    (
        NativePort::new(to_second, first_inbox),
        NativePort::new(to_first, second_inbox),
    )
}

impl NativePort {
    fn new(peer: mpsc::UnboundedSender<Value>, inbox: mpsc::UnboundedReceiver<Value>) -> Self {
        Self {
            inner: Arc::new(PortInner {
                id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
                events: EventTarget::new(),
                peer: Mutex::new(Some(peer)),
                inbox: Mutex::new(Some(inbox)),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                pump: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventTarget {
        &self.inner.events
    }

    /// Clone `value` and queue it on the entangled port.
    ///
    /// Posting on a closed or disentangled port silently drops the message.
    pub fn post_message(&self, value: Value, transfer: Vec<Transferable>) -> Result<(), DataCloneError> {
        let cloned = structured_clone(&value, &transfer)?;
        if self.is_closed() {
            tracing::trace!(port = self.id(), "dropping message posted on closed port");
            return Ok(());
        }
        if let Some(peer) = self.inner.peer.lock().as_ref() {
            if peer.send(cloned).is_err() {
                tracing::trace!(port = self.id(), "entangled port is gone, message dropped");
            }
        }
        Ok(())
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.inner.events.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    /// Begin delivering queued messages on the current runtime.
    pub fn start(&self) {
        match Handle::try_current() {
            Ok(handle) => self.start_on(&handle),
            Err(_) => tracing::warn!(
                port = self.id(),
                "port started outside of an async runtime; messages stay queued"
            ),
        }
    }

    pub(crate) fn start_on(&self, handle: &Handle) {
        if self.is_closed() || self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut inbox) = self.inner.inbox.lock().take() else {
            return;
        };
        let events = self.inner.events.clone();
        let task = handle.spawn(async move {
            while let Some(data) = inbox.recv().await {
                events.dispatch(&MessageEvent { data });
            }
        });
        *self.inner.pump.lock() = Some(task);
    }

    /// Disentangle the port. Queued and future messages are discarded.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.peer.lock().take();
        self.inner.inbox.lock().take();
        if let Some(task) = self.inner.pump.lock().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for NativePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativePort")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Script a child context evaluates on load.
#[derive(Clone)]
pub struct Script {
    url: String,
    entry: Arc<dyn Fn(GlobalScope) + Send + Sync>,
}

impl Script {
    pub fn new<F>(url: impl Into<String>, entry: F) -> Self
    where
        F: Fn(GlobalScope) + Send + Sync + 'static,
    {
        Self {
            url: url.into(),
            entry: Arc::new(entry),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn evaluate(&self, scope: GlobalScope) {
        (self.entry)(scope)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("url", &self.url).finish()
    }
}

/// Options understood by the primitive when creating a child context.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Human-readable name, visible inside the child as its scope name.
    pub name: Option<String>,
}

struct ScopeInner {
    name: String,
    port: NativePort,
    closed: watch::Sender<bool>,
}

/// The global scope (`self`) of a child context.
#[derive(Clone)]
pub struct GlobalScope {
    inner: Arc<ScopeInner>,
}

impl GlobalScope {
    fn new(name: String, port: NativePort) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(ScopeInner { name, port, closed }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Post to the parent context.
    pub fn post_message(&self, value: Value, transfer: Vec<Transferable>) -> Result<(), DataCloneError> {
        self.inner.port.post_message(value, transfer)
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.inner.port.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.port.remove_listener(id)
    }

    /// End this context once the current dispatch returns.
    pub fn close(&self) {
        self.inner.port.close();
        self.inner.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    async fn wait_closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope")
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Parent-side handle of a child context.
pub struct ContextWorker {
    name: String,
    port: NativePort,
    terminate: Mutex<Option<oneshot::Sender<()>>>,
    exited: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ContextWorker {
    /// Create a child context on its own thread and evaluate `script` in it.
    ///
    /// Messages from the child are dispatched on the calling runtime.
    pub fn new(script: &Script, options: ContextOptions) -> ThreadsResult<Self> {
        let handle = Handle::try_current().map_err(|_| ThreadsError::NoRuntime)?;
        let name = options.name.unwrap_or_default();
        let (parent_end, child_end) = native_channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();

        let thread_name = if name.is_empty() {
            "context-worker".to_string()
        } else {
            name.clone()
        };
        let child_script = script.clone();
        let child_name = name.clone();
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                run_context(child_script, child_name, child_end, terminate_rx);
                let _ = exited_tx.send(());
            })
            .map_err(ThreadsError::SpawnFailed)?;

        parent_end.start_on(&handle);
        tracing::debug!(context = %name, script = script.url(), "spawned execution context");

        Ok(Self {
            name,
            port: parent_end,
            terminate: Mutex::new(Some(terminate_tx)),
            exited: Mutex::new(Some(exited_rx)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post to the child context.
    pub fn post_message(&self, value: Value, transfer: Vec<Transferable>) -> Result<(), DataCloneError> {
        self.port.post_message(value, transfer)
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.port.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.port.remove_listener(id)
    }

    pub fn listener_count(&self) -> usize {
        self.port.events().listener_count()
    }

    /// Stop the child context and wait until its thread has wound down.
    pub async fn terminate(&self) {
        self.port.close();
        if let Some(tx) = self.terminate.lock().take() {
            let _ = tx.send(());
        }
        let exited = self.exited.lock().take();
        if let Some(rx) = exited {
            let _ = rx.await;
            tracing::debug!(context = %self.name, "execution context terminated");
        }
    }
}

impl fmt::Debug for ContextWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextWorker")
            .field("name", &self.name)
            .field("port", &self.port)
            .finish()
    }
}

fn run_context(
    script: Script,
    name: String,
    port: NativePort,
    terminate: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(context = %name, error = %e, "failed to build context runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let scope = GlobalScope::new(name, port);
        context::enter_child(scope.clone());
        script.evaluate(scope.clone());

        // The scope starts delivering only after the script has run, so
        // listeners registered at load time see the first message.
        scope.inner.port.start();

        tokio::select! {
            _ = terminate => {}
            _ = scope.wait_closed() => {}
        }
        scope.inner.port.close();
    });
}
