//! Foreground side of the startup handshake.
//!
//! [`BackgroundAnalysis`] owns the background context. It runs the
//! handshake, exposes readiness, and gates every request behind it through
//! a single FIFO queue, so requests reach the background in the order they
//! were enqueued no matter when the handshake completes.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{ControlMessage, HandshakeError, HandshakeResult, InitializationData};
use crate::analysis::{AnalysisRequest, AnalysisResponse, InvalidatedReason};
use crate::threads::{ContextOptions, EventKind, Flow, ListenerId, Script, Value, Worker, WorkerOptions};
use crate::vfs::FileMap;

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Constructed,
    AwaitingWorkerStarted,
    AwaitingWorkerInitialized,
    /// Terminal.
    Ready,
}

/// What the listener must do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Not ours; let other listeners see it.
    Ignore,
    /// Claim the message and post this reply.
    SendWorkerData(ControlMessage),
    /// Claim the message, resolve readiness and deregister.
    Ready,
}

#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    init: InitializationData,
}

impl Handshake {
    pub fn new(init: InitializationData) -> Self {
        Self {
            state: HandshakeState::Constructed,
            init,
        }
    }

    /// The listener is in place; start waiting for the background.
    pub fn register(&mut self) {
        if self.state == HandshakeState::Constructed {
            self.state = HandshakeState::AwaitingWorkerStarted;
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn init_data(&self) -> &InitializationData {
        &self.init
    }

    pub fn on_message(&mut self, message: Option<&ControlMessage>) -> HandshakeStep {
        match (self.state, message) {
            (HandshakeState::AwaitingWorkerStarted, Some(ControlMessage::BackgroundWorkerStarted)) => {
                self.state = HandshakeState::AwaitingWorkerInitialized;
                tracing::debug!(worker_index = self.init.worker_index, "background started, sending worker data");
                HandshakeStep::SendWorkerData(ControlMessage::InitialWorkerData {
                    worker_data: self.init.clone(),
                })
            }
            (
                HandshakeState::AwaitingWorkerInitialized,
                Some(ControlMessage::BackgroundWorkerInitialized),
            ) => {
                self.state = HandshakeState::Ready;
                tracing::debug!(worker_index = self.init.worker_index, "background initialized");
                HandshakeStep::Ready
            }
            (state, message) => {
                tracing::trace!(?state, ?message, "message does not advance the handshake");
                HandshakeStep::Ignore
            }
        }
    }
}

// ============================================================================
// Readiness
// ============================================================================

/// One-shot readiness flag. Monotonic; never resets, never fails.
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` only for the call that flipped the flag.
    pub fn resolve(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out worker indices, starting at 1.
#[derive(Debug, Clone, Default)]
pub struct WorkerIndexAllocator(Arc<AtomicU32>);

impl WorkerIndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ============================================================================
// Background analysis
// ============================================================================

/// Options for [`BackgroundAnalysis::new`].
#[derive(Debug, Clone)]
pub struct BackgroundAnalysisOptions {
    pub background_name: String,
    pub root_path: String,
    pub cancellation_channel_name: Option<String>,
    /// Log a warning if the handshake has not finished after this long.
    pub warn_after: Option<Duration>,
}

/// Foreground handle to the background analysis context.
pub struct BackgroundAnalysis {
    worker: Arc<Worker>,
    worker_index: u32,
    handshake: Arc<Mutex<Handshake>>,
    readiness: Readiness,
    queue: Mutex<Option<mpsc::UnboundedSender<AnalysisRequest>>>,
    responses: Mutex<Option<mpsc::UnboundedReceiver<AnalysisResponse>>>,
    gate: Mutex<Option<JoinHandle<()>>>,
    watchdog: Option<JoinHandle<()>>,
}

impl BackgroundAnalysis {
    /// Create the background context and start the handshake.
    ///
    /// Call this on the foreground context's runtime. Its listeners are
    /// registered before this returns, so no startup message is missed.
    pub fn new(
        script: &Script,
        options: BackgroundAnalysisOptions,
        allocator: &WorkerIndexAllocator,
    ) -> HandshakeResult<Self> {
        let worker_index = allocator.next();
        let init = InitializationData {
            root_path: options.root_path.clone(),
            cancellation_channel_name: options.cancellation_channel_name.clone(),
            worker_index,
        };

        let worker = Arc::new(Worker::new(
            script,
            None::<WorkerOptions>,
            Some(ContextOptions {
                name: Some(options.background_name.clone()),
            }),
        )?);

        let readiness = Readiness::new();
        let handshake = Arc::new(Mutex::new(Handshake::new(init)));
        handshake.lock().register();
        Self::install_handshake_listener(&worker, &handshake, &readiness);

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        worker.on(EventKind::Message, move |value: Value| {
            if value.get("status").is_some() {
                tracing::trace!("status message reached the response listener");
                return;
            }
            match value.deserialize::<AnalysisResponse>() {
                Ok(response) => {
                    let _ = response_tx.send(response);
                }
                Err(e) => tracing::trace!(error = %e, "ignoring message from background"),
            }
        });

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let gate = tokio::spawn(run_gate(worker.clone(), readiness.clone(), queue_rx));

        let watchdog = options.warn_after.map(|after| {
            let readiness = readiness.clone();
            tokio::spawn(async move {
                if tokio::time::timeout(after, readiness.wait()).await.is_err() {
                    tracing::warn!(
                        worker_index,
                        waited_ms = after.as_millis() as u64,
                        "background worker has not completed its startup handshake"
                    );
                }
            })
        });

        tracing::info!(worker_index, name = %options.background_name, "background analysis created");

        Ok(Self {
            worker,
            worker_index,
            handshake,
            readiness,
            queue: Mutex::new(Some(queue_tx)),
            responses: Mutex::new(Some(response_rx)),
            gate: Mutex::new(Some(gate)),
            watchdog,
        })
    }

    /// Register the transient handshake listener on the raw context handle,
    /// ahead of every other listener.
    fn install_handshake_listener(
        worker: &Arc<Worker>,
        handshake: &Arc<Mutex<Handshake>>,
        readiness: &Readiness,
    ) {
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(worker);
        let handshake = handshake.clone();
        let readiness = readiness.clone();
        let listener_slot = slot.clone();

        let id = worker.context().add_listener(Arc::new(move |event| {
            let message = ControlMessage::parse(&event.data);
            let step = handshake.lock().on_message(message.as_ref());
            match step {
                HandshakeStep::Ignore => Flow::Continue,
                HandshakeStep::SendWorkerData(reply) => {
                    if let Some(worker) = weak.upgrade() {
                        let sent = reply
                            .to_value()
                            .map_err(HandshakeError::from)
                            .and_then(|value| {
                                worker.post_message(value, None).map_err(HandshakeError::from)
                            });
                        if let Err(e) = sent {
                            tracing::error!(error = %e, "failed to send worker data");
                        }
                    }
                    Flow::Stop
                }
                HandshakeStep::Ready => {
                    readiness.resolve();
                    if let (Some(worker), Some(id)) = (weak.upgrade(), *listener_slot.lock()) {
                        worker.context().remove_listener(id);
                    }
                    Flow::Stop
                }
            }
        }));
        *slot.lock() = Some(id);
    }

    pub fn worker_index(&self) -> u32 {
        self.worker_index
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.lock().state()
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub async fn wait_ready(&self) {
        self.readiness.wait().await
    }

    /// Queue a request. It is posted once the handshake has completed, after
    /// every request queued before it.
    pub fn enqueue_request(&self, request: AnalysisRequest) -> HandshakeResult<()> {
        let queue = self.queue.lock();
        let sender = queue.as_ref().ok_or(HandshakeError::Terminated)?;
        sender.send(request).map_err(|_| HandshakeError::Terminated)
    }

    /// Seed the background filesystem.
    pub fn initial_files(&self, files: &FileMap) -> HandshakeResult<()> {
        self.enqueue_request(AnalysisRequest::initial_files(files)?)
    }

    pub fn create_file(&self, file_uri: &str) -> HandshakeResult<()> {
        self.enqueue_request(AnalysisRequest::create_file(file_uri)?)
    }

    pub fn delete_file(&self, file_uri: &str) -> HandshakeResult<()> {
        self.enqueue_request(AnalysisRequest::delete_file(file_uri)?)
    }

    pub fn invalidate(&self, reason: InvalidatedReason) -> HandshakeResult<()> {
        self.enqueue_request(AnalysisRequest::invalidate(reason)?)
    }

    /// Responses from the background engine. Can be taken once.
    pub fn take_responses(&self) -> Option<mpsc::UnboundedReceiver<AnalysisResponse>> {
        self.responses.lock().take()
    }

    /// Stop accepting requests, flush what is queued if the handshake has
    /// completed, then tear the background context down.
    pub async fn terminate(&self) -> i32 {
        self.queue.lock().take();
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            if self.readiness.is_ready() {
                let _ = gate.await;
            } else {
                gate.abort();
            }
        }
        let code = self.worker.terminate().await;
        tracing::info!(worker_index = self.worker_index, code, "background analysis terminated");
        code
    }
}

impl Drop for BackgroundAnalysis {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.abort();
        }
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }
    }
}

impl fmt::Debug for BackgroundAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundAnalysis")
            .field("worker_index", &self.worker_index)
            .field("state", &self.handshake_state())
            .finish()
    }
}

async fn run_gate(
    worker: Arc<Worker>,
    readiness: Readiness,
    mut queue: mpsc::UnboundedReceiver<AnalysisRequest>,
) {
    readiness.wait().await;
    while let Some(request) = queue.recv().await {
        let request_type = request.request_type.to_string();
        let transfer = request.transfer_list();
        if let Err(e) = worker.post_message(request.to_value(), Some(transfer)) {
            tracing::warn!(request_type = %request_type, error = %e, "failed to post request");
        } else {
            tracing::trace!(request_type = %request_type, "request posted");
        }
    }
}
