//! Worker handle emulation.

use std::fmt;
use std::sync::Arc;

use super::marshal;
use super::native::{ContextOptions, ContextWorker, Flow, Script};
use super::port::{EventKind, TransferItem};
use super::value::Value;
use super::ThreadsResult;

/// Options accepted by [`Worker::new`].
///
/// Only `name` is honored. Startup data cannot be handed to a child context
/// at construction; it has to be delivered by message after the child has
/// loaded.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    pub name: Option<String>,
    pub worker_data: Option<Value>,
}

/// Handle to one child execution context.
pub struct Worker {
    context: Arc<ContextWorker>,
}

impl Worker {
    /// Create the child context and evaluate `script` in it.
    ///
    /// The context name comes from `context_options`, falling back to
    /// `options.name`. Failures to create the context are returned as is.
    pub fn new(
        script: &Script,
        options: Option<WorkerOptions>,
        context_options: Option<ContextOptions>,
    ) -> ThreadsResult<Self> {
        let options = options.unwrap_or_default();
        if options.worker_data.is_some() {
            tracing::debug!("ignoring construction-time worker data; deliver it by message");
        }
        let mut context_options = context_options.unwrap_or_default();
        if context_options.name.is_none() {
            context_options.name = options.name;
        }

        let context = ContextWorker::new(script, context_options)?;
        Ok(Self {
            context: Arc::new(context),
        })
    }

    /// The underlying context handle.
    pub fn context(&self) -> &Arc<ContextWorker> {
        &self.context
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    /// Marshal `value` and post it to the child context.
    pub fn post_message(&self, value: Value, transfer: Option<Vec<TransferItem>>) -> ThreadsResult<()> {
        let value = marshal::unwrap_for_send(marshal::sanitize_outbound(value)?);
        let transfer = marshal::unwrap_transfer_list(transfer.unwrap_or_default())?;
        self.context.post_message(value, transfer)?;
        Ok(())
    }

    /// Subscribe to an event kind. Error and exit are accepted and ignored.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> &Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        match kind {
            EventKind::Message => {
                self.context.add_listener(Arc::new(move |event| {
                    listener(marshal::wrap_inbound(event.data.clone()));
                    Flow::Continue
                }));
            }
            EventKind::Error | EventKind::Exit => {
                tracing::debug!(?kind, worker = self.name(), "error and exit events are not propagated");
            }
        }
        self
    }

    /// Tear the child context down. Resolves with the exit code once the
    /// context has stopped.
    pub async fn terminate(&self) -> i32 {
        self.context.terminate().await;
        1
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("context", &self.context)
            .finish()
    }
}
