//! Background analysis runner.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::{AnalysisEngine, RunnerContext};
use super::request::{AnalysisRequest, FileUriPayload, InitialFilesPayload, RequestType};
use super::{ProtocolError, ProtocolResult};
use crate::handshake::InitializationData;
use crate::host::Host;
use crate::threads::{self, EventKind, Value};
use crate::vfs::{self, MemoryFileSystem};

/// Owns the background filesystem and dispatches requests.
///
/// Filesystem requests are applied to the context's own filesystem;
/// everything else goes to the engine unchanged.
pub struct BackgroundAnalysisRunner {
    context: RunnerContext,
    engine: Mutex<Box<dyn AnalysisEngine>>,
}

impl BackgroundAnalysisRunner {
    /// Build a runner from this context's startup data and parent port.
    ///
    /// Must run inside a child context after the worker data was set.
    pub fn new(engine: Box<dyn AnalysisEngine>, host: Arc<dyn Host>) -> ProtocolResult<Self> {
        let init: InitializationData = threads::worker_data()
            .ok_or(ProtocolError::MissingWorkerData)?
            .deserialize()?;
        let parent_port = threads::parent_port().ok_or(ProtocolError::NoParentPort)?;

        tracing::debug!(
            worker_index = init.worker_index,
            root_path = %init.root_path,
            host = ?host.kind(),
            "background analysis runner created"
        );

        Ok(Self {
            context: RunnerContext {
                init,
                fs: Arc::new(MemoryFileSystem::new()),
                host,
                parent_port,
            },
            engine: Mutex::new(engine),
        })
    }

    /// Begin receiving requests from the parent context.
    pub fn start(self: &Arc<Self>) {
        let runner = Arc::downgrade(self);
        self.context.parent_port.on(EventKind::Message, move |value: Value| {
            let Some(runner) = runner.upgrade() else {
                return;
            };
            if value.get("status").is_some() {
                tracing::trace!("control message ignored by runner");
                return;
            }
            let result = AnalysisRequest::from_value(&value).and_then(|request| runner.on_message(request));
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to handle analysis request");
            }
        });
    }

    pub fn init(&self) -> &InitializationData {
        &self.context.init
    }

    pub fn file_system(&self) -> &Arc<MemoryFileSystem> {
        &self.context.fs
    }

    pub fn on_message(&self, request: AnalysisRequest) -> ProtocolResult<()> {
        tracing::trace!(request_type = %request.request_type, "request received");
        match request.request_type {
            RequestType::InitialFiles => {
                let payload: InitialFilesPayload = request.payload()?;
                vfs::seed_all(self.context.fs.as_ref(), &payload.initial_files)?;
            }
            RequestType::CreateFile => {
                let payload: FileUriPayload = request.payload()?;
                vfs::create_one(self.context.fs.as_ref(), &payload.file_uri)?;
            }
            RequestType::DeleteFile => {
                let payload: FileUriPayload = request.payload()?;
                vfs::delete_one(self.context.fs.as_ref(), &payload.file_uri)?;
            }
            RequestType::Base(_) => {
                self.engine.lock().on_message(request, &self.context)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BackgroundAnalysisRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundAnalysisRunner")
            .field("context", &self.context)
            .finish()
    }
}
