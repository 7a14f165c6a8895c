//! The base dispatch seam.
//!
//! Requests the runner does not handle itself go to an [`AnalysisEngine`].
//! The real analyzer lives behind this trait; [`BaseEngine`] covers the
//! lifecycle requests every engine must honor.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use super::request::{
    AnalysisRequest, AnalysisResponse, InvalidatePayload, ANALYSIS_COMPLETE,
    INVALIDATE_AND_FORCE_REANALYSIS, SHUTDOWN,
};
use super::ProtocolResult;
use crate::handshake::InitializationData;
use crate::host::Host;
use crate::threads::MessagePort;
use crate::vfs::MemoryFileSystem;

/// State the runner shares with its engine.
pub struct RunnerContext {
    pub init: InitializationData,
    pub fs: Arc<MemoryFileSystem>,
    pub host: Arc<dyn Host>,
    pub parent_port: MessagePort,
}

impl RunnerContext {
    /// Send a response for `request`.
    ///
    /// Goes to the request's own port when it carried one, otherwise to the
    /// parent context.
    pub fn respond(&self, request: &AnalysisRequest, response: AnalysisResponse) -> ProtocolResult<()> {
        let value = response.to_value()?;
        match &request.port {
            Some(port) => port.post_message(value, None)?,
            None => self.parent_port.post_message(value, None)?,
        }
        Ok(())
    }

    /// End the background context.
    pub fn close(&self) {
        self.parent_port.close();
    }
}

impl fmt::Debug for RunnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerContext")
            .field("init", &self.init)
            .field("host", &self.host.kind())
            .finish()
    }
}

/// Handler for base requests.
pub trait AnalysisEngine: Send {
    fn on_message(&mut self, request: AnalysisRequest, context: &RunnerContext) -> ProtocolResult<()>;
}

/// Builds a fresh engine inside the background context.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn AnalysisEngine> + Send + Sync>;

/// Engine with lifecycle handling only.
#[derive(Debug, Default)]
pub struct BaseEngine {
    passes: u64,
}

impl BaseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory() -> EngineFactory {
        Arc::new(|| Box::new(BaseEngine::new()))
    }
}

impl AnalysisEngine for BaseEngine {
    fn on_message(&mut self, request: AnalysisRequest, context: &RunnerContext) -> ProtocolResult<()> {
        match request.request_type.as_str() {
            INVALIDATE_AND_FORCE_REANALYSIS => {
                let payload: InvalidatePayload = request.payload()?;
                self.passes += 1;
                let file_count = context.fs.files().len();
                tracing::debug!(
                    worker_index = context.init.worker_index,
                    reason = ?payload.reason,
                    file_count,
                    "reanalysis forced"
                );
                context.respond(
                    &request,
                    AnalysisResponse::new(
                        ANALYSIS_COMPLETE,
                        json!({
                            "reason": payload.reason,
                            "fileCount": file_count,
                            "pass": self.passes,
                            "searchPaths": context.host.search_paths(),
                        }),
                    ),
                )
            }
            SHUTDOWN => {
                tracing::debug!(worker_index = context.init.worker_index, "background shutting down");
                context.close();
                Ok(())
            }
            other => {
                tracing::debug!(request_type = other, "no handler for request");
                Ok(())
            }
        }
    }
}
