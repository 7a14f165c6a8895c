//! Two-phase startup handshake.
//!
//! A child context can only be given its name at construction. Everything
//! else it needs at startup is delivered by message once it has loaded:
//!
//! ```text
//!   foreground                                   background
//!   ──────────                                   ──────────
//!   Worker::new(entry, name) ───────────────────► evaluates entry script
//!                            ◄─────────────────── {status: backgroundWorkerStarted}
//!   {status: initialWorkerData, workerData} ────►
//!                                                set_worker_data, build runner
//!                            ◄─────────────────── {status: backgroundWorkerInitialized}
//!   readiness resolved,
//!   queued requests flushed ────────────────────► runner
//! ```
//!
//! Both sides recognize control messages by their `status` field; the
//! foreground claims them before any other listener sees them.

pub mod background;
pub mod foreground;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::ProtocolError;
use crate::threads::{MarshalError, ThreadsError, Value};

pub use background::background_thread_start;
pub use foreground::{
    BackgroundAnalysis, BackgroundAnalysisOptions, Handshake, HandshakeState, HandshakeStep,
    Readiness, WorkerIndexAllocator,
};

/// Result type for handshake operations.
pub type HandshakeResult<T> = Result<T, HandshakeError>;

/// Errors raised while starting or talking to the background context.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error(transparent)]
    Threads(#[from] ThreadsError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The background analysis was terminated; no more requests are accepted.
    #[error("background analysis has been terminated")]
    Terminated,
}

/// Construction-time data for the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationData {
    pub root_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_channel_name: Option<String>,
    pub worker_index: u32,
}

/// Handshake messages, discriminated by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ControlMessage {
    BackgroundWorkerStarted,
    InitialWorkerData {
        #[serde(rename = "workerData")]
        worker_data: InitializationData,
    },
    BackgroundWorkerInitialized,
}

impl ControlMessage {
    /// Recognize a control message. Anything without a known `status`
    /// (or with a malformed body) is not one.
    pub fn parse(value: &Value) -> Option<Self> {
        value.get("status")?;
        match value.deserialize() {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::trace!(error = %e, "unrecognized status message");
                None
            }
        }
    }

    pub fn to_value(&self) -> Result<Value, MarshalError> {
        Value::from_serialize(self)
    }
}
