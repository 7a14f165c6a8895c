//! Background analysis: request wire types, the runner that owns the
//! background filesystem, and the seam to the analysis engine.

mod engine;
pub mod request;
mod runner;

use thiserror::Error;

use crate::threads::{MarshalError, ThreadsError};
use crate::vfs::VfsError;

pub use engine::{AnalysisEngine, BaseEngine, EngineFactory, RunnerContext};
pub use request::{
    AnalysisRequest, AnalysisResponse, FileUriPayload, InitialFilesPayload, InvalidatePayload,
    InvalidatedReason, RequestType,
};
pub use runner::BackgroundAnalysisRunner;

/// Result type for analysis protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or applying analysis requests.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message is not shaped like a request.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// The request needs a payload but `data` was null.
    #[error("request carries no data")]
    MissingData,

    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The runner was built before startup data arrived.
    #[error("no worker data available in this context")]
    MissingWorkerData,

    /// The runner was built outside of a child context.
    #[error("not running inside a child execution context")]
    NoParentPort,

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Threads(#[from] ThreadsError),

    #[error(transparent)]
    Vfs(#[from] VfsError),
}
