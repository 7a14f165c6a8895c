//! Threading-API emulation over an isolated, message-only primitive.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────┐          ┌───────────────────────────────┐
//! │ parent context                │          │ child context (own thread)    │
//! │                               │          │                               │
//! │  Worker ── marshal ──┐        │  clone   │        ┌── GlobalScope ──┐    │
//! │                      ▼        │ ───────► │        ▼                 │    │
//! │              ContextWorker ◄──┼──────────┼──► NativePort pump       │    │
//! │                               │          │                          │    │
//! │  MessagePort ─ NativePort ◄───┼──────────┼──► NativePort ─ MessagePort  │
//! └───────────────────────────────┘          └───────────────────────────────┘
//! ```
//!
//! The `native` module is the primitive: entangled ports, a child's global
//! scope, structured clone. `port`, `worker` and `marshal` build the richer
//! threading API on top of it, and `context` holds the per-context globals.

pub mod context;
pub mod marshal;
pub mod native;
pub mod port;
mod value;
mod worker;

use std::io;
use thiserror::Error;

pub use context::{
    is_main_thread, parent_port, set_is_main_thread, set_worker_data, thread_id, worker_data,
};
pub use native::{
    native_channel, structured_clone, ContextOptions, ContextWorker, DataCloneError, EventTarget,
    Flow, GlobalScope, Listener, ListenerId, MessageEvent, NativePort, Script, Transferable,
};
pub use port::{EventKind, MessageChannel, MessagePort, PortEndpoint, TransferItem};
pub use value::{DomainObject, DomainValue, MarshalError, SharedBuffer, Value};
pub use worker::{Worker, WorkerOptions};

/// Result type for threading operations.
pub type ThreadsResult<T> = Result<T, ThreadsError>;

/// Errors raised by the threading layer.
#[derive(Error, Debug)]
pub enum ThreadsError {
    /// The OS refused to create the context thread.
    #[error("failed to spawn execution context: {0}")]
    SpawnFailed(#[source] io::Error),

    /// A context was created outside of an async runtime.
    #[error("no async runtime available to deliver messages")]
    NoRuntime,

    /// The primitive refused to clone a payload.
    #[error(transparent)]
    DataClone(#[from] DataCloneError),

    /// A payload could not be marshalled.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// A transfer list named something that cannot be transferred.
    #[error("not transferable: {0}")]
    NotTransferable(&'static str),

    /// Startup data was delivered twice.
    #[error("worker data has already been set for this context")]
    WorkerDataAlreadySet,
}
