//! # twinlsp
//!
//! A language server run as two isolated execution contexts that only talk
//! through message passing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            LSP client (stdio)                            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [lsp]
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foreground context (root)                               │
//! │  ForegroundServer: vfs copy, workspaces                  │
//! │  BackgroundAnalysis: handshake, readiness-gated queue    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [threads: Worker / MessagePort]
//! ┌─────────────────────────────────────────────────────────┐
//! │  Background context (own thread)                         │
//! │  BackgroundAnalysisRunner: vfs copy, AnalysisEngine      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Both contexts evaluate the same entry script ([`entry`]); the context
//! name selects the role. The [`handshake`] delivers startup data that the
//! message primitive cannot pass at construction, and [`vfs::replicate`]
//! keeps the two in-memory filesystems converging.

pub mod analysis;
pub mod config;
pub mod entry;
pub mod handshake;
pub mod host;
pub mod lsp;
pub mod server;
pub mod threads;
pub mod vfs;

pub use analysis::{AnalysisEngine, AnalysisRequest, AnalysisResponse, BaseEngine, EngineFactory};
pub use config::Settings;
pub use entry::{entry_script, Role, BACKGROUND_THREAD_NAME};
pub use handshake::{BackgroundAnalysis, InitializationData};
pub use server::{ForegroundServer, Workspace};
