//! Foreground server.
//!
//! Holds the foreground filesystem and the workspaces, owns the background
//! analysis, and keeps the background filesystem in step with its own.

mod workspace;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::analysis::{AnalysisRequest, InvalidatedReason};
use crate::config::{SettingsError, WorkerSettings};
use crate::handshake::{
    BackgroundAnalysis, BackgroundAnalysisOptions, HandshakeError, WorkerIndexAllocator,
};
use crate::host::{Host, NoAccessHost};
use crate::threads::Script;
use crate::vfs::{self, FileMap, MemoryFileSystem, VfsError};

pub use workspace::Workspace;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// The foreground half of the language server.
pub struct ForegroundServer {
    settings: WorkerSettings,
    script: Script,
    fs: Arc<MemoryFileSystem>,
    host: Arc<dyn Host>,
    allocator: WorkerIndexAllocator,
    initial_files: Mutex<Option<FileMap>>,
    workspaces: Mutex<Vec<Arc<Workspace>>>,
}

impl ForegroundServer {
    /// `script` is the entry script the background context evaluates.
    pub fn new(settings: WorkerSettings, script: Script) -> Self {
        Self {
            settings,
            script,
            fs: Arc::new(MemoryFileSystem::new()),
            host: Arc::new(NoAccessHost),
            allocator: WorkerIndexAllocator::new(),
            initial_files: Mutex::new(None),
            workspaces: Mutex::new(Vec::new()),
        }
    }

    pub fn file_system(&self) -> &Arc<MemoryFileSystem> {
        &self.fs
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn workspaces(&self) -> Vec<Arc<Workspace>> {
        self.workspaces.lock().clone()
    }

    pub fn initial_files(&self) -> Option<FileMap> {
        self.initial_files.lock().clone()
    }

    /// Seed the foreground filesystem and start the background analysis.
    ///
    /// The background is seeded with the same files once its handshake
    /// completes, then reanalyzed so a seeded config file takes effect.
    /// The server only counts as initialized once every step has succeeded;
    /// a failed call can be retried.
    pub fn initialize(&self, files: FileMap) -> ServerResult<Arc<Workspace>> {
        let mut initial = self.initial_files.lock();
        if initial.is_some() {
            return Err(ServerError::AlreadyInitialized);
        }

        let root_path = self.settings.resolved_root_path()?;
        vfs::seed_all(self.fs.as_ref(), &files)?;

        let background = Arc::new(self.create_background_analysis(&root_path)?);
        background.initial_files(&files)?;

        let workspace = Arc::new(Workspace::new(root_path, background));
        workspace.invalidate_and_force_reanalysis(InvalidatedReason::SettingsChanged)?;

        tracing::info!(files = files.len(), host = ?self.host.kind(), "foreground initialized");
        self.workspaces.lock().push(workspace.clone());
        *initial = Some(files);
        Ok(workspace)
    }

    fn create_background_analysis(&self, root_path: &str) -> ServerResult<BackgroundAnalysis> {
        let options = BackgroundAnalysisOptions {
            background_name: self.settings.background_name.clone(),
            root_path: root_path.to_string(),
            cancellation_channel_name: None,
            warn_after: self.settings.handshake_warn_after(),
        };
        Ok(BackgroundAnalysis::new(&self.script, options, &self.allocator)?)
    }

    /// Create an empty file here and in every background.
    pub fn create_file(&self, uri: &str) -> ServerResult<()> {
        vfs::create_one(self.fs.as_ref(), uri)?;
        for workspace in self.workspaces() {
            workspace.background().create_file(uri)?;
            workspace.invalidate_and_force_reanalysis(InvalidatedReason::Reanalyzed)?;
        }
        Ok(())
    }

    /// Delete a file here and in every background.
    pub fn delete_file(&self, uri: &str) -> ServerResult<()> {
        vfs::delete_one(self.fs.as_ref(), uri)?;
        for workspace in self.workspaces() {
            workspace.background().delete_file(uri)?;
            workspace.invalidate_and_force_reanalysis(InvalidatedReason::Reanalyzed)?;
        }
        Ok(())
    }

    /// Ask every background to stop, then tear it down.
    pub async fn shutdown(&self) {
        let workspaces: Vec<_> = self.workspaces.lock().drain(..).collect();
        for workspace in workspaces {
            let background = workspace.background();
            if let Err(e) = background.enqueue_request(AnalysisRequest::shutdown()) {
                tracing::debug!(error = %e, "shutdown request not queued");
            }
            background.terminate().await;
        }
    }
}

impl std::fmt::Debug for ForegroundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundServer")
            .field("settings", &self.settings)
            .field("workspaces", &self.workspaces.lock().len())
            .finish()
    }
}
