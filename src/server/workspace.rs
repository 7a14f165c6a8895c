//! Workspaces served by the foreground.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::analysis::InvalidatedReason;
use crate::handshake::{BackgroundAnalysis, HandshakeResult};

/// One analyzed root, backed by a background analysis.
#[derive(Debug)]
pub struct Workspace {
    root_path: String,
    background: Arc<BackgroundAnalysis>,
    invalidations: AtomicU64,
}

impl Workspace {
    pub fn new(root_path: impl Into<String>, background: Arc<BackgroundAnalysis>) -> Self {
        Self {
            root_path: root_path.into(),
            background,
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn background(&self) -> &Arc<BackgroundAnalysis> {
        &self.background
    }

    /// Drop analysis results and ask the background to redo them.
    pub fn invalidate_and_force_reanalysis(&self, reason: InvalidatedReason) -> HandshakeResult<()> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(root = %self.root_path, ?reason, "workspace invalidated");
        self.background.invalidate(reason)
    }

    /// How many times this workspace was invalidated.
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }
}
