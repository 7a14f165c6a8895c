//! Host capabilities available to the analyzer.
//!
//! Neither context may touch the real machine: there is no interpreter to
//! query and no search path outside the virtual filesystem.

use std::fmt;

/// Level of access a host grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    NoAccess,
}

/// Environment queries the analyzer may make.
pub trait Host: fmt::Debug + Send + Sync {
    fn kind(&self) -> HostKind;

    /// Import roots contributed by the environment.
    fn search_paths(&self) -> Vec<String>;
}

/// Host that answers every query with "nothing available".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccessHost;

impl Host for NoAccessHost {
    fn kind(&self) -> HostKind {
        HostKind::NoAccess
    }

    fn search_paths(&self) -> Vec<String> {
        Vec::new()
    }
}
