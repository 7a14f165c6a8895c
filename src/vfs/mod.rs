//! Virtual filesystem.
//!
//! Each execution context holds its own [`MemoryFileSystem`]; the
//! [`replicate`] operations keep the two copies converging.

mod memory;
mod path;
pub mod replicate;

use std::collections::BTreeMap;

use thiserror::Error;

pub use memory::MemoryFileSystem;
pub use path::VfsPath;
pub use replicate::{create_one, delete_one, seed_all};

/// File path to file content.
pub type FileMap = BTreeMap<String, String>;

/// Result type for filesystem operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors raised by filesystem operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VfsError {
    #[error("no such file or directory: {0}")]
    NotFound(VfsPath),

    #[error("not a directory: {0}")]
    NotADirectory(VfsPath),

    #[error("is a directory: {0}")]
    IsADirectory(VfsPath),

    #[error("already exists: {0}")]
    AlreadyExists(VfsPath),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Filesystem operations the replication protocol relies on.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &VfsPath) -> bool;

    /// Whether a regular file (not a directory) lives at `path`.
    fn is_file(&self, path: &VfsPath) -> bool;

    fn mkdir(&self, path: &VfsPath, recursive: bool) -> VfsResult<()>;

    /// Create or overwrite a file. The parent directory must exist.
    fn write_file(&self, path: &VfsPath, content: &str) -> VfsResult<()>;

    fn read_file(&self, path: &VfsPath) -> VfsResult<String>;

    fn unlink(&self, path: &VfsPath) -> VfsResult<()>;
}
