//! Replication operations shared by both contexts.
//!
//! The foreground applies these to its own filesystem and sends the matching
//! request to the background, which applies the same operation to its copy.
//! Each operation is idempotent, so replaying a message is harmless.

use super::path::VfsPath;
use super::{FileMap, FileSystem, VfsResult};

fn ensure_parent<F: FileSystem + ?Sized>(fs: &F, path: &VfsPath) -> VfsResult<()> {
    if let Some(dir) = path.parent() {
        if !fs.exists(&dir) {
            fs.mkdir(&dir, true)?;
        }
    }
    Ok(())
}

/// Write every file, creating missing directories and overwriting content.
///
/// Every path is validated before the first write, so an invalid entry
/// leaves the filesystem untouched.
pub fn seed_all<F: FileSystem + ?Sized>(fs: &F, files: &FileMap) -> VfsResult<usize> {
    let entries = files
        .iter()
        .map(|(file, content)| Ok((VfsPath::from_path(file)?, content)))
        .collect::<VfsResult<Vec<_>>>()?;

    for (path, content) in entries {
        ensure_parent(fs, &path)?;
        fs.write_file(&path, content)?;
    }
    tracing::debug!(count = files.len(), "seeded virtual filesystem");
    Ok(files.len())
}

/// Create an empty file unless one already exists. Returns whether it was
/// created.
pub fn create_one<F: FileSystem + ?Sized>(fs: &F, path_or_uri: &str) -> VfsResult<bool> {
    let path = VfsPath::parse(path_or_uri)?;
    ensure_parent(fs, &path)?;
    if fs.exists(&path) {
        tracing::trace!(%path, "file already exists, create skipped");
        return Ok(false);
    }
    fs.write_file(&path, "")?;
    tracing::debug!(%path, "created file");
    Ok(true)
}

/// Remove a file if one exists. Directories and missing paths are left
/// alone. Returns whether a file was removed.
pub fn delete_one<F: FileSystem + ?Sized>(fs: &F, path_or_uri: &str) -> VfsResult<bool> {
    let path = VfsPath::parse(path_or_uri)?;
    if !fs.is_file(&path) {
        tracing::trace!(%path, "no file at path, delete skipped");
        return Ok(false);
    }
    fs.unlink(&path)?;
    tracing::debug!(%path, "deleted file");
    Ok(true)
}
