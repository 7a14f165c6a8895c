//! Normalized virtual filesystem paths.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use super::{VfsError, VfsResult};

const FILE_SCHEME: &str = "file:";

/// Absolute, normalized path inside a virtual filesystem.
///
/// Always starts with `/`, never ends with one (except the root), and holds
/// no `.`, `..` or empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VfsPath(String);

impl VfsPath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize a plain filesystem path.
    pub fn from_path(path: &str) -> VfsResult<Self> {
        if !path.starts_with('/') {
            return Err(VfsError::InvalidPath(path.to_string()));
        }
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        Ok(Self(format!("/{}", segments.join("/"))))
    }

    /// Accept either a `file://` URI or a plain path.
    ///
    /// Only local files are addressed: the host must be empty or
    /// `localhost`. Query and fragment are not part of the path.
    pub fn parse(path_or_uri: &str) -> VfsResult<Self> {
        if !path_or_uri.starts_with(FILE_SCHEME) {
            return Self::from_path(path_or_uri);
        }
        let invalid = || VfsError::InvalidPath(path_or_uri.to_string());

        let url = Url::parse(path_or_uri).map_err(|_| invalid())?;
        if !matches!(url.host_str(), None | Some("") | Some("localhost")) {
            return Err(invalid());
        }
        let segments = url.path_segments().ok_or_else(invalid)?;

        let mut path = String::new();
        for segment in segments {
            let decoded = percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| invalid())?;
            if decoded.contains('/') {
                return Err(invalid());
            }
            path.push('/');
            path.push_str(&decoded);
        }
        if path.is_empty() {
            path.push('/');
        }
        Self::from_path(&path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Containing directory. `None` for the root.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Every ancestor from the root down, excluding `self`.
    pub fn ancestors(&self) -> Vec<VfsPath> {
        let mut chain = Vec::new();
        let mut current = self.parent();
        while let Some(dir) = current {
            current = dir.parent();
            chain.push(dir);
        }
        chain.reverse();
        chain
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
