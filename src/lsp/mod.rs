//! Language Server Protocol front-end for the foreground context

pub mod backend;
pub mod transport;

// Re-export main entry points
pub use backend::{FileNotificationParams, LspBackend, CREATE_FILE_METHOD, DELETE_FILE_METHOD};
pub use transport::{build_service, run_stdio};
