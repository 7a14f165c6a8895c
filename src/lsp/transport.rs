//! Transport layer - stdio
//!
//! The foreground context serves LSP over stdio. Logs go to stderr so they
//! never interleave with the protocol stream.

use std::sync::Arc;

use tower_lsp::{ClientSocket, LspService, Server};

use super::backend::{LspBackend, CREATE_FILE_METHOD, DELETE_FILE_METHOD};
use crate::analysis::EngineFactory;
use crate::config::WorkerSettings;
use crate::entry::entry_script;
use crate::server::ForegroundServer;

/// Build the LSP service with the custom file notifications registered.
pub fn build_service(settings: &WorkerSettings, engines: EngineFactory) -> (LspService<LspBackend>, ClientSocket) {
    let script = entry_script(settings.background_name.clone(), engines);
    let server = Arc::new(ForegroundServer::new(settings.clone(), script));

    LspService::build(move |client| LspBackend::new(client, server))
        .custom_method(CREATE_FILE_METHOD, LspBackend::create_file)
        .custom_method(DELETE_FILE_METHOD, LspBackend::delete_file)
        .finish()
}

/// Run the LSP server over stdio.
///
/// Must be awaited on the root context's runtime; background messages are
/// delivered there.
pub async fn run_stdio(settings: &WorkerSettings, engines: EngineFactory) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = build_service(settings, engines);

    tracing::info!(background = %settings.background_name, "serving LSP over stdio");
    Server::new(stdin, stdout, socket).serve(service).await;
}
