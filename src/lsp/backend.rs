//! LSP Backend - implements tower_lsp::LanguageServer
//!
//! Drives the foreground server from LSP traffic: `initialize` seeds the
//! virtual filesystems from `initializationOptions.files`, the custom
//! `$/createFile` and `$/deleteFile` notifications keep them in step, and
//! `shutdown` tears the background context down.

use std::sync::Arc;

use serde::Deserialize;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::analysis::AnalysisResponse;
use crate::server::ForegroundServer;
use crate::vfs::FileMap;

/// Custom notification creating an empty file.
pub const CREATE_FILE_METHOD: &str = "$/createFile";

/// Custom notification deleting a file.
pub const DELETE_FILE_METHOD: &str = "$/deleteFile";

/// Params of `$/createFile` and `$/deleteFile`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileNotificationParams {
    pub uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct InitializationOptions {
    #[serde(default)]
    files: FileMap,
}

/// Read the initial file set from `initializationOptions`.
pub fn initial_files(options: Option<serde_json::Value>) -> std::result::Result<FileMap, serde_json::Error> {
    match options {
        None | Some(serde_json::Value::Null) => Ok(FileMap::new()),
        Some(value) => Ok(serde_json::from_value::<InitializationOptions>(value)?.files),
    }
}

/// The LSP backend state.
pub struct LspBackend {
    /// The LSP client for sending notifications back to the editor.
    client: Client,
    server: Arc<ForegroundServer>,
}

impl LspBackend {
    pub fn new(client: Client, server: Arc<ForegroundServer>) -> Self {
        Self { client, server }
    }

    pub fn server(&self) -> &Arc<ForegroundServer> {
        &self.server
    }

    /// Handler for `$/createFile`.
    pub async fn create_file(&self, params: FileNotificationParams) {
        let message = match self.server.create_file(&params.uri) {
            Ok(()) => return,
            Err(e) => format!("createFile {} failed: {}", params.uri, e),
        };
        tracing::warn!("{}", message);
        self.client.log_message(MessageType::ERROR, message).await;
    }

    /// Handler for `$/deleteFile`.
    pub async fn delete_file(&self, params: FileNotificationParams) {
        let message = match self.server.delete_file(&params.uri) {
            Ok(()) => return,
            Err(e) => format!("deleteFile {} failed: {}", params.uri, e),
        };
        tracing::warn!("{}", message);
        self.client.log_message(MessageType::ERROR, message).await;
    }

    /// Relay background responses to the client log.
    fn forward_responses(&self, mut responses: tokio::sync::mpsc::UnboundedReceiver<AnalysisResponse>) {
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                client
                    .log_message(
                        MessageType::LOG,
                        format!("{}: {}", response.response_type, response.data),
                    )
                    .await;
            }
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for LspBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let files = initial_files(params.initialization_options)
            .map_err(|e| Error::invalid_params(format!("invalid initializationOptions: {}", e)))?;

        let workspace = self.server.initialize(files).map_err(|e| {
            tracing::error!(error = %e, "initialization failed");
            let mut error = Error::internal_error();
            error.message = e.to_string().into();
            error
        })?;
        if let Some(responses) = workspace.background().take_responses() {
            self.forward_responses(responses);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities::default(),
            server_info: Some(ServerInfo {
                name: "twinlsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "twinlsp foreground initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.server.shutdown().await;
        Ok(())
    }
}
