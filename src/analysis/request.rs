//! Wire types for analysis traffic between the two contexts.
//!
//! Requests flow foreground → background as `{requestType, data, port?,
//! sharedUsageBuffer?}` where `data` is a JSON text payload (or null).
//! Responses flow back as `{responseType, data}`.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ProtocolError, ProtocolResult};
use crate::threads::{MessagePort, SharedBuffer, TransferItem, Value};
use crate::vfs::FileMap;

// ============================================================================
// Request kinds
// ============================================================================

/// Base request asking the background to drop cached results and reanalyze.
pub const INVALIDATE_AND_FORCE_REANALYSIS: &str = "invalidateAndForceReanalysis";

/// Base request asking the background context to wind down.
pub const SHUTDOWN: &str = "shutdown";

/// Response emitted by the base engine after a reanalysis pass.
pub const ANALYSIS_COMPLETE: &str = "analysisComplete";

/// Request discriminant.
///
/// The three filesystem kinds are handled by the runner itself; every other
/// kind belongs to the base analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestType {
    InitialFiles,
    CreateFile,
    DeleteFile,
    Base(String),
}

impl RequestType {
    pub fn as_str(&self) -> &str {
        match self {
            RequestType::InitialFiles => "initialFiles",
            RequestType::CreateFile => "createFile",
            RequestType::DeleteFile => "deleteFile",
            RequestType::Base(name) => name,
        }
    }
}

impl From<&str> for RequestType {
    fn from(name: &str) -> Self {
        match name {
            "initialFiles" => RequestType::InitialFiles,
            "createFile" => RequestType::CreateFile,
            "deleteFile" => RequestType::DeleteFile,
            other => RequestType::Base(other.to_string()),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a workspace was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidatedReason {
    /// Files were added or removed.
    Reanalyzed,
    /// Configuration (including a freshly seeded config file) changed.
    SettingsChanged,
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of `initialFiles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialFilesPayload {
    pub initial_files: FileMap,
}

/// Payload of `createFile` and `deleteFile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUriPayload {
    pub file_uri: String,
}

/// Payload of `invalidateAndForceReanalysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidatePayload {
    pub reason: InvalidatedReason,
}

/// Encode a payload as the text carried in a request's `data` field.
pub fn serialize<T: Serialize + ?Sized>(payload: &T) -> ProtocolResult<String> {
    serde_json::to_string(payload).map_err(ProtocolError::Encode)
}

/// Decode a request's `data` field.
pub fn deserialize<T: DeserializeOwned>(data: Option<&str>) -> ProtocolResult<T> {
    let text = data.ok_or(ProtocolError::MissingData)?;
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

// ============================================================================
// Request
// ============================================================================

/// One unit of work sent to the background context.
///
/// Built by the foreground, consumed exactly once by the background.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub request_type: RequestType,
    pub data: Option<String>,
    /// Dedicated reply channel, transferred with the request.
    pub port: Option<MessagePort>,
    pub shared_usage_buffer: Option<SharedBuffer>,
}

impl AnalysisRequest {
    pub fn new(request_type: RequestType, data: Option<String>) -> Self {
        Self {
            request_type,
            data,
            port: None,
            shared_usage_buffer: None,
        }
    }

    pub fn with_port(mut self, port: MessagePort) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_shared_usage_buffer(mut self, buffer: SharedBuffer) -> Self {
        self.shared_usage_buffer = Some(buffer);
        self
    }

    pub fn initial_files(files: &FileMap) -> ProtocolResult<Self> {
        let data = serialize(&InitialFilesPayload {
            initial_files: files.clone(),
        })?;
        Ok(Self::new(RequestType::InitialFiles, Some(data)))
    }

    pub fn create_file(file_uri: &str) -> ProtocolResult<Self> {
        let data = serialize(&FileUriPayload {
            file_uri: file_uri.to_string(),
        })?;
        Ok(Self::new(RequestType::CreateFile, Some(data)))
    }

    pub fn delete_file(file_uri: &str) -> ProtocolResult<Self> {
        let data = serialize(&FileUriPayload {
            file_uri: file_uri.to_string(),
        })?;
        Ok(Self::new(RequestType::DeleteFile, Some(data)))
    }

    pub fn invalidate(reason: InvalidatedReason) -> ProtocolResult<Self> {
        let data = serialize(&InvalidatePayload { reason })?;
        Ok(Self::new(
            RequestType::Base(INVALIDATE_AND_FORCE_REANALYSIS.to_string()),
            Some(data),
        ))
    }

    pub fn shutdown() -> Self {
        Self::new(RequestType::Base(SHUTDOWN.to_string()), None)
    }

    /// Decode `data` into the payload type for this request.
    pub fn payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        deserialize(self.data.as_deref())
    }

    /// Ports that must travel in the transfer list alongside this request.
    pub fn transfer_list(&self) -> Vec<TransferItem> {
        self.port
            .iter()
            .map(|port| TransferItem::Port(port.clone()))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "requestType".to_string(),
            Value::from(self.request_type.as_str()),
        );
        map.insert(
            "data".to_string(),
            self.data.clone().map(Value::from).unwrap_or(Value::Null),
        );
        if let Some(port) = &self.port {
            map.insert("port".to_string(), Value::Port(port.clone()));
        }
        if let Some(buffer) = &self.shared_usage_buffer {
            map.insert("sharedUsageBuffer".to_string(), Value::Buffer(buffer.clone()));
        }
        Value::Object(map)
    }

    /// Read a request from a delivered message. Ports must already be
    /// wrapped (see `threads::marshal::wrap_inbound`).
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let request_type = value
            .get("requestType")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed(format!("missing requestType in {}", value.kind())))?;

        let data = match value.get("data") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "data must be text or null, got {}",
                    other.kind()
                )))
            }
        };

        let port = match value.get("port") {
            None | Some(Value::Null) => None,
            Some(Value::Port(port)) => Some(port.clone()),
            Some(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "port must be a message port, got {}",
                    other.kind()
                )))
            }
        };

        let shared_usage_buffer = match value.get("sharedUsageBuffer") {
            Some(Value::Buffer(buffer)) => Some(buffer.clone()),
            _ => None,
        };

        Ok(Self {
            request_type: RequestType::from(request_type),
            data,
            port,
            shared_usage_buffer,
        })
    }
}

// ============================================================================
// Response
// ============================================================================

/// Result sent from the background engine back to the foreground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub response_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AnalysisResponse {
    pub fn new(response_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            response_type: response_type.into(),
            data,
        }
    }

    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(Value::from_serialize(self)?)
    }
}
