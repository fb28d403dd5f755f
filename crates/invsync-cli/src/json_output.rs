//! JSON output structures for the InvSync CLI

use serde::Serialize;

/// Operation metadata
#[derive(Debug, Serialize)]
pub struct OperationMetadata {
    /// InvSync version
    pub version: String,
    /// Command that produced the output
    pub operation: String,
    /// When the output was produced
    pub timestamp: String,
}

impl OperationMetadata {
    /// Metadata for `operation`, stamped now
    pub fn new(operation: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// JSON output of the read-only commands (`list`, `history`, `stats`)
#[derive(Debug, Serialize)]
pub struct JsonEnvelope<'a, T: Serialize> {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Command payload
    pub data: &'a T,
}

impl<'a, T: Serialize> JsonEnvelope<'a, T> {
    /// Wrap `data` produced by `operation`
    pub fn new(operation: &str, data: &'a T) -> Self {
        Self {
            metadata: OperationMetadata::new(operation),
            data,
        }
    }

    /// Pretty JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
