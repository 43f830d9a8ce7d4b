use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::params::ControlParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "human")]
    User,
    #[serde(rename = "ai")]
    Assistant,
}

/// Only `"ai"` marks the assistant; any other tag reads back as the user.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(if tag == "ai" { Role::Assistant } else { Role::User })
    }
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

/// A structured filter instruction: `{"operation": .., "params": {..}, "reason": ..}`.
///
/// Unknown extra keys are dropped; `params` and `reason` default to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub reason: String,
}

impl OperationRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: Map::new(),
            reason: String::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Informational log line for an operation applied to an image. Never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: String,
    pub operation: OperationRequest,
}

/// Everything the session remembers about one Image Key.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    original: Vec<u8>,
    pub image_path: Option<String>,
    pub params: ControlParams,
    pub messages: Vec<ConversationEntry>,
    pub operations: Vec<OperationRecord>,
    pub rendered: Option<Vec<u8>>,
}

impl SessionRecord {
    pub fn new(original: Vec<u8>, image_path: Option<String>) -> Self {
        Self {
            original,
            image_path,
            params: ControlParams::default(),
            messages: Vec::new(),
            operations: Vec::new(),
            rendered: None,
        }
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Hex SHA-256 of the original bytes.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.original)
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Derives the Image Key for a path: its file name.
///
/// Two different files sharing a base name map to the same key and therefore
/// the same session.
pub fn image_key_for(path: &Path) -> String {
    path.file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
