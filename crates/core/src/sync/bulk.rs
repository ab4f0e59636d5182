//! Bulk write vocabulary shared by the engine and index clients.

use serde::{Deserialize, Serialize};

/// One write against the user index.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Index {
        id: String,
        document: serde_json::Value,
        /// Merge into an existing document, creating it when missing.
        upsert: bool,
        retry_on_conflict: u32,
    },
    Delete {
        id: String,
    },
}

impl BulkOperation {
    pub fn upsert(id: impl Into<String>, document: serde_json::Value, retry_on_conflict: u32) -> Self {
        Self::Index {
            id: id.into(),
            document,
            upsert: true,
            retry_on_conflict,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::Delete { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id } => id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Outcome of one item in a bulk response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemResult {
    /// `index`, `update`, `create` or `delete`.
    pub action: String,
    pub id: String,
    pub status: u16,
    pub result: Option<String>,
    pub error: Option<serde_json::Value>,
}

impl BulkItemResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Decoded bulk response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub took: u64,
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn failed_items(&self) -> Vec<&BulkItemResult> {
        self.items.iter().filter(|item| item.is_failure()).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.errors || self.items.iter().any(BulkItemResult::is_failure)
    }
}

/// Painless script with parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub source: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Script {
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            params: serde_json::Map::new(),
        }
    }
}

/// What to do when a document changed between read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Abort,
    Proceed,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Proceed => "proceed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateByQueryRequest {
    pub query: serde_json::Value,
    pub script: Script,
    pub conflicts: ConflictPolicy,
    pub refresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateByQueryResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub version_conflicts: u64,
    #[serde(default)]
    pub failures: Vec<serde_json::Value>,
}
