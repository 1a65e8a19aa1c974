//! Storage trait definitions

use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("properties missing primary key '{key}' for label '{label}'")]
    MissingPrimaryKey { label: String, key: String },

    #[error("edge endpoint does not exist: {0}")]
    UnknownEndpoint(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Property map attached to nodes and edges
pub type Properties = HashMap<String, serde_json::Value>;

/// A stored node: label plus its property map.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub label: String,
    pub properties: Properties,
}

/// A stored edge.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub edge_id: String,
    pub from_id: String,
    pub to_id: String,
    pub rel_type: String,
    pub properties: Properties,
}

/// The primary-key field for a label: `{label}_id`, lowercase.
pub fn primary_key_field(label: &str) -> String {
    format!("{}_id", label.to_lowercase())
}

/// Extract the primary key value from a property map, or fail.
pub fn require_primary_key(label: &str, props: &Properties) -> StorageResult<String> {
    let key = primary_key_field(label);
    props
        .get(&key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| StorageError::MissingPrimaryKey {
            label: label.to_string(),
            key,
        })
}

/// Trait for graph storage backends
///
/// Implementations must be thread-safe (Send + Sync). Every successful
/// mutation appends exactly one event-log record; reads are repeatable
/// within a single logical operation.
pub trait GraphStore: Send + Sync {
    /// Execute a raw backend query with named parameters.
    ///
    /// Backends without a query language return `Unsupported`.
    fn execute(&self, query: &str, params: &Properties) -> StorageResult<Vec<Properties>>;

    /// Insert a node. Properties must contain the label's primary-key
    /// field (`{label}_id`). Returns the node id.
    fn add_node(&self, label: &str, props: Properties) -> StorageResult<String>;

    /// Insert an edge between two existing nodes. Returns the edge id.
    fn add_edge(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: Properties,
    ) -> StorageResult<String>;

    /// Fetch a node by id.
    fn get_node(&self, id: &str) -> StorageResult<Option<NodeRecord>>;

    /// Nodes adjacent to `id` (either direction), optionally filtered by
    /// relationship type.
    fn get_neighbors(&self, id: &str, rel_type: Option<&str>) -> StorageResult<Vec<NodeRecord>>;

    /// Every node, in insertion order. Used to hydrate the in-memory
    /// topology mirror at startup.
    fn all_nodes(&self) -> StorageResult<Vec<NodeRecord>>;

    /// Every edge, in insertion order.
    fn all_edges(&self) -> StorageResult<Vec<EdgeRecord>>;

    /// Release resources. Safe to call more than once.
    fn close(&self) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_key_field_is_lowercased_label() {
        assert_eq!(primary_key_field("Claim"), "claim_id");
        assert_eq!(primary_key_field("Paper"), "paper_id");
    }

    #[test]
    fn require_primary_key_accepts_present_key() {
        let mut props = Properties::new();
        props.insert("claim_id".into(), json!("c1"));
        assert_eq!(require_primary_key("Claim", &props).unwrap(), "c1");
    }

    #[test]
    fn require_primary_key_rejects_missing_key() {
        let props = Properties::new();
        let err = require_primary_key("Claim", &props).unwrap_err();
        assert!(matches!(err, StorageError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn require_primary_key_rejects_non_string() {
        let mut props = Properties::new();
        props.insert("claim_id".into(), json!(42));
        assert!(require_primary_key("Claim", &props).is_err());
    }
}
