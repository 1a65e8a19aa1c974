//! In-memory storage backend
//!
//! Dictionary-backed store for tests and ephemeral runs. Mutations append
//! to an in-memory event log so the event-log completeness invariant can be
//! asserted without touching disk.

use super::events::EventLog;
use super::traits::{
    require_primary_key, EdgeRecord, GraphStore, NodeRecord, Properties, StorageError,
    StorageResult,
};
use dashmap::DashMap;
use serde_json::json;
use std::sync::RwLock;

/// In-memory graph store.
pub struct MemoryStore {
    nodes: DashMap<String, NodeRecord>,
    /// Node ids in insertion order
    node_order: RwLock<Vec<String>>,
    /// Insertion-ordered edge list
    edges: RwLock<Vec<EdgeRecord>>,
    events: EventLog,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            node_order: RwLock::new(Vec::new()),
            edges: RwLock::new(Vec::new()),
            events: EventLog::in_memory(),
        }
    }

    /// The event log, for completeness assertions in tests.
    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().expect("edge lock").len()
    }
}

impl GraphStore for MemoryStore {
    fn execute(&self, query: &str, _params: &Properties) -> StorageResult<Vec<Properties>> {
        Err(StorageError::Unsupported(format!(
            "memory backend has no query language (got: {})",
            query
        )))
    }

    fn add_node(&self, label: &str, props: Properties) -> StorageResult<String> {
        let node_id = require_primary_key(label, &props)?;

        if self
            .nodes
            .insert(
                node_id.clone(),
                NodeRecord {
                    label: label.to_string(),
                    properties: props.clone(),
                },
            )
            .is_none()
        {
            self.node_order
                .write()
                .expect("node order lock")
                .push(node_id.clone());
        }
        self.events.append(
            "add_node",
            json!({ "label": label, "properties": props }),
        )?;
        Ok(node_id)
    }

    fn add_edge(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: Properties,
    ) -> StorageResult<String> {
        if !self.nodes.contains_key(from_id) {
            return Err(StorageError::UnknownEndpoint(from_id.to_string()));
        }
        if !self.nodes.contains_key(to_id) {
            return Err(StorageError::UnknownEndpoint(to_id.to_string()));
        }

        let edge_id = uuid::Uuid::new_v4().to_string();
        self.edges.write().expect("edge lock").push(EdgeRecord {
            edge_id: edge_id.clone(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            rel_type: rel_type.to_string(),
            properties: props.clone(),
        });
        self.events.append(
            "add_edge",
            json!({
                "from_id": from_id,
                "to_id": to_id,
                "rel_type": rel_type,
                "properties": props,
            }),
        )?;
        Ok(edge_id)
    }

    fn get_node(&self, id: &str) -> StorageResult<Option<NodeRecord>> {
        Ok(self.nodes.get(id).map(|r| r.clone()))
    }

    fn get_neighbors(&self, id: &str, rel_type: Option<&str>) -> StorageResult<Vec<NodeRecord>> {
        let edges = self.edges.read().expect("edge lock");
        let mut neighbors = Vec::new();
        for edge in edges.iter() {
            if let Some(rel) = rel_type {
                if edge.rel_type != rel {
                    continue;
                }
            }
            let other = if edge.from_id == id {
                &edge.to_id
            } else if edge.to_id == id {
                &edge.from_id
            } else {
                continue;
            };
            if let Some(node) = self.nodes.get(other) {
                neighbors.push(node.clone());
            }
        }
        Ok(neighbors)
    }

    fn all_nodes(&self) -> StorageResult<Vec<NodeRecord>> {
        let order = self.node_order.read().expect("node order lock");
        Ok(order
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|r| r.clone()))
            .collect())
    }

    fn all_edges(&self) -> StorageResult<Vec<EdgeRecord>> {
        Ok(self.edges.read().expect("edge lock").clone())
    }

    fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
