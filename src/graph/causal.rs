//! The causal claim graph
//!
//! Writes claims and adjudicated relationships through a pluggable storage
//! backend while mirroring the topology in memory for interactive queries.
//! The mirror is guarded by a readers-writer lock; queries take shared
//! access, mutations exclusive.

use super::topology::{Contradiction, FrontierEdge, MirrorEdge, TopologyView};
use crate::adjudicate::DebateResult;
use crate::claim::{Claim, ClaimId, Paper};
use crate::storage::{GraphStore, Properties, StorageError};
use serde_json::json;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// Errors from causal-graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for causal-graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// The causal graph over a storage backend.
pub struct CausalGraph {
    store: Arc<dyn GraphStore>,
    topology: RwLock<TopologyView>,
    /// Last contradiction query result, invalidated on edge writes
    contradiction_cache: Mutex<Option<(f64, Vec<Contradiction>)>>,
}

impl CausalGraph {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            topology: RwLock::new(TopologyView::new()),
            contradiction_cache: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn node_count(&self) -> usize {
        self.topology.read().expect("topology lock").node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.topology.read().expect("topology lock").edge_count()
    }

    pub fn contains(&self, id: &ClaimId) -> bool {
        self.topology.read().expect("topology lock").contains(id)
    }

    /// Whether the unordered pair `{a, b}` already has a relationship.
    /// One edge per canonical pair; re-adjudication is a no-op upstream.
    pub fn has_relationship(&self, a: &ClaimId, b: &ClaimId) -> bool {
        self.topology
            .read()
            .expect("topology lock")
            .has_edge_between(a, b)
    }

    /// Rebuild the topology mirror from persisted storage. Call once at
    /// startup when reopening an existing database. Returns the number of
    /// mirrored nodes.
    pub fn hydrate(&self) -> GraphResult<usize> {
        let mut view = TopologyView::new();

        for node in self.store.all_nodes()? {
            if node.label != "Claim" {
                continue;
            }
            if let Some(id) = node.properties.get("claim_id").and_then(|v| v.as_str()) {
                view.add_node(ClaimId::from(id));
            }
        }

        for edge in self.store.all_edges()? {
            if edge.rel_type != "RELATES" {
                continue;
            }
            let relation = edge
                .properties
                .get("relation_type")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(crate::adjudicate::Verdict::Uncertain);
            let confidence = edge
                .properties
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let citations: Vec<ClaimId> = edge
                .properties
                .get("citations")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            view.add_edge(MirrorEdge {
                from: ClaimId::from(edge.from_id.as_str()),
                to: ClaimId::from(edge.to_id.as_str()),
                relation,
                confidence,
                citations,
            });
        }

        let count = view.node_count();
        *self.topology.write().expect("topology lock") = view;
        *self.contradiction_cache.lock().expect("cache lock") = None;
        tracing::info!(nodes = count, "hydrated topology mirror");
        Ok(count)
    }

    /// Persist a claim node and mirror it.
    pub fn add_claim(&self, claim: &Claim) -> GraphResult<ClaimId> {
        let mut props = Properties::new();
        props.insert("claim_id".into(), json!(claim.id.as_str()));
        props.insert("paper_id".into(), json!(claim.paper_id));
        props.insert("section".into(), json!(claim.section));
        props.insert("claim_type".into(), json!(claim.claim_type.to_string()));
        props.insert("text".into(), json!(claim.text));
        props.insert("confidence".into(), json!(claim.confidence));
        props.insert("embedding".into(), json!(claim.embedding));

        self.store.add_node("Claim", props)?;
        self.topology
            .write()
            .expect("topology lock")
            .add_node(claim.id.clone());
        Ok(claim.id.clone())
    }

    /// Persist paper-level metadata. Returns `Ok(None)` when a node with
    /// this paper id already exists, so re-ingest stays a no-op.
    pub fn add_paper(&self, paper: &Paper) -> GraphResult<Option<String>> {
        if self.store.get_node(&paper.paper_id)?.is_some() {
            tracing::debug!(paper_id = %paper.paper_id, "paper already persisted");
            return Ok(None);
        }

        let mut props = Properties::new();
        props.insert("paper_id".into(), json!(paper.paper_id));
        props.insert("title".into(), json!(paper.title));
        props.insert("authors".into(), json!(paper.authors));
        props.insert("year".into(), json!(paper.year));
        props.insert("doi".into(), json!(paper.doi));
        props.insert("arxiv_id".into(), json!(paper.arxiv_id));
        props.insert("raw_text".into(), json!(paper.raw_text));
        props.insert(
            "summary_embedding".into(),
            json!(paper.summary_embedding),
        );
        Ok(Some(self.store.add_node("Paper", props)?))
    }

    /// Persist an adjudicated relationship as a `RELATES` edge and mirror
    /// it. One edge per unordered pair: returns `Ok(None)` when the pair
    /// is already related. Citations are restricted to claims known to the
    /// graph at write time; unknown ids are dropped with a warning.
    pub fn add_relationship(
        &self,
        from_id: &ClaimId,
        to_id: &ClaimId,
        result: &DebateResult,
    ) -> GraphResult<Option<String>> {
        // The check and both writes happen under the mirror's write lock
        // so concurrent adjudications of the same pair cannot both land
        let mut topology = self.topology.write().expect("topology lock");
        if topology.has_edge_between(from_id, to_id) {
            tracing::debug!(from = %from_id, to = %to_id, "pair already related");
            return Ok(None);
        }

        let mut citations: Vec<ClaimId> = Vec::new();
        for citation in &result.citations {
            if topology.contains(citation) {
                citations.push(citation.clone());
            } else {
                tracing::warn!(citation = %citation, "dropping citation of unknown claim");
            }
        }

        let mut props = Properties::new();
        props.insert("relation_type".into(), json!(result.verdict.to_string()));
        props.insert("confidence".into(), json!(result.calibrated_confidence));
        props.insert(
            "citations".into(),
            json!(serde_json::to_string(&citations)?),
        );
        props.insert(
            "transcript".into(),
            json!(serde_json::to_string(&result.transcript)?),
        );

        let edge_id = self
            .store
            .add_edge(from_id.as_str(), to_id.as_str(), "RELATES", props)?;

        topology.add_edge(MirrorEdge {
            from: from_id.clone(),
            to: to_id.clone(),
            relation: result.verdict,
            confidence: result.calibrated_confidence,
            citations,
        });
        drop(topology);
        *self.contradiction_cache.lock().expect("cache lock") = None;
        Ok(Some(edge_id))
    }

    /// High-confidence refutation edges (default threshold 0.85).
    pub fn find_contradictions(&self, min_confidence: f64) -> Vec<Contradiction> {
        {
            let cache = self.contradiction_cache.lock().expect("cache lock");
            if let Some((threshold, ref cached)) = *cache {
                if threshold == min_confidence {
                    return cached.clone();
                }
            }
        }
        let found = self
            .topology
            .read()
            .expect("topology lock")
            .find_contradictions(min_confidence);
        *self.contradiction_cache.lock().expect("cache lock") =
            Some((min_confidence, found.clone()));
        found
    }

    /// Claims with no incoming `supports` edge and degree at least
    /// `min_degree`.
    pub fn find_unsupported(&self, min_degree: usize) -> Vec<ClaimId> {
        self.topology
            .read()
            .expect("topology lock")
            .find_unsupported(min_degree)
    }

    /// Low-confidence edges between well-connected claims.
    pub fn find_frontier(&self, max_confidence: f64, min_degree: usize) -> Vec<FrontierEdge> {
        self.topology
            .read()
            .expect("topology lock")
            .find_frontier(max_confidence, min_degree)
    }

    /// Shortest undirected path between two claims.
    pub fn evidence_path(&self, a: &ClaimId, b: &ClaimId) -> Vec<ClaimId> {
        self.topology
            .read()
            .expect("topology lock")
            .evidence_path(a, b)
    }

    /// PageRank importance of one claim.
    pub fn importance(&self, id: &ClaimId) -> f64 {
        self.topology.read().expect("topology lock").importance(id)
    }

    /// A serialisable `{nodes, edges}` snapshot for downstream consumers.
    pub fn export_view(&self) -> serde_json::Value {
        let topology = self.topology.read().expect("topology lock");
        let ranks = topology.pagerank();

        let nodes: Vec<serde_json::Value> = topology
            .nodes()
            .iter()
            .map(|id| {
                json!({
                    "id": id.as_str(),
                    "importance": ranks.get(id).copied().unwrap_or(0.0),
                })
            })
            .collect();

        let edges: Vec<serde_json::Value> = topology
            .edges()
            .iter()
            .map(|e| {
                json!({
                    "from": e.from.as_str(),
                    "to": e.to.as_str(),
                    "relation": e.relation.to_string(),
                    "confidence": e.confidence,
                })
            })
            .collect();

        json!({ "nodes": nodes, "edges": edges })
    }
}
