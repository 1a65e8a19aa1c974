//! Dense vector index over claims
//!
//! An HNSW graph plus an append-only metadata side-table, guarded together by
//! one readers-writer lock: one writer, many readers. Internal graph ids map
//! bijectively to claim ids. Snapshots are atomic write-then-rename of both
//! the graph and the side-table.

mod hnsw;

pub use hnsw::{HnswGraph, HnswParams};

use crate::claim::{ClaimId, EvidenceHit};
use crate::persist::write_atomic;
use crate::provider::{with_retry, Embedder, ProviderError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors from index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("claim already indexed: {0}")]
    DuplicateId(String),

    #[error("claim not indexed: {0}")]
    UnknownClaim(String),

    #[error("vector dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Metadata side-table, persisted next to the graph snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MetaTable {
    /// claim id → internal graph id
    id_to_index: HashMap<String, u32>,
    /// claim id → arbitrary metadata (must include "text" for evidence hits)
    id_to_metadata: HashMap<String, HashMap<String, serde_json::Value>>,
}

struct Inner {
    graph: HnswGraph,
    meta: MetaTable,
    /// Reverse mapping; position equals the internal graph id
    index_to_id: Vec<ClaimId>,
}

/// The claim vector index.
///
/// Clone-cheap handle: wraps the locked state in an `Arc`.
#[derive(Clone)]
pub struct ClaimIndex {
    inner: Arc<RwLock<Inner>>,
    embedder: Arc<dyn Embedder>,
}

impl ClaimIndex {
    /// Create an empty index with default HNSW parameters.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_params(embedder, HnswParams::default())
    }

    pub fn with_params(embedder: Arc<dyn Embedder>, params: HnswParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                graph: HnswGraph::new(params),
                meta: MetaTable::default(),
                index_to_id: Vec::new(),
            })),
            embedder,
        }
    }

    /// Number of indexed claims.
    pub fn len(&self) -> usize {
        self.inner.read().expect("index lock").graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, claim_id: &ClaimId) -> bool {
        self.inner
            .read()
            .expect("index lock")
            .meta
            .id_to_index
            .contains_key(claim_id.as_str())
    }

    /// Append a claim vector with its metadata.
    ///
    /// All-or-nothing: on any failure the metadata table is untouched.
    pub fn index(
        &self,
        claim_id: &ClaimId,
        vector: &[f32],
        metadata: HashMap<String, serde_json::Value>,
    ) -> IndexResult<()> {
        let mut inner = self.inner.write().expect("index lock");

        if inner.meta.id_to_index.contains_key(claim_id.as_str()) {
            return Err(IndexError::DuplicateId(claim_id.to_string()));
        }
        if let Some(existing) = inner.index_to_id.first() {
            let expected = inner
                .meta
                .id_to_index
                .get(existing.as_str())
                .and_then(|&i| inner.graph.vector(i))
                .map(|v| v.len())
                .unwrap_or(vector.len());
            if vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: vector.len(),
                });
            }
        }

        let internal = inner.graph.insert(vector.to_vec());
        inner
            .meta
            .id_to_index
            .insert(claim_id.to_string(), internal);
        inner
            .meta
            .id_to_metadata
            .insert(claim_id.to_string(), metadata);
        inner.index_to_id.push(claim_id.clone());
        Ok(())
    }

    /// Embed the query text, then search by vector.
    pub async fn search_by_text(
        &self,
        query: &str,
        k: usize,
        min_similarity: f64,
    ) -> IndexResult<Vec<EvidenceHit>> {
        validate_search_params(k, min_similarity)?;
        let texts = vec![query.to_string()];
        let embeddings = with_retry(|| self.embedder.embed(&texts)).await?;
        let query_vec = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Permanent("embedder returned no vectors".into()))?;
        self.search_by_vec(&query_vec, k, min_similarity)
    }

    /// Top-k nearest neighbours with `similarity >= min_similarity`, sorted
    /// by descending similarity, ties broken by ascending claim id.
    pub fn search_by_vec(
        &self,
        vector: &[f32],
        k: usize,
        min_similarity: f64,
    ) -> IndexResult<Vec<EvidenceHit>> {
        validate_search_params(k, min_similarity)?;
        let inner = self.inner.read().expect("index lock");

        let mut hits: Vec<EvidenceHit> = inner
            .graph
            .search(vector, k)
            .into_iter()
            .filter_map(|(internal, dist)| {
                let claim_id = inner.index_to_id.get(internal as usize)?;
                let similarity = 1.0 / (1.0 + dist as f64);
                if similarity < min_similarity {
                    return None;
                }
                let metadata = inner
                    .meta
                    .id_to_metadata
                    .get(claim_id.as_str())
                    .cloned()
                    .unwrap_or_default();
                let text = metadata
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Some(EvidenceHit {
                    claim_id: claim_id.clone(),
                    text,
                    similarity,
                    metadata,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.claim_id.cmp(&b.claim_id))
        });
        Ok(hits)
    }

    /// Return the stored vector for a claim. HNSW-flat keeps vectors in
    /// full, so reconstruction is exact.
    pub fn reconstruct(&self, claim_id: &ClaimId) -> IndexResult<Vec<f32>> {
        let inner = self.inner.read().expect("index lock");
        let internal = *inner
            .meta
            .id_to_index
            .get(claim_id.as_str())
            .ok_or_else(|| IndexError::UnknownClaim(claim_id.to_string()))?;
        inner
            .graph
            .vector(internal)
            .map(|v| v.to_vec())
            .ok_or_else(|| IndexError::UnknownClaim(claim_id.to_string()))
    }

    /// Persist the graph and metadata table atomically.
    ///
    /// Writes `<path>` (graph) and `<path>.meta.json` (side-table), each via
    /// write-temp then rename. Takes the writer lock for a consistent pair.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let inner = self.inner.write().expect("index lock");

        write_atomic(path, &serde_json::to_vec(&inner.graph)?)?;
        write_atomic(&meta_path(path), &serde_json::to_vec(&inner.meta)?)?;
        Ok(())
    }

    /// Load a snapshot written by [`snapshot`](Self::snapshot).
    pub fn restore(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let graph: HnswGraph = serde_json::from_slice(&fs::read(path)?)?;
        let meta: MetaTable = serde_json::from_slice(&fs::read(meta_path(path))?)?;

        // Rebuild the reverse mapping from the side-table
        let mut index_to_id = vec![ClaimId::from(""); graph.len()];
        for (id, &internal) in &meta.id_to_index {
            if let Some(slot) = index_to_id.get_mut(internal as usize) {
                *slot = ClaimId::from_string(id.clone());
            }
        }

        let mut inner = self.inner.write().expect("index lock");
        inner.graph = graph;
        inner.meta = meta;
        inner.index_to_id = index_to_id;
        Ok(())
    }
}

fn meta_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".meta.json");
    std::path::PathBuf::from(name)
}

fn validate_search_params(k: usize, min_similarity: f64) -> IndexResult<()> {
    if k == 0 {
        return Err(IndexError::InvalidParameter("k must be positive".into()));
    }
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(IndexError::InvalidParameter(format!(
            "min_similarity {} outside [0, 1]",
            min_similarity
        )));
    }
    Ok(())
}
