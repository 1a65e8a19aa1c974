//! Claimforge: Streaming Claim Pipeline and Causal Claim Graph
//!
//! Ingests scientific papers, extracts atomic claims, indexes them in a
//! dense vector store, and maintains a causal claim graph whose edges
//! (`supports`, `refutes`, `extends`, `uncertain`) are established by a
//! multi-step adjudication procedure.
//!
//! # Core Concepts
//!
//! - **Claims**: immutable atomic assertions with dense embeddings
//! - **Adjudication**: a cached, pre-filtered, evidence-grounded judgement
//!   of how two claims relate
//! - **Causal graph**: a persisted claim graph with an in-memory topology
//!   mirror answering contradiction, frontier, and importance queries
//!
//! # Example
//!
//! ```
//! use claimforge::storage::MemoryStore;
//! use claimforge::graph::CausalGraph;
//! use std::sync::Arc;
//!
//! let graph = CausalGraph::new(Arc::new(MemoryStore::new()));
//! assert_eq!(graph.node_count(), 0);
//! ```

pub mod adjudicate;
pub mod calibration;
pub mod claim;
pub mod config;
pub mod dedup;
pub mod graph;
pub mod index;
mod persist;
pub mod provider;
pub mod storage;
pub mod stream;

pub use adjudicate::{
    canonical_key, AdjudicationError, DebateCache, DebateResult, PairEngine, Verdict,
};
pub use calibration::{CalibrationLayer, ConfidenceBand};
pub use claim::{Claim, ClaimId, ClaimType, EvidenceHit, Paper};
pub use config::CoreConfig;
pub use dedup::{DedupRegistry, DuplicateCheck, DuplicateStatus, PaperMetadata};
pub use graph::{CausalGraph, FrontierEdge, GapType, TopologyView};
pub use index::{ClaimIndex, HnswParams, IndexError};
pub use persist::SaveError;
pub use provider::{
    Adjudicator, CoreContext, Embedder, Extractor, ProviderError, SentenceExtractor,
};
pub use storage::{EventLog, GraphStore, MemoryStore, SqliteStore, StorageError};
pub use stream::{CancellationToken, ClaimStream, StreamOrchestrator, StreamSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
