//! Shared test toolkit: deterministic mock providers and pipeline wiring.
//!
//! The embedder maps known texts to preset vectors (falling back to a
//! stable pseudo-vector), the adjudicator replays a scripted reply, and
//! the extractor returns a fixed claim list. No model downloads, no
//! network.

#![allow(dead_code)]

use async_trait::async_trait;
use claimforge::adjudicate::{DebateCache, PairEngine};
use claimforge::graph::CausalGraph;
use claimforge::provider::{
    Adjudicator, AdjudicatorReply, CoreContext, Embedder, EvidenceItem, Extractor,
    ProviderResult,
};
use claimforge::storage::MemoryStore;
use claimforge::stream::StreamOrchestrator;
use claimforge::{CalibrationLayer, Claim, ClaimId, ClaimIndex, ClaimType, CoreConfig, Verdict};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Embedder with a preset text → vector table. Unknown texts map onto a
/// stable axis derived from the text bytes, so behaviour is deterministic
/// without being meaningful.
pub struct TableEmbedder {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    fn fallback(&self, text: &str) -> Vec<f32> {
        let axis = text.bytes().map(|b| b as usize).sum::<usize>() % self.dim;
        let mut v = vec![0.0; self.dim];
        v[axis] = 1.0;
        v
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback(t)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Adjudicator that replays one scripted reply and counts invocations.
pub struct ScriptedAdjudicator {
    reply: AdjudicatorReply,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl ScriptedAdjudicator {
    pub fn new(verdict: Verdict, confidence: f64, transcript: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: AdjudicatorReply {
                verdict,
                confidence,
                transcript,
            },
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Variant that sleeps before answering, for cancellation tests.
    pub fn slow(
        verdict: Verdict,
        confidence: f64,
        delay: std::time::Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            reply: AdjudicatorReply {
                verdict,
                confidence,
                transcript: Vec::new(),
            },
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adjudicator for ScriptedAdjudicator {
    async fn debate(
        &self,
        _claim_a: &str,
        _claim_b: &str,
        _evidence: &[EvidenceItem],
    ) -> ProviderResult<AdjudicatorReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}

/// Extractor returning a fixed claim list.
pub struct FixedExtractor {
    claims: Vec<Claim>,
}

impl FixedExtractor {
    pub fn new(claims: Vec<Claim>) -> Arc<Self> {
        Arc::new(Self { claims })
    }
}

#[async_trait]
impl Extractor for FixedExtractor {
    async fn extract(&self, _text: &str, _paper_id: &str) -> ProviderResult<Vec<Claim>> {
        Ok(self.claims.clone())
    }
}

/// A claim with an explicit id and embedding.
pub fn claim(id: &str, text: &str, embedding: Vec<f32>) -> Claim {
    let mut c = Claim::new("unset", "Main", ClaimType::Finding, text)
        .with_confidence(0.7)
        .with_embedding(embedding);
    c.id = ClaimId::from(id);
    c
}

/// A fully wired pipeline over an in-memory store, rooted at `dir`.
pub struct TestPipeline {
    pub orchestrator: StreamOrchestrator,
    pub graph: Arc<CausalGraph>,
    pub index: ClaimIndex,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<PairEngine>,
}

pub fn build_pipeline(
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    adjudicator: Arc<dyn Adjudicator>,
    extractor: Arc<dyn Extractor>,
) -> TestPipeline {
    let config = CoreConfig::with_data_dir(dir);
    build_pipeline_on(
        dir,
        embedder,
        adjudicator,
        extractor,
        Arc::new(MemoryStore::new()),
        &config,
    )
}

pub fn build_pipeline_on(
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    adjudicator: Arc<dyn Adjudicator>,
    extractor: Arc<dyn Extractor>,
    store: Arc<MemoryStore>,
    config: &CoreConfig,
) -> TestPipeline {
    let ctx = CoreContext::new(embedder.clone(), adjudicator.clone(), extractor);
    let index = ClaimIndex::new(embedder);
    let cache = Arc::new(DebateCache::open(dir.join("debate_cache.json")).unwrap());
    let engine = Arc::new(PairEngine::new(
        index.clone(),
        adjudicator,
        cache,
        Arc::new(CalibrationLayer::untrained()),
    ));
    let graph = Arc::new(CausalGraph::new(store.clone()));
    let orchestrator =
        StreamOrchestrator::new(ctx, index.clone(), engine.clone(), graph.clone(), config);

    TestPipeline {
        orchestrator,
        graph,
        index,
        store,
        engine,
    }
}
