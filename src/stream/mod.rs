//! Stream orchestrator
//!
//! Processes a paper as a lazy finite sequence of claims: extract, index,
//! yield each claim in extraction order, and fan out adjudication work in
//! the background under bounded concurrency. The stream completes after
//! every spawned task has finished and reports a summary with error counts.
//!
//! Ordering contract: claims are yielded in the extractor's emission order;
//! adjudications complete in any order, but every edge write is causally
//! after both endpoints' claim writes.

mod cancel;

pub use cancel::CancellationToken;

use crate::adjudicate::PairEngine;
use crate::claim::{Claim, ClaimId, ClaimType, Paper};
use crate::config::CoreConfig;
use crate::graph::CausalGraph;
use crate::index::{ClaimIndex, IndexError};
use crate::provider::{with_deadline, with_retry, CoreContext, ProviderError};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// How many claims the channel buffers before yielding applies backpressure
/// to the driver.
const STREAM_BUFFER: usize = 32;
/// Neighbours fetched per claim before self-filtering.
const NEIGHBOUR_TOP_K: usize = 5;
/// Neighbours kept per claim after self-filtering.
const NEIGHBOUR_KEEP: usize = 2;

/// Stream-level errors. Per-claim and per-pair failures are recovered and
/// counted in the summary instead.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("paper {0} is unreadable")]
    PaperUnreadable(String),

    #[error("claim extraction failed: {0}")]
    Extraction(#[source] ProviderError),

    #[error("claim embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("stream driver failed: {0}")]
    Driver(String),
}

/// Completion record for one paper stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub paper_id: String,
    pub claims_yielded: usize,
    pub relationships_added: usize,
    pub index_errors: usize,
    pub adjudication_errors: usize,
    pub cancelled: bool,
}

/// A live paper stream: claims arrive in extraction order on the channel;
/// `finish` gates on all background adjudication tasks.
pub struct ClaimStream {
    receiver: mpsc::Receiver<Claim>,
    completion: tokio::task::JoinHandle<StreamSummary>,
    cancel: CancellationToken,
}

impl ClaimStream {
    /// Next claim, or `None` once the extractor's sequence is exhausted.
    pub async fn next_claim(&mut self) -> Option<Claim> {
        self.receiver.recv().await
    }

    /// Cancel outstanding adjudication tasks at their next suspension
    /// point. Claims already yielded and writes already committed stand.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await all background work and return the summary.
    pub async fn finish(self) -> Result<StreamSummary, StreamError> {
        drop(self.receiver);
        self.completion
            .await
            .map_err(|e| StreamError::Driver(e.to_string()))
    }

    /// Drain every claim, then finish. Convenience for consumers that do
    /// not need incremental delivery.
    pub async fn collect(mut self) -> Result<(Vec<Claim>, StreamSummary), StreamError> {
        let mut claims = Vec::new();
        while let Some(claim) = self.next_claim().await {
            claims.push(claim);
        }
        let summary = self.finish().await?;
        Ok((claims, summary))
    }
}

/// The stream orchestrator. Cheap to clone per paper.
pub struct StreamOrchestrator {
    ctx: CoreContext,
    index: ClaimIndex,
    engine: Arc<PairEngine>,
    graph: Arc<CausalGraph>,
    concurrency: usize,
    neighbour_min_similarity: f64,
    deadline: std::time::Duration,
}

impl StreamOrchestrator {
    pub fn new(
        ctx: CoreContext,
        index: ClaimIndex,
        engine: Arc<PairEngine>,
        graph: Arc<CausalGraph>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            ctx,
            index,
            engine,
            graph,
            concurrency: config.adjudication_concurrency,
            neighbour_min_similarity: config.neighbour_min_similarity,
            deadline: config.external_deadline,
        }
    }

    /// Process one paper. Returns a stream that yields claims as they
    /// become indexable; terminal failures (unreadable paper, extractor
    /// failure) surface here instead.
    pub async fn process_paper_stream(
        &self,
        paper_bytes: &[u8],
        paper_id: &str,
    ) -> Result<ClaimStream, StreamError> {
        tracing::info!(paper_id, bytes = paper_bytes.len(), "streaming paper");

        // 1. Paper text
        if paper_bytes.is_empty() {
            return Err(StreamError::PaperUnreadable(paper_id.to_string()));
        }
        let text = String::from_utf8_lossy(paper_bytes).into_owned();

        // 2. Extraction, with derived ids where the extractor left them unset
        let extracted = with_retry(|| {
            with_deadline(self.deadline, self.ctx.extractor.extract(&text, paper_id))
        })
        .await
        .map_err(StreamError::Extraction)?;

        let mut claims = Vec::with_capacity(extracted.len());
        let mut seen_ids: HashSet<ClaimId> = HashSet::new();
        for mut claim in extracted {
            claim.paper_id = paper_id.to_string();
            if claim.id.as_str().is_empty() {
                claim.id = ClaimId::derive(paper_id, &claim.text);
            }
            if !seen_ids.insert(claim.id.clone()) {
                tracing::warn!(claim_id = %claim.id, paper_id, "claim id collision within paper");
            }
            claims.push(claim);
        }
        tracing::info!(paper_id, count = claims.len(), "extracted claims");

        // 3. Embed claims the extractor left bare
        self.fill_embeddings(&mut claims).await?;

        // 4. Persist the paper node, then bulk-index. Claims reference
        //    their paper, so the paper write lands before any claim write.
        //    Duplicates are warnings (idempotent re-ingest); other failures
        //    are counted but never stop the stream
        let mut index_errors = 0usize;
        let paper = Paper {
            paper_id: paper_id.to_string(),
            raw_text: Some(text),
            ..Paper::default()
        };
        if let Err(e) = self.graph.add_paper(&paper) {
            tracing::error!(paper_id, error = %e, "paper write failed");
            index_errors += 1;
        }
        for claim in &claims {
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("text".to_string(), serde_json::json!(claim.text));
            metadata.insert("paper_id".to_string(), serde_json::json!(claim.paper_id));
            metadata.insert("section".to_string(), serde_json::json!(claim.section));
            metadata.insert(
                "claim_type".to_string(),
                serde_json::json!(claim.claim_type.to_string()),
            );

            let index = self.index.clone();
            let id = claim.id.clone();
            let vector = claim.embedding.clone();
            let outcome = tokio::task::spawn_blocking(move || index.index(&id, &vector, metadata))
                .await
                .map_err(|e| StreamError::Driver(e.to_string()))?;

            match outcome {
                Ok(()) => {}
                Err(IndexError::DuplicateId(id)) => {
                    tracing::warn!(claim_id = %id, "already indexed, skipping");
                }
                Err(e) => {
                    tracing::error!(claim_id = %claim.id, error = %e, "indexing failed");
                    index_errors += 1;
                }
            }

            // Edge writes are causally after both endpoints' claim writes,
            // so every claim lands in the graph before adjudication spawns
            if !self.graph.contains(&claim.id) {
                if let Err(e) = self.graph.add_claim(claim) {
                    tracing::error!(claim_id = %claim.id, error = %e, "graph claim write failed");
                    index_errors += 1;
                }
            }
        }

        // 5. Drive: yield in order, fan out adjudications behind a
        //    semaphore, gate completion on the task set
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let cancel = CancellationToken::new();
        let driver = Driver {
            engine: self.engine.clone(),
            graph: self.graph.clone(),
            index: self.index.clone(),
            cancel: cancel.clone(),
            neighbour_min_similarity: self.neighbour_min_similarity,
        };
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let paper = paper_id.to_string();

        let completion = tokio::spawn(async move {
            let mut summary = StreamSummary {
                paper_id: paper,
                claims_yielded: 0,
                relationships_added: 0,
                index_errors,
                adjudication_errors: 0,
                cancelled: false,
            };
            let mut tasks: JoinSet<(usize, usize)> = JoinSet::new();

            for claim in claims {
                if driver.cancel.is_cancelled() {
                    break;
                }

                // Yield first; a gone consumer does not stop adjudication
                if tx.send(claim.clone()).await.is_ok() {
                    summary.claims_yielded += 1;
                }

                // Backpressure: spawning awaits a slot, yielding never does
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let driver = driver.clone();
                tasks.spawn(async move {
                    let outcome = driver.adjudicate_claim(&claim).await;
                    drop(permit);
                    outcome
                });
            }
            drop(tx);

            // Completion gate: every spawned task finishes before the
            // stream resolves
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((added, errors)) => {
                        summary.relationships_added += added;
                        summary.adjudication_errors += errors;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "adjudication task panicked");
                        summary.adjudication_errors += 1;
                    }
                }
            }

            summary.cancelled = driver.cancel.is_cancelled();
            tracing::info!(
                paper_id = %summary.paper_id,
                yielded = summary.claims_yielded,
                relationships = summary.relationships_added,
                "paper stream complete"
            );
            summary
        });

        Ok(ClaimStream {
            receiver: rx,
            completion,
            cancel,
        })
    }

    /// Batch-embed claims without vectors, preserving order.
    async fn fill_embeddings(&self, claims: &mut [Claim]) -> Result<(), StreamError> {
        let bare: Vec<usize> = claims
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_empty())
            .map(|(i, _)| i)
            .collect();
        if bare.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = bare.iter().map(|&i| claims[i].text.clone()).collect();
        let vectors = with_retry(|| {
            with_deadline(self.deadline, self.ctx.embedder.embed(&texts))
        })
        .await
        .map_err(StreamError::Embedding)?;

        for (&i, vector) in bare.iter().zip(vectors) {
            claims[i].embedding = vector;
        }
        Ok(())
    }
}

/// Per-stream state shared by the driver task and its adjudication tasks.
#[derive(Clone)]
struct Driver {
    engine: Arc<PairEngine>,
    graph: Arc<CausalGraph>,
    index: ClaimIndex,
    cancel: CancellationToken,
    neighbour_min_similarity: f64,
}

impl Driver {
    /// Adjudicate one claim against its nearest neighbours. Returns
    /// `(relationships_added, errors)`; every failure is recovered here.
    async fn adjudicate_claim(&self, claim: &Claim) -> (usize, usize) {
        let mut added = 0usize;
        let mut errors = 0usize;

        let index = self.index.clone();
        let vector = claim.embedding.clone();
        let min_similarity = self.neighbour_min_similarity;
        let neighbours = match tokio::task::spawn_blocking(move || {
            index.search_by_vec(&vector, NEIGHBOUR_TOP_K, min_similarity)
        })
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                tracing::error!(claim_id = %claim.id, error = %e, "neighbour search failed");
                return (0, 1);
            }
            Err(e) => {
                tracing::error!(claim_id = %claim.id, error = %e, "neighbour search panicked");
                return (0, 1);
            }
        };

        let candidates: Vec<_> = neighbours
            .into_iter()
            .filter(|hit| hit.claim_id != claim.id)
            .take(NEIGHBOUR_KEEP)
            .collect();

        for hit in candidates {
            if self.cancel.is_cancelled() {
                break;
            }

            let neighbour = match self.claim_from_hit(&hit) {
                Some(neighbour) => neighbour,
                None => continue,
            };

            if !self.engine.should_debate(claim, &neighbour) {
                continue;
            }
            // One edge per canonical pair; a prior run already settled it
            if self.graph.has_relationship(&claim.id, &neighbour.id) {
                tracing::debug!(a = %claim.id, b = %neighbour.id, "relationship exists, skipping");
                continue;
            }

            match self.engine.debate_pair(claim, &neighbour).await {
                Ok(result) => {
                    match self
                        .graph
                        .add_relationship(&claim.id, &neighbour.id, &result)
                    {
                        Ok(Some(_)) => added += 1,
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(
                                a = %claim.id,
                                b = %neighbour.id,
                                error = %e,
                                "failed to write relationship"
                            );
                            errors += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(a = %claim.id, b = %hit.claim_id, error = %e, "adjudication failed");
                    errors += 1;
                }
            }
        }

        (added, errors)
    }

    /// Rebuild a claim view from an index hit for pairwise adjudication.
    fn claim_from_hit(&self, hit: &crate::claim::EvidenceHit) -> Option<Claim> {
        let embedding = match self.index.reconstruct(&hit.claim_id) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(claim_id = %hit.claim_id, error = %e, "cannot reconstruct neighbour");
                return None;
            }
        };
        let paper_id = hit
            .metadata
            .get("paper_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let section = hit
            .metadata
            .get("section")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let claim_type = hit
            .metadata
            .get("claim_type")
            .and_then(|v| v.as_str())
            .and_then(|s| ClaimType::from_str(s).ok())
            .unwrap_or(ClaimType::Finding);

        Some(Claim {
            id: hit.claim_id.clone(),
            paper_id,
            section,
            claim_type,
            text: hit.text.clone(),
            confidence: 0.0,
            evidence_snippets: Vec::new(),
            embedding,
        })
    }
}
