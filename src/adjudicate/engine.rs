//! The pair engine: pre-filter, evidence retrieval, adjudication, flagging
//!
//! State machine per unordered pair:
//! cache hit → done; similarity pre-filter low/high → synthetic result;
//! otherwise retrieve evidence, invoke the adjudicator under a deadline,
//! extract citations, calibrate, apply the review-flag policy, and write
//! the result through the cache.

use super::cache::{canonical_key, DebateCache};
use super::{DebateResult, Verdict};
use crate::calibration::{CalibrationLayer, ConfidenceBand};
use crate::claim::Claim;
use crate::index::ClaimIndex;
use crate::persist::SaveError;
use crate::provider::{
    with_deadline, with_retry, Adjudicator, EvidenceItem, ProviderError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Number of evidence hits retrieved per claim.
const EVIDENCE_TOP_K: usize = 3;
/// Minimum similarity for an evidence hit.
const EVIDENCE_MIN_SIMILARITY: f64 = 0.7;
/// Calibrated confidence below which a result always needs review.
const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.85;
/// Minimum citations for an unreviewed result.
const REVIEW_MIN_CITATIONS: usize = 2;
/// Minimum evidence-pool size for an unreviewed result.
const REVIEW_MIN_POOL: usize = 3;
/// Minimum mean evidence similarity for an unreviewed result.
const REVIEW_MIN_POOL_QUALITY: f64 = 0.7;

/// Errors from pair adjudication
#[derive(Debug, Error)]
pub enum AdjudicationError {
    #[error("adjudicator error: {0}")]
    Provider(#[from] ProviderError),

    #[error("cache error: {0}")]
    Cache(#[from] SaveError),
}

/// Result type for adjudication operations
pub type AdjudicationResult<T> = Result<T, AdjudicationError>;

/// The pair adjudication engine.
pub struct PairEngine {
    index: ClaimIndex,
    adjudicator: Arc<dyn Adjudicator>,
    cache: Arc<DebateCache>,
    calibration: Arc<CalibrationLayer>,
    prefilter_low: f64,
    prefilter_high: f64,
    deadline: Duration,
}

impl PairEngine {
    pub fn new(
        index: ClaimIndex,
        adjudicator: Arc<dyn Adjudicator>,
        cache: Arc<DebateCache>,
        calibration: Arc<CalibrationLayer>,
    ) -> Self {
        Self {
            index,
            adjudicator,
            cache,
            calibration,
            prefilter_low: 0.3,
            prefilter_high: 0.95,
            deadline: Duration::from_secs(60),
        }
    }

    /// Override the pre-filter band (low, high).
    pub fn with_prefilter(mut self, low: f64, high: f64) -> Self {
        self.prefilter_low = low;
        self.prefilter_high = high;
        self
    }

    /// Override the external-call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn cache(&self) -> &DebateCache {
        &self.cache
    }

    /// Should this pair be adjudicated at all?
    ///
    /// True when `b` appears in the top-10 neighbours of `a` with
    /// similarity above 0.6. Conservatively true when embeddings are
    /// absent or the neighbour lookup fails.
    pub fn should_debate(&self, a: &Claim, b: &Claim) -> bool {
        if a.embedding.is_empty() {
            return true;
        }
        let hits = match self.index.search_by_vec(&a.embedding, 10, 0.0) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "neighbour lookup failed, debating conservatively");
                return true;
            }
        };
        hits.iter()
            .find(|h| h.claim_id == b.id)
            .map(|h| h.similarity > 0.6)
            .unwrap_or(false)
    }

    /// Adjudicate a claim pair, returning the cached result when the
    /// canonical key is already present.
    pub async fn debate_pair(&self, a: &Claim, b: &Claim) -> AdjudicationResult<DebateResult> {
        // Step 0: canonical cache lookup
        let key = canonical_key(&a.id, &b.id);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(%key, "debate cache hit");
            return Ok(cached);
        }

        // Step 1: two-tier similarity pre-filter
        if !a.embedding.is_empty() && !b.embedding.is_empty() {
            let sim = cosine_similarity(&a.embedding, &b.embedding);

            if sim < self.prefilter_low {
                let result = DebateResult {
                    verdict: Verdict::Uncertain,
                    raw_confidence: 0.0,
                    calibrated_confidence: 0.0,
                    band: ConfidenceBand::Unrelated,
                    citations: BTreeSet::new(),
                    requires_human: false,
                    transcript: vec!["skipped: low similarity".to_string()],
                    agent_confidences: BTreeMap::new(),
                };
                self.cache.insert(key, result.clone())?;
                return Ok(result);
            }

            if sim > self.prefilter_high {
                let result = DebateResult {
                    verdict: Verdict::Supports,
                    raw_confidence: 1.0,
                    calibrated_confidence: 0.99,
                    band: ConfidenceBand::High,
                    citations: BTreeSet::new(),
                    requires_human: false,
                    transcript: vec!["skipped: high similarity".to_string()],
                    agent_confidences: BTreeMap::new(),
                };
                self.cache.insert(key, result.clone())?;
                return Ok(result);
            }
        }

        // Step 2: retrieve evidence for both claims; failures degrade to
        // an empty pool and the flag policy picks that up
        let pool = self.evidence_pool(a, b).await;

        // Step 3: external adjudication under deadline, one retry on
        // transient failure. Errors surface without a cache write.
        let items: Vec<EvidenceItem> = pool
            .iter()
            .map(|(id, text, _)| EvidenceItem {
                claim_id: id.clone(),
                text: text.clone(),
            })
            .collect();
        let reply = with_retry(|| {
            with_deadline(
                self.deadline,
                self.adjudicator.debate(&a.text, &b.text, &items),
            )
        })
        .await?;

        // Step 4: citations = evidence ids appearing in the transcript
        let citations = extract_citations(&reply.transcript, &pool);

        // Step 5: calibrate and apply the conservative flag policy
        let (calibrated, band) = self.calibration.calibrate(reply.confidence);
        let requires_human = requires_human_review(calibrated, citations.len(), &pool);

        let raw = reply.confidence;
        let mut agent_confidences = BTreeMap::new();
        agent_confidences.insert("skeptic".to_string(), raw * 0.9);
        agent_confidences.insert("connector".to_string(), raw);
        agent_confidences.insert("synthesizer".to_string(), (raw * 1.1).min(1.0));

        let result = DebateResult {
            verdict: reply.verdict,
            raw_confidence: raw,
            calibrated_confidence: calibrated,
            band,
            citations: citations
                .into_iter()
                .map(crate::claim::ClaimId::from_string)
                .collect(),
            requires_human,
            transcript: reply.transcript,
            agent_confidences,
        };

        // Step 6: write-through
        self.cache.insert(key, result.clone())?;
        Ok(result)
    }

    /// Top-3 evidence hits per claim at 0.7 similarity, unioned with
    /// stable order (a's hits, then b's, first occurrence wins).
    async fn evidence_pool(&self, a: &Claim, b: &Claim) -> Vec<(String, String, f64)> {
        let mut pool: Vec<(String, String, f64)> = Vec::new();
        for claim in [a, b] {
            let hits = match self
                .index
                .search_by_text(&claim.text, EVIDENCE_TOP_K, EVIDENCE_MIN_SIMILARITY)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(claim = %claim.id, error = %e, "evidence retrieval failed");
                    Vec::new()
                }
            };
            for hit in hits {
                if pool.iter().any(|(id, _, _)| *id == hit.claim_id.as_str()) {
                    continue;
                }
                pool.push((hit.claim_id.to_string(), hit.text, hit.similarity));
            }
        }
        pool
    }
}

/// Conservative review policy: flag unless confidence, citations, pool
/// size, and pool quality all clear their thresholds.
fn requires_human_review(
    calibrated: f64,
    num_citations: usize,
    pool: &[(String, String, f64)],
) -> bool {
    if calibrated < REVIEW_CONFIDENCE_THRESHOLD {
        return true;
    }
    if num_citations < REVIEW_MIN_CITATIONS {
        return true;
    }
    if pool.len() < REVIEW_MIN_POOL {
        return true;
    }
    let mean_quality: f64 =
        pool.iter().map(|(_, _, sim)| sim).sum::<f64>() / pool.len().max(1) as f64;
    mean_quality < REVIEW_MIN_POOL_QUALITY
}

/// Evidence ids cited in the transcript: case-sensitive, whole-id matches
/// on word boundaries so `p1_42` never matches inside `p1_423`.
fn extract_citations(transcript: &[String], pool: &[(String, String, f64)]) -> BTreeSet<String> {
    let mut citations = BTreeSet::new();
    for line in transcript {
        for (id, _, _) in pool {
            if contains_word(line, id) {
                citations.insert(id.clone());
            }
        }
    }
    citations
}

/// Substring match bounded by non-word characters on both sides.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before_ok = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .map(is_word_char)
                .unwrap_or(false);
        let after_ok = end == haystack.len()
            || !haystack[end..].chars().next().map(is_word_char).unwrap_or(false);
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
