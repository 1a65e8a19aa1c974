//! External model providers
//!
//! The core depends only on three narrow trait contracts: an embedding
//! provider, an adjudicator, and a claim extractor. Concrete providers are
//! wired once at startup through [`CoreContext`] and never reseated.
//!
//! Two implementations of `Embedder` ship here:
//! - `FastEmbedder`: fastembed (ONNX Runtime), behind the `embeddings` feature
//! - test mocks with deterministic vectors (see `tests/common/`)

mod extract;

pub use extract::SentenceExtractor;

use crate::adjudicate::Verdict;
use crate::claim::Claim;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from external providers.
///
/// Transient errors are retried once with jitter; permanent errors surface
/// to the caller unchanged.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("provider call exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Embedding provider: text in, unit-norm vectors out.
///
/// The same model must embed claims and queries; mixing models makes
/// similarity meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per text.
    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>>;

    /// Output dimension of this model.
    fn dimension(&self) -> usize;
}

/// What the adjudicator returns for a claim pair.
#[derive(Debug, Clone)]
pub struct AdjudicatorReply {
    pub verdict: Verdict,
    /// Raw confidence in [0, 1], uncalibrated
    pub confidence: f64,
    /// Ordered transcript lines; citation extraction scans these
    pub transcript: Vec<String>,
}

/// A piece of retrieved evidence handed to the adjudicator.
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub claim_id: String,
    pub text: String,
}

/// Adjudicator: judges the relationship between two claim texts against an
/// evidence pool. Idempotent per input; no side effects.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    async fn debate(
        &self,
        claim_a: &str,
        claim_b: &str,
        evidence_pool: &[EvidenceItem],
    ) -> ProviderResult<AdjudicatorReply>;
}

/// Claim extractor: paper text in, claims out.
///
/// May return an empty list; must not fail on well-formed text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, text: &str, paper_id: &str) -> ProviderResult<Vec<Claim>>;
}

/// Process-wide provider handles, created once at startup.
#[derive(Clone)]
pub struct CoreContext {
    pub embedder: Arc<dyn Embedder>,
    pub adjudicator: Arc<dyn Adjudicator>,
    pub extractor: Arc<dyn Extractor>,
}

impl CoreContext {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        adjudicator: Arc<dyn Adjudicator>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            embedder,
            adjudicator,
            extractor,
        }
    }
}

impl std::fmt::Debug for CoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreContext")
            .field("embedder_dim", &self.embedder.dimension())
            .finish()
    }
}

/// Retry a provider call once on transient failure, with jitter.
pub async fn with_retry<T, F, Fut>(op: F) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    match op().await {
        Err(ProviderError::Transient(reason)) => {
            let jitter_ms = rand::thread_rng().gen_range(50..250);
            tracing::warn!(%reason, jitter_ms, "transient provider error, retrying");
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            op().await
        }
        other => other,
    }
}

/// Bound a provider call by a deadline.
pub async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> ProviderResult<T>
where
    Fut: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::DeadlineExceeded(deadline)),
    }
}

// ---------------------------------------------------------------------------
// FastEmbedder — production embedder behind `embeddings` feature
// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, ProviderError, ProviderResult};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::{Arc, Mutex};

    /// Production embedder backed by fastembed (ONNX Runtime).
    ///
    /// The model is wrapped in `Arc<Mutex<_>>` because `embed` requires
    /// `&mut self`, and inference is dispatched to a blocking worker so it
    /// never stalls the stream loop.
    pub struct FastEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
        dimension: usize,
    }

    impl FastEmbedder {
        /// Create a FastEmbedder with a specific model.
        pub fn new(model: EmbeddingModel, dimension: usize) -> ProviderResult<Self> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| ProviderError::Permanent(e.to_string()))?;
            Ok(Self {
                model: Arc::new(Mutex::new(embedding)),
                dimension,
            })
        }

        /// Default model (nomic-embed-text-v1.5, 768 dimensions).
        pub fn default_model() -> ProviderResult<Self> {
            Self::new(EmbeddingModel::NomicEmbedTextV15, 768)
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let model = self.model.clone();
            let batch: Vec<String> = texts.to_vec();
            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| ProviderError::Permanent("embedder lock poisoned".into()))?;
                model
                    .embed(batch, None)
                    .map_err(|e| ProviderError::Transient(e.to_string()))
            })
            .await
            .map_err(|e| ProviderError::Permanent(format!("embed task failed: {}", e)))?
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedder;
