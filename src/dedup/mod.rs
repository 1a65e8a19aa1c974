//! Paper deduplication
//!
//! Decides whether a candidate paper is new, an exact duplicate (file hash),
//! a DOI duplicate, a newer arXiv version of an existing paper, or a
//! semantic near-duplicate by embedding similarity. Decision order is fixed;
//! the first match wins.
//!
//! The registry persists three JSON side-tables plus a parallel-array
//! embedding table under its directory, each written atomically. A
//! validation mode (env `DEDUP_VALIDATION_MODE=true`) logs what would have
//! been detected but lets everything through as NEW without touching the
//! registry.

mod arxiv;

pub use arxiv::{extract_arxiv_id, parse_version};

use crate::persist::{load_json_or_default, save_json, SaveError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Default cosine threshold for semantic near-duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Errors from deduplication operations
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persist(#[from] SaveError),
}

/// Result type for dedup operations
pub type DedupResult<T> = Result<T, DedupError>;

/// Outcome classification of a duplicate check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStatus {
    New,
    ExactDuplicate,
    SemanticDuplicate,
    DoiDuplicate,
    VersionUpdate,
}

/// Version details attached to a `VersionUpdate` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub arxiv_id: String,
    pub old_version: u32,
    pub new_version: u32,
    pub old_paper_id: String,
}

/// Result of a duplicate check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub status: DuplicateStatus,
    pub existing_id: Option<String>,
    pub similarity: Option<f64>,
    pub message: String,
    /// True when the candidate is a newer version that should replace
    /// the registered paper
    pub should_replace: bool,
    pub version_info: Option<VersionInfo>,
}

impl DuplicateCheck {
    fn new_paper() -> Self {
        Self {
            status: DuplicateStatus::New,
            existing_id: None,
            similarity: None,
            message: "New paper, no duplicates found".to_string(),
            should_replace: false,
            version_info: None,
        }
    }
}

/// Metadata consulted during a duplicate check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub pdf_url: Option<String>,
    pub source_url: Option<String>,
}

/// arXiv registration record; keeps the highest version seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArxivRecord {
    paper_id: String,
    version: u32,
    registered_at: DateTime<Utc>,
}

/// Parallel-array embedding table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EmbeddingTable {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    file_hashes: HashMap<String, String>,
    doi_mapping: HashMap<String, String>,
    arxiv_mapping: HashMap<String, ArxivRecord>,
    embeddings: EmbeddingTable,
}

/// Registry counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub file_hashes: usize,
    pub dois: usize,
    pub arxiv_ids: usize,
    pub embeddings: usize,
}

/// The deduplication registry.
pub struct DedupRegistry {
    dir: PathBuf,
    state: RwLock<RegistryState>,
    similarity_threshold: f64,
    validation_mode: bool,
}

impl DedupRegistry {
    /// Open (or create) a registry rooted at `dir`, loading any persisted
    /// side-tables. Validation mode is read from `DEDUP_VALIDATION_MODE`.
    pub fn open(dir: impl Into<PathBuf>) -> DedupResult<Self> {
        let validation_mode = std::env::var("DEDUP_VALIDATION_MODE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self::open_with_options(dir, DEFAULT_SIMILARITY_THRESHOLD, validation_mode)
    }

    pub fn open_with_options(
        dir: impl Into<PathBuf>,
        similarity_threshold: f64,
        validation_mode: bool,
    ) -> DedupResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let state = RegistryState {
            file_hashes: load_json_or_default(&dir.join("file_hashes.json"))?,
            doi_mapping: load_json_or_default(&dir.join("doi_mapping.json"))?,
            arxiv_mapping: load_json_or_default(&dir.join("arxiv_mapping.json"))?,
            embeddings: load_json_or_default(&dir.join("embeddings.json"))?,
        };

        if validation_mode {
            tracing::info!("deduplication running in validation mode (log only)");
        }

        Ok(Self {
            dir,
            state: RwLock::new(state),
            similarity_threshold,
            validation_mode,
        })
    }

    /// SHA-256 of file contents, streamed in 64 KiB chunks.
    pub fn compute_file_hash(path: impl AsRef<Path>) -> DedupResult<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Check whether a candidate paper duplicates anything registered.
    ///
    /// Decision order: file hash, DOI, arXiv version, embedding similarity.
    pub fn check(
        &self,
        file_path: impl AsRef<Path>,
        metadata: &PaperMetadata,
        embedding: Option<&[f32]>,
    ) -> DedupResult<DuplicateCheck> {
        let file_hash = Self::compute_file_hash(file_path)?;
        let state = self.state.read().expect("dedup lock");

        // 1. Exact file duplicate
        if let Some(existing) = state.file_hashes.get(&file_hash) {
            tracing::info!(%existing, "exact duplicate found");
            return Ok(self.apply_validation_mode(DuplicateCheck {
                status: DuplicateStatus::ExactDuplicate,
                existing_id: Some(existing.clone()),
                similarity: None,
                message: format!("Exact duplicate of {}", existing),
                should_replace: false,
                version_info: None,
            }));
        }

        // 2. DOI duplicate
        if let Some(ref doi) = metadata.doi {
            if let Some(existing) = state.doi_mapping.get(doi) {
                tracing::info!(%doi, %existing, "DOI duplicate found");
                return Ok(self.apply_validation_mode(DuplicateCheck {
                    status: DuplicateStatus::DoiDuplicate,
                    existing_id: Some(existing.clone()),
                    similarity: None,
                    message: format!("DOI {} already exists as {}", doi, existing),
                    should_replace: false,
                    version_info: None,
                }));
            }
        }

        // 3. arXiv version check
        if let Some(arxiv_id) = extract_arxiv_id(metadata) {
            let (base_id, new_version) = parse_version(&arxiv_id);
            if let Some(record) = state.arxiv_mapping.get(&base_id) {
                if new_version > record.version {
                    tracing::info!(
                        %base_id,
                        old = record.version,
                        new = new_version,
                        "arXiv version update"
                    );
                    return Ok(self.apply_validation_mode(DuplicateCheck {
                        status: DuplicateStatus::VersionUpdate,
                        existing_id: Some(record.paper_id.clone()),
                        similarity: None,
                        message: format!(
                            "Newer arXiv version: v{} -> v{}",
                            record.version, new_version
                        ),
                        should_replace: true,
                        version_info: Some(VersionInfo {
                            arxiv_id: base_id,
                            old_version: record.version,
                            new_version,
                            old_paper_id: record.paper_id.clone(),
                        }),
                    }));
                }
                tracing::info!(%arxiv_id, "arXiv id at same or older version");
                return Ok(self.apply_validation_mode(DuplicateCheck {
                    status: DuplicateStatus::ExactDuplicate,
                    existing_id: Some(record.paper_id.clone()),
                    similarity: None,
                    message: format!("arXiv {} v{} already exists", base_id, record.version),
                    should_replace: false,
                    version_info: None,
                }));
            }
        }

        // 4. Semantic near-duplicate
        if let Some(query) = embedding {
            let mut best: Option<(usize, f64)> = None;
            for (i, stored) in state.embeddings.vectors.iter().enumerate() {
                let sim = cosine_similarity(query, stored);
                if best.map(|(_, b)| sim > b).unwrap_or(true) {
                    best = Some((i, sim));
                }
            }
            if let Some((idx, similarity)) = best {
                if similarity >= self.similarity_threshold {
                    let existing = state.embeddings.ids[idx].clone();
                    tracing::info!(%existing, similarity, "semantic duplicate found");
                    return Ok(self.apply_validation_mode(DuplicateCheck {
                        status: DuplicateStatus::SemanticDuplicate,
                        existing_id: Some(existing.clone()),
                        similarity: Some(similarity),
                        message: format!("Similar to {} (sim: {:.3})", existing, similarity),
                        should_replace: false,
                        version_info: None,
                    }));
                }
            }
        }

        Ok(DuplicateCheck::new_paper())
    }

    /// Register a paper after successful ingestion: writes all applicable
    /// rows and persists every touched table atomically.
    pub fn register(
        &self,
        paper_id: &str,
        file_path: impl AsRef<Path>,
        metadata: &PaperMetadata,
        embedding: Option<Vec<f32>>,
    ) -> DedupResult<()> {
        let file_hash = Self::compute_file_hash(file_path)?;
        let mut state = self.state.write().expect("dedup lock");

        state.file_hashes.insert(file_hash, paper_id.to_string());
        save_json(&self.dir.join("file_hashes.json"), &state.file_hashes)?;

        if let Some(ref doi) = metadata.doi {
            state.doi_mapping.insert(doi.clone(), paper_id.to_string());
            save_json(&self.dir.join("doi_mapping.json"), &state.doi_mapping)?;
        }

        if let Some(arxiv_id) = extract_arxiv_id(metadata) {
            let (base_id, version) = parse_version(&arxiv_id);
            // Keep the highest version seen for this base id
            let version = state
                .arxiv_mapping
                .get(&base_id)
                .map(|r| r.version.max(version))
                .unwrap_or(version);
            state.arxiv_mapping.insert(
                base_id.clone(),
                ArxivRecord {
                    paper_id: paper_id.to_string(),
                    version,
                    registered_at: Utc::now(),
                },
            );
            save_json(&self.dir.join("arxiv_mapping.json"), &state.arxiv_mapping)?;
            tracing::info!(%base_id, version, "registered arXiv id");
        }

        if let Some(vector) = embedding {
            state.embeddings.ids.push(paper_id.to_string());
            state.embeddings.vectors.push(vector);
            save_json(&self.dir.join("embeddings.json"), &state.embeddings)?;
        }

        tracing::info!(paper_id, "registered paper");
        Ok(())
    }

    /// Remove a paper's rows from every table.
    pub fn remove(&self, paper_id: &str) -> DedupResult<()> {
        let mut state = self.state.write().expect("dedup lock");

        state.file_hashes.retain(|_, pid| pid != paper_id);
        save_json(&self.dir.join("file_hashes.json"), &state.file_hashes)?;

        state.doi_mapping.retain(|_, pid| pid != paper_id);
        save_json(&self.dir.join("doi_mapping.json"), &state.doi_mapping)?;

        state.arxiv_mapping.retain(|_, r| r.paper_id != paper_id);
        save_json(&self.dir.join("arxiv_mapping.json"), &state.arxiv_mapping)?;

        if let Some(idx) = state.embeddings.ids.iter().position(|id| id == paper_id) {
            state.embeddings.ids.remove(idx);
            state.embeddings.vectors.remove(idx);
            save_json(&self.dir.join("embeddings.json"), &state.embeddings)?;
        }

        tracing::info!(paper_id, "removed paper from dedup registry");
        Ok(())
    }

    pub fn stats(&self) -> DedupStats {
        let state = self.state.read().expect("dedup lock");
        DedupStats {
            file_hashes: state.file_hashes.len(),
            dois: state.doi_mapping.len(),
            arxiv_ids: state.arxiv_mapping.len(),
            embeddings: state.embeddings.ids.len(),
        }
    }

    /// In validation mode, log the detection and let the paper through.
    fn apply_validation_mode(&self, result: DuplicateCheck) -> DuplicateCheck {
        if !self.validation_mode || result.status == DuplicateStatus::New {
            return result;
        }
        tracing::info!(
            status = ?result.status,
            message = %result.message,
            "validation mode: would detect duplicate"
        );
        DuplicateCheck {
            status: DuplicateStatus::New,
            existing_id: None,
            similarity: None,
            message: format!("[VALIDATION MODE] {}", result.message),
            should_replace: false,
            version_info: result.version_info,
        }
    }
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
