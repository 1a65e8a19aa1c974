//! Core configuration: data locations and tunable thresholds.
//!
//! Everything has a working default; the CLI may override paths and the
//! dedup validation flag comes from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the core pipeline.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root directory for persisted state
    pub data_dir: PathBuf,
    /// Similarity below which a pair is treated as unrelated (no adjudication)
    pub prefilter_low: f64,
    /// Similarity above which a pair is treated as a near-duplicate (no adjudication)
    pub prefilter_high: f64,
    /// Minimum neighbour similarity for spawning an adjudication
    pub neighbour_min_similarity: f64,
    /// Cosine threshold for semantic dedup
    pub dedup_similarity_threshold: f64,
    /// Maximum in-flight adjudications
    pub adjudication_concurrency: usize,
    /// Deadline for every external-model call
    pub external_deadline: Duration,
    /// Log duplicate detections without blocking ingestion
    pub dedup_validation_mode: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            prefilter_low: 0.3,
            prefilter_high: 0.95,
            neighbour_min_similarity: 0.6,
            dedup_similarity_threshold: 0.95,
            adjudication_concurrency: 4,
            external_deadline: Duration::from_secs(60),
            dedup_validation_mode: validation_mode_from_env(),
        }
    }
}

impl CoreConfig {
    /// Config rooted at an explicit data directory.
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn debate_cache_path(&self) -> PathBuf {
        self.data_dir.join("debate_cache.json")
    }

    pub fn dedup_dir(&self) -> PathBuf {
        self.data_dir.join(".dedup_cache")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.bin")
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join("graph_events.jsonl")
    }

    pub fn calibration_model_path(&self) -> PathBuf {
        self.data_dir.join("calibration_model.json")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join("claims.db")
    }
}

/// `~/.local/share/claimforge` (platform equivalent), falling back to `./data`.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("claimforge"))
        .unwrap_or_else(|| Path::new("data").to_path_buf())
}

fn validation_mode_from_env() -> bool {
    std::env::var("DEDUP_VALIDATION_MODE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
