//! Content-addressed debate cache
//!
//! Symmetric: both orderings of a pair map to one canonical key, so the
//! adjudicator sees a pair at most once. The cache file is a JSON map from
//! canonical key to serialised result, snapshotted by atomic rename after
//! each write. A short critical section guards read-modify-write.

use super::DebateResult;
use crate::claim::ClaimId;
use crate::persist::{load_json_or_default, save_json, SaveError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Canonical key for an unordered claim pair: sorted ids joined by `_`.
pub fn canonical_key(a: &ClaimId, b: &ClaimId) -> String {
    let mut pair = [a.as_str(), b.as_str()];
    pair.sort();
    pair.join("_")
}

/// The persistent debate cache.
pub struct DebateCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, DebateResult>>,
}

impl DebateCache {
    /// Open a cache at `path`, loading existing entries. A missing file is
    /// an empty cache; a malformed file surfaces as a data-integrity error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SaveError> {
        let path = path.into();
        let entries = load_json_or_default(&path)?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().expect("cache lock").contains_key(key)
    }

    /// Look up a cached result.
    pub fn get(&self, key: &str) -> Option<DebateResult> {
        self.entries.lock().expect("cache lock").get(key).cloned()
    }

    /// Insert a result and persist the whole cache atomically.
    ///
    /// A failed persist leaves the previous on-disk snapshot intact; the
    /// in-memory entry is rolled back so disk and memory stay consistent.
    pub fn insert(&self, key: String, result: DebateResult) -> Result<(), SaveError> {
        let mut entries = self.entries.lock().expect("cache lock");
        let previous = entries.insert(key.clone(), result);
        match save_json(&self.path, &*entries) {
            Ok(()) => Ok(()),
            Err(e) => {
                match previous {
                    Some(old) => entries.insert(key, old),
                    None => entries.remove(&key),
                };
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudicate::Verdict;
    use crate::calibration::ConfidenceBand;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_result() -> DebateResult {
        DebateResult {
            verdict: Verdict::Supports,
            raw_confidence: 1.0,
            calibrated_confidence: 0.99,
            band: ConfidenceBand::High,
            citations: BTreeSet::new(),
            requires_human: false,
            transcript: vec!["skipped: high similarity".into()],
            agent_confidences: BTreeMap::new(),
        }
    }

    #[test]
    fn canonical_key_is_symmetric() {
        let a = ClaimId::from("p1_10");
        let b = ClaimId::from("p2_5");
        assert_eq!(canonical_key(&a, &b), canonical_key(&b, &a));
        assert_eq!(canonical_key(&a, &b), "p1_10_p2_5");
    }

    #[test]
    fn insert_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DebateCache::open(dir.path().join("debate_cache.json")).unwrap();

        let key = canonical_key(&ClaimId::from("a"), &ClaimId::from("b"));
        assert!(cache.get(&key).is_none());

        cache.insert(key.clone(), sample_result()).unwrap();
        assert_eq!(cache.get(&key).unwrap(), sample_result());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debate_cache.json");
        let key = canonical_key(&ClaimId::from("a"), &ClaimId::from("b"));

        {
            let cache = DebateCache::open(&path).unwrap();
            cache.insert(key.clone(), sample_result()).unwrap();
        }

        let reopened = DebateCache::open(&path).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), sample_result());
    }

    #[test]
    fn malformed_cache_file_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debate_cache.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(DebateCache::open(&path).is_err());
    }
}
