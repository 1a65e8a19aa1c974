//! Confidence calibration
//!
//! Maps raw adjudicator confidences onto calibrated probabilities via
//! isotonic regression (pool-adjacent-violators), with endpoint clipping.
//! Untrained mode applies a conservative constant dampening so the system
//! runs correctly before any validation data exists.

use crate::persist::{save_json, SaveError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Dampening applied when no model has been trained.
const UNTRAINED_DAMPENING: f64 = 0.9;

/// Interpretive band over calibrated confidence. Cut-points 0.3 / 0.6 / 0.85.
/// `Unrelated` is reserved for pairs dismissed by the similarity pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Unrelated,
    Uncertain,
    Weak,
    Moderate,
    High,
}

impl ConfidenceBand {
    /// Band for a calibrated confidence value.
    pub fn for_confidence(calibrated: f64) -> Self {
        if calibrated < 0.3 {
            ConfidenceBand::Uncertain
        } else if calibrated < 0.6 {
            ConfidenceBand::Weak
        } else if calibrated < 0.85 {
            ConfidenceBand::Moderate
        } else {
            ConfidenceBand::High
        }
    }
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceBand::Unrelated => "unrelated",
            ConfidenceBand::Uncertain => "uncertain",
            ConfidenceBand::Weak => "weak",
            ConfidenceBand::Moderate => "moderate",
            ConfidenceBand::High => "high",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no training pairs supplied")]
    EmptyTrainingSet,

    #[error("raw confidence {0} outside [0, 1]")]
    OutOfRange(f64),

    #[error("persistence error: {0}")]
    Persist(#[from] SaveError),
}

/// Fitted isotonic model: parallel sorted arrays of training positions and
/// their pooled values. Prediction interpolates linearly and clips at the
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsotonicModel {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl IsotonicModel {
    /// Pool-adjacent-violators over `(raw, label)` pairs.
    fn fit(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Blocks of (value sum, weight, first index)
        struct Block {
            sum: f64,
            weight: f64,
            start: usize,
        }
        let mut blocks: Vec<Block> = Vec::new();
        for (i, &(_, y)) in pairs.iter().enumerate() {
            blocks.push(Block {
                sum: y,
                weight: 1.0,
                start: i,
            });
            // Merge while the monotonicity constraint is violated
            while blocks.len() >= 2 {
                let n = blocks.len();
                let prev_mean = blocks[n - 2].sum / blocks[n - 2].weight;
                let cur_mean = blocks[n - 1].sum / blocks[n - 1].weight;
                if prev_mean <= cur_mean {
                    break;
                }
                let cur = blocks.pop().unwrap();
                let prev = blocks.last_mut().unwrap();
                prev.sum += cur.sum;
                prev.weight += cur.weight;
            }
        }

        // Expand pooled means back over the sorted positions
        let mut fitted = vec![0.0; pairs.len()];
        for (b, block) in blocks.iter().enumerate() {
            let end = blocks.get(b + 1).map(|nb| nb.start).unwrap_or(pairs.len());
            let mean = block.sum / block.weight;
            for slot in fitted.iter_mut().take(end).skip(block.start) {
                *slot = mean;
            }
        }

        // Collapse duplicate x positions, keeping the last fitted value
        // (identical x always pools into one block, so values agree)
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (i, &(x, _)) in pairs.iter().enumerate() {
            if xs.last().map(|&last: &f64| last == x).unwrap_or(false) {
                *ys.last_mut().unwrap() = fitted[i];
            } else {
                xs.push(x);
                ys.push(fitted[i]);
            }
        }
        Self { xs, ys }
    }

    /// Linear interpolation between fitted points, clipped at the endpoints.
    fn predict(&self, x: f64) -> f64 {
        if self.xs.is_empty() {
            return x;
        }
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= *self.xs.last().unwrap() {
            return *self.ys.last().unwrap();
        }
        let i = self.xs.partition_point(|&p| p <= x);
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        let t = (x - x0) / (x1 - x0);
        y0 + t * (y1 - y0)
    }
}

/// The calibration layer.
///
/// Load the persisted model at startup with [`CalibrationLayer::load`]; the
/// layer runs untrained (constant dampening) when no model file exists.
#[derive(Debug)]
pub struct CalibrationLayer {
    model: Option<IsotonicModel>,
    model_path: Option<PathBuf>,
}

impl Default for CalibrationLayer {
    fn default() -> Self {
        Self::untrained()
    }
}

impl CalibrationLayer {
    /// An untrained, in-memory layer.
    pub fn untrained() -> Self {
        Self {
            model: None,
            model_path: None,
        }
    }

    /// Load a model from `path` if it exists; otherwise start untrained.
    /// Future `train` calls persist to the same path.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let model = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());
        if model.is_some() {
            tracing::info!(path = %path.display(), "loaded calibration model");
        }
        Self {
            model,
            model_path: Some(path),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Fit on `(raw_confidence, label)` validation pairs, where label is
    /// 0.0 (refuted) or 1.0 (supported), and persist the model.
    pub fn train(&mut self, pairs: &[(f64, f64)]) -> Result<(), CalibrationError> {
        if pairs.is_empty() {
            return Err(CalibrationError::EmptyTrainingSet);
        }
        for &(raw, _) in pairs {
            if !(0.0..=1.0).contains(&raw) {
                return Err(CalibrationError::OutOfRange(raw));
            }
        }
        let model = IsotonicModel::fit(pairs.to_vec());
        if let Some(ref path) = self.model_path {
            save_json(path, &model)?;
        }
        self.model = Some(model);
        Ok(())
    }

    /// Map a raw confidence to `(calibrated, band)`.
    ///
    /// Raw values are clamped into [0, 1] before mapping, so the
    /// monotone-endpoint invariant holds for any input.
    pub fn calibrate(&self, raw: f64) -> (f64, ConfidenceBand) {
        let raw = raw.clamp(0.0, 1.0);
        let calibrated = match self.model {
            Some(ref model) => model.predict(raw).clamp(0.0, 1.0),
            None => raw * UNTRAINED_DAMPENING,
        };
        (calibrated, ConfidenceBand::for_confidence(calibrated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrained_applies_conservative_dampening() {
        let layer = CalibrationLayer::untrained();
        let (c, band) = layer.calibrate(0.82);
        assert!((c - 0.738).abs() < 1e-9);
        assert_eq!(band, ConfidenceBand::Moderate);
    }

    #[test]
    fn bands_follow_cut_points() {
        assert_eq!(ConfidenceBand::for_confidence(0.1), ConfidenceBand::Uncertain);
        assert_eq!(ConfidenceBand::for_confidence(0.3), ConfidenceBand::Weak);
        assert_eq!(ConfidenceBand::for_confidence(0.6), ConfidenceBand::Moderate);
        assert_eq!(ConfidenceBand::for_confidence(0.85), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::for_confidence(0.99), ConfidenceBand::High);
    }

    #[test]
    fn fit_on_monotone_data_is_identityish() {
        let mut layer = CalibrationLayer::untrained();
        layer
            .train(&[(0.1, 0.0), (0.4, 0.0), (0.6, 1.0), (0.9, 1.0)])
            .unwrap();
        let (low, _) = layer.calibrate(0.1);
        let (high, _) = layer.calibrate(0.9);
        assert!(low < 0.5);
        assert!(high > 0.5);
    }

    #[test]
    fn pav_pools_violators() {
        // A high raw score with a negative label must be pooled down
        let mut layer = CalibrationLayer::untrained();
        layer
            .train(&[(0.2, 0.0), (0.5, 1.0), (0.7, 0.0), (0.9, 1.0)])
            .unwrap();
        // 0.5 and 0.7 violate monotonicity and pool to 0.5
        let (mid, _) = layer.calibrate(0.6);
        assert!((mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn calibration_is_monotone_once_trained() {
        let mut layer = CalibrationLayer::untrained();
        layer
            .train(&[
                (0.05, 0.0),
                (0.2, 0.0),
                (0.35, 1.0),
                (0.5, 0.0),
                (0.65, 1.0),
                (0.8, 1.0),
                (0.95, 1.0),
            ])
            .unwrap();

        let mut prev = -1.0;
        for i in 0..=100 {
            let raw = i as f64 / 100.0;
            let (c, _) = layer.calibrate(raw);
            assert!(c >= prev, "monotonicity broken at raw={}", raw);
            prev = c;
        }
    }

    #[test]
    fn extrapolation_clips_at_endpoints() {
        let mut layer = CalibrationLayer::untrained();
        layer.train(&[(0.3, 0.0), (0.7, 1.0)]).unwrap();
        let (lo, _) = layer.calibrate(0.0);
        let (hi, _) = layer.calibrate(1.0);
        assert_eq!(lo, 0.0);
        assert_eq!(hi, 1.0);
    }

    #[test]
    fn empty_training_set_rejected() {
        let mut layer = CalibrationLayer::untrained();
        assert!(matches!(
            layer.train(&[]),
            Err(CalibrationError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn out_of_range_training_pair_rejected() {
        let mut layer = CalibrationLayer::untrained();
        assert!(matches!(
            layer.train(&[(1.2, 1.0)]),
            Err(CalibrationError::OutOfRange(_))
        ));
    }

    #[test]
    fn model_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration_model.json");

        let mut layer = CalibrationLayer::load(&path);
        assert!(!layer.is_trained());
        layer
            .train(&[(0.1, 0.0), (0.5, 0.0), (0.8, 1.0), (0.95, 1.0)])
            .unwrap();
        let (trained_value, _) = layer.calibrate(0.8);

        let reloaded = CalibrationLayer::load(&path);
        assert!(reloaded.is_trained());
        let (reloaded_value, _) = reloaded.calibrate(0.8);
        assert_eq!(trained_value, reloaded_value);
    }

    #[test]
    fn missing_model_file_runs_untrained() {
        let dir = tempfile::tempdir().unwrap();
        let layer = CalibrationLayer::load(dir.path().join("nope.json"));
        assert!(!layer.is_trained());
        let (c, _) = layer.calibrate(1.0);
        assert!((c - 0.9).abs() < 1e-9);
    }
}
