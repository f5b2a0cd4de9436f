use anyhow::Context;
use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Learned per-feature mean and variance. Every variance is finite and >= 0.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStats")]
pub struct NormalizationStats {
    mean: Vec<f32>,
    variance: Vec<f32>,
}

#[derive(Deserialize)]
struct RawStats {
    mean: Vec<f32>,
    variance: Vec<f32>,
}

impl TryFrom<RawStats> for NormalizationStats {
    type Error = Error;

    fn try_from(raw: RawStats) -> Result<Self> {
        Self::new(raw.mean, raw.variance)
    }
}

impl NormalizationStats {
    pub fn new(mean: Vec<f32>, variance: Vec<f32>) -> Result<Self> {
        if mean.len() != variance.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                got: variance.len(),
            });
        }
        if let Some(i) = variance.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidStatistics(format!(
                "variance[{i}] = {} is not a finite non-negative number",
                variance[i]
            )));
        }
        Ok(Self { mean, variance })
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn variance(&self) -> &[f32] {
        &self.variance
    }
}

/// Input and output statistics shipped alongside the trained models.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsArtifact {
    pub input: NormalizationStats,
    pub output: NormalizationStats,
}

impl StatsArtifact {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read stats at {}", path.display()))?;
        serde_json::from_str(&txt)
            .with_context(|| format!("failed to parse stats at {}", path.display()))
    }
}

/// Z-score standardization ahead of inference.
///
/// The statistics may describe one row of features, in which case they are
/// applied to each row of `features`. Zero-variance features are only
/// centered.
pub fn normalize_input(features: &[f32], stats: &NormalizationStats) -> Result<Vec<f32>> {
    let width = stats.len();
    if width == 0 || features.len() % width != 0 {
        return Err(Error::DimensionMismatch {
            expected: width,
            got: features.len(),
        });
    }

    let out = features
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let j = i % width;
            let std = stats.variance[j].sqrt();
            let scale = if std > 0.0 { std } else { 1.0 };
            (x - stats.mean[j]) / scale
        })
        .collect();
    Ok(out)
}

/// Inverse z-score: `mean[i] + raw[i] * sqrt(variance[i])`.
pub fn denormalize_output(raw_prediction: &[f32], stats: &NormalizationStats) -> Result<Vec<f32>> {
    if raw_prediction.len() != stats.len() {
        return Err(Error::DimensionMismatch {
            expected: stats.len(),
            got: raw_prediction.len(),
        });
    }

    Ok(raw_prediction
        .iter()
        .zip(stats.mean.iter().zip(&stats.variance))
        .map(|(z, (m, v))| m + z * v.sqrt())
        .collect())
}
