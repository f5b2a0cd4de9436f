use std::sync::Arc;

use crate::{
    cache::ModelCache,
    error::{Error, Result},
    model::Forecaster,
    normalize::{denormalize_output, normalize_input, NormalizationStats},
};

/// What the simulation engine calls once per vehicle per step.
pub trait Predictor: Send + Sync {
    fn predict(&self, index: usize, recent_observations: &[f32]) -> Result<Vec<f32>>;

    /// Length of every forecast returned by `predict`.
    fn horizon(&self) -> usize;
}

type Loader<M> = dyn Fn(usize) -> anyhow::Result<M> + Send + Sync;

/// Normalizes observations, runs the vehicle's model and maps the forecast
/// back to output units. Horizon and statistics are fixed per instance.
pub struct PredictionDispatcher<M> {
    input_stats: NormalizationStats,
    output_stats: NormalizationStats,
    predict_n: usize,
    models: ModelCache<M>,
    loader: Box<Loader<M>>,
}

impl<M: Forecaster> PredictionDispatcher<M> {
    /// `output_stats` must cover exactly `predict_n` values.
    pub fn new<L>(
        input_stats: NormalizationStats,
        output_stats: NormalizationStats,
        predict_n: usize,
        loader: L,
    ) -> Result<Self>
    where
        L: Fn(usize) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        if output_stats.len() != predict_n {
            return Err(Error::DimensionMismatch {
                expected: predict_n,
                got: output_stats.len(),
            });
        }
        Ok(Self {
            input_stats,
            output_stats,
            predict_n,
            models: ModelCache::new(),
            loader: Box::new(loader),
        })
    }

    pub fn models(&self) -> &ModelCache<M> {
        &self.models
    }

    pub fn into_shared(self) -> Arc<dyn Predictor>
    where
        M: 'static,
    {
        Arc::new(self)
    }
}

impl<M: Forecaster> Predictor for PredictionDispatcher<M> {
    fn predict(&self, index: usize, recent_observations: &[f32]) -> Result<Vec<f32>> {
        let input = normalize_input(recent_observations, &self.input_stats)
            .map_err(|e| Error::prediction(index, e))?;

        let model = self
            .models
            .get_or_load(index, || (self.loader)(index))
            .map_err(|e| Error::prediction(index, e.context("model load failed")))?;

        let raw = model
            .infer(&input)
            .map_err(|e| Error::prediction(index, e.context("inference failed")))?;

        if raw.len() != self.predict_n {
            return Err(Error::prediction(
                index,
                anyhow::anyhow!("model returned {} values, expected {}", raw.len(), self.predict_n),
            ));
        }

        tracing::debug!("vehicle {} forecast of {} values", index, raw.len());
        denormalize_output(&raw, &self.output_stats)
    }

    fn horizon(&self) -> usize {
        self.predict_n
    }
}
