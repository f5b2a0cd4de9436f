use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    dispatch::Predictor,
    types::{PredictRequest, PredictResponse},
};

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn Predictor>,
    pub log_pred: bool,
}

impl AppState {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            predictor,
            log_pred: std::env::var("LOG_PRED").ok().as_deref() == Some("1"),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn internal(msg: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg })))
}

async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    if state.log_pred {
        let obs = &req.observations;
        let nz = obs.iter().filter(|x| **x != 0.0).count();
        let mean = if obs.is_empty() { 0.0 } else { obs.iter().sum::<f32>() / obs.len() as f32 };
        tracing::info!(
            "recv index={} in_dim={} nonzero={} mean={:.3}",
            req.index, obs.len(), nz, mean
        );
    }

    let predictor = state.predictor.clone();
    let index = req.index;
    let forecast = tokio::task::spawn_blocking(move || predictor.predict(index, &req.observations))
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| {
            tracing::warn!("prediction for vehicle {} failed: {:#}", index, anyhow::Error::from(e));
            internal(format!("prediction failed for vehicle {index}"))
        })?;

    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    Ok(Json(PredictResponse { t, index, forecast }))
}
