use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct PredictRequest {
    pub index: usize,
    pub observations: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PredictResponse {
    pub t: i64,
    pub index: usize,
    pub forecast: Vec<f32>,
}
