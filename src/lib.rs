//! Trajectory ingestion and per-vehicle forecast dispatch for an external
//! traffic simulation.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod normalize;
pub mod server;
pub mod sim;
pub mod trajectory;
pub mod types;

pub use cache::ModelCache;
pub use dispatch::{PredictionDispatcher, Predictor};
pub use error::{Error, Result};
pub use model::Forecaster;
pub use normalize::{denormalize_output, normalize_input, NormalizationStats, StatsArtifact};
pub use sim::{BoundingBox, MapClient, SimConfig, SimConfigAssembler, SimOptions};
pub use trajectory::{Car, Point, RawSample, Trajectory, TrajectoryBuilder};
