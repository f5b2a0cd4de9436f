use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("trajectory has no samples")]
    EmptyTrajectory,

    #[error("sample {position} is malformed: {reason}")]
    MalformedSample { position: usize, reason: String },

    /// Timestamps must never go backwards; equal timestamps are fine.
    #[error("sample {position} is out of order: timestamp {timestamp} precedes {previous}")]
    MalformedTrajectory {
        position: usize,
        previous: f64,
        timestamp: f64,
    },

    #[error("route is not valid JSON")]
    MalformedRoute(#[from] serde_json::Error),

    #[error("invalid normalization statistics: {0}")]
    InvalidStatistics(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("map fetch failed")]
    MapFetch(#[from] reqwest::Error),

    #[error("prediction failed for vehicle {index}")]
    Prediction {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn prediction(index: usize, source: impl Into<anyhow::Error>) -> Self {
        Error::Prediction {
            index,
            source: source.into(),
        }
    }
}
