use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::{
    sim::{BoundingBox, SimOptions, DEFAULT_PROJECTION},
    trajectory::Point,
};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub map_url: String,
    pub model_dir: PathBuf,
    pub stats_path: PathBuf,
    pub routes_path: PathBuf,
    pub north_east: Point,
    pub south_west: Point,
    pub predict_n: usize,
    #[serde(default = "default_step_secs")]
    pub step_secs: f64,
    #[serde(default = "default_observation_len")]
    pub observation_len: usize,
    #[serde(default = "default_projection")]
    pub projection_from: String,
    #[serde(default)]
    pub projection_to: Option<String>,
    #[serde(default)]
    pub steps: usize,
}

fn default_step_secs() -> f64 {
    60.0
}

fn default_observation_len() -> usize {
    11
}

fn default_projection() -> String {
    DEFAULT_PROJECTION.to_string()
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let mut settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("invalid config JSON in {}", path.display()))?;

        if let Ok(url) = std::env::var("MAP_URL") {
            settings.map_url = url;
        }
        Ok(settings)
    }

    /// `CONFIG_PATH`, falling back to `traj_predictor.json` in the working
    /// directory.
    pub fn path_from_env() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("traj_predictor.json"))
    }

    pub fn bbox(&self) -> crate::Result<BoundingBox> {
        BoundingBox::new(self.north_east, self.south_west)
    }

    pub fn sim_options(&self) -> Result<SimOptions> {
        let step_delta = Duration::try_from_secs_f64(self.step_secs)
            .with_context(|| format!("invalid step_secs {}", self.step_secs))?;
        Ok(SimOptions {
            predict_n: self.predict_n,
            step_delta,
            projection_from: self.projection_from.clone(),
            projection_to: self.projection_to.clone(),
            steps: self.steps,
        })
    }
}

pub fn port_from_env() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080)
}
