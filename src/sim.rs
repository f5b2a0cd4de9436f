use bytes::Bytes;
use std::{fmt, sync::Arc, time::Duration};

use crate::{
    dispatch::Predictor,
    error::{Error, Result},
    trajectory::{Car, Point},
};

pub const DEFAULT_PROJECTION: &str = "EPSG:4326";
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

/// Axis-aligned region; `north_east` must lie strictly north and east of
/// `south_west`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north_east: Point,
    pub south_west: Point,
}

impl BoundingBox {
    pub fn new(north_east: Point, south_west: Point) -> Result<Self> {
        let bbox = Self {
            north_east,
            south_west,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            north_east: ne,
            south_west: sw,
        } = self;
        if !ne.is_finite() || !sw.is_finite() {
            return Err(Error::InvalidBoundingBox(format!(
                "corners must be finite: {ne:?}, {sw:?}"
            )));
        }
        if ne.lat <= sw.lat || ne.lon <= sw.lon {
            return Err(Error::InvalidBoundingBox(format!(
                "north_east {ne:?} is not strictly north-east of south_west {sw:?}"
            )));
        }
        Ok(())
    }

    /// Inclusive on every edge.
    pub fn contains(&self, p: &Point) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
            && (self.south_west.lon..=self.north_east.lon).contains(&p.lon)
    }

    pub fn query_parameters(&self) -> String {
        let Self {
            north_east: ne,
            south_west: sw,
        } = self;
        format!(
            "lat1={}&lon1={}&lat2={}&lon2={}",
            ne.lat, ne.lon, sw.lat, sw.lon
        )
    }
}

/// Road-network tile service.
#[derive(Debug, Clone)]
pub struct MapClient {
    http: reqwest::Client,
    base_url: String,
}

impl MapClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn roads_url(&self, bbox: &BoundingBox) -> String {
        format!(
            "{}/get_roads_in_bbox.parquet?{}",
            self.base_url,
            bbox.query_parameters()
        )
    }

    /// Fetches the roads inside `bbox`. The body is returned untouched.
    /// Non-2xx responses are errors; nothing is retried.
    pub async fn fetch_roads(&self, bbox: &BoundingBox) -> Result<Bytes> {
        let url = self.roads_url(bbox);
        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tracing::info!("fetched {} bytes of roads from {}", body.len(), url);
        Ok(body)
    }
}

#[derive(Debug, Clone)]
pub struct SimOptions {
    pub predict_n: usize,
    pub step_delta: Duration,
    pub projection_from: String,
    pub projection_to: Option<String>,
    /// 0 leaves the run length to the engine.
    pub steps: usize,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            predict_n: 1,
            step_delta: DEFAULT_STEP,
            projection_from: DEFAULT_PROJECTION.to_string(),
            projection_to: None,
            steps: 0,
        }
    }
}

/// Everything the external engine needs for one run. Read-only once
/// assembled.
pub struct SimConfig {
    bbox: BoundingBox,
    map: Bytes,
    cars: Vec<Car>,
    predictor: Arc<dyn Predictor>,
    options: SimOptions,
    server_url: String,
}

impl SimConfig {
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn map(&self) -> &Bytes {
        &self.map
    }

    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn predictor(&self) -> &Arc<dyn Predictor> {
        &self.predictor
    }

    pub fn predict(&self, index: usize, recent_observations: &[f32]) -> Result<Vec<f32>> {
        self.predictor.predict(index, recent_observations)
    }

    pub fn predict_n(&self) -> usize {
        self.options.predict_n
    }

    pub fn step_delta(&self) -> Duration {
        self.options.step_delta
    }

    pub fn projection_from(&self) -> &str {
        &self.options.projection_from
    }

    pub fn projection_to(&self) -> Option<&str> {
        self.options.projection_to.as_deref()
    }

    pub fn steps(&self) -> usize {
        self.options.steps
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

impl fmt::Debug for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimConfig")
            .field("bbox", &self.bbox)
            .field("map_bytes", &self.map.len())
            .field("cars", &self.cars.len())
            .field("options", &self.options)
            .field("server_url", &self.server_url)
            .finish()
    }
}

pub struct SimConfigAssembler {
    maps: MapClient,
}

impl SimConfigAssembler {
    pub fn new(maps: MapClient) -> Self {
        Self { maps }
    }

    /// Validates the box before any request, fetches the map once and
    /// freezes the result.
    pub async fn assemble(
        &self,
        bbox: BoundingBox,
        cars: Vec<Car>,
        predictor: Arc<dyn Predictor>,
        options: SimOptions,
    ) -> Result<SimConfig> {
        bbox.validate()?;
        if predictor.horizon() != options.predict_n {
            return Err(Error::DimensionMismatch {
                expected: options.predict_n,
                got: predictor.horizon(),
            });
        }

        let map = self.maps.fetch_roads(&bbox).await?;

        tracing::info!(
            "assembled sim config: {} cars, predict_n={}, step={:?}, projection_to={:?}",
            cars.len(),
            options.predict_n,
            options.step_delta,
            options.projection_to
        );

        Ok(SimConfig {
            bbox,
            map,
            cars,
            predictor,
            options,
            server_url: self.maps.base_url().to_string(),
        })
    }
}
