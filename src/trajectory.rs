use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::error::{Error, Result};

/// Geographic position. Ranges are not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One ingested position sample; `timestamp` is absolute (e.g. epoch seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: f64,
    pub lat: f64,
    pub lon: f64,
}

impl RawSample {
    pub fn new(timestamp: f64, lat: f64, lon: f64) -> Self {
        Self { timestamp, lat, lon }
    }

    /// Builds a sample from a `[timestamp, lat, lon]` triple.
    pub fn from_triple(position: usize, values: &[f64]) -> Result<Self> {
        match *values {
            [timestamp, lat, lon] => Ok(Self::new(timestamp, lat, lon)),
            _ => Err(Error::MalformedSample {
                position,
                reason: format!("expected [timestamp, lat, lon], got {} values", values.len()),
            }),
        }
    }

    fn check(&self, position: usize) -> Result<()> {
        let field = if !self.timestamp.is_finite() {
            "timestamp"
        } else if !self.lat.is_finite() {
            "lat"
        } else if !self.lon.is_finite() {
            "lon"
        } else {
            return Ok(());
        };
        Err(Error::MalformedSample {
            position,
            reason: format!("{field} is not a finite number"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedPoint {
    pub point: Point,
    pub offset: Duration,
}

/// Time-ordered path with offsets relative to its first sample.
///
/// Only [`TrajectoryBuilder`] creates these, so the first offset is always
/// zero and offsets never decrease.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    samples: Vec<TimedPoint>,
}

impl Trajectory {
    pub fn from_samples(samples: &[RawSample]) -> Result<Self> {
        let mut builder = TrajectoryBuilder::with_capacity(samples.len());
        builder.extend(samples.iter().copied());
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Never true for a built trajectory.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedPoint> + '_ {
        self.samples.iter()
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.samples.iter().map(|s| s.point)
    }

    pub fn offsets(&self) -> impl Iterator<Item = Duration> + '_ {
        self.samples.iter().map(|s| s.offset)
    }

    /// Offset of the last sample.
    pub fn duration(&self) -> Duration {
        self.samples.last().map(|s| s.offset).unwrap_or_default()
    }

    /// Position at `offset`, linearly interpolated between the two
    /// bracketing samples. `None` past the end of the trajectory.
    pub fn position_at(&self, offset: Duration) -> Option<Point> {
        match self.samples.binary_search_by(|s| s.offset.cmp(&offset)) {
            Ok(i) => Some(self.samples[i].point),
            Err(i) if i == 0 || i >= self.samples.len() => None,
            Err(i) => {
                let a = &self.samples[i - 1];
                let b = &self.samples[i];
                let span = (b.offset - a.offset).as_secs_f64();
                let f = (offset - a.offset).as_secs_f64() / span;
                Some(Point::new(
                    a.point.lat + (b.point.lat - a.point.lat) * f,
                    a.point.lon + (b.point.lon - a.point.lon) * f,
                ))
            }
        }
    }

    /// Model input built from the last `len` segments: one
    /// `[dt_seconds, lat, lon]` row per segment, flattened. The position is
    /// the segment's end point.
    pub fn observation_window(&self, len: usize) -> Option<Vec<f32>> {
        if self.samples.len() < len + 1 {
            return None;
        }
        let tail = &self.samples[self.samples.len() - (len + 1)..];
        let window = tail
            .windows(2)
            .flat_map(|w| {
                let dt = (w[1].offset - w[0].offset).as_secs_f32();
                [dt, w[1].point.lat as f32, w[1].point.lon as f32]
            })
            .collect();
        Some(window)
    }
}

/// Accumulates raw samples and turns them into a [`Trajectory`].
#[derive(Debug, Default, Clone)]
pub struct TrajectoryBuilder {
    raw: Vec<RawSample>,
}

impl TrajectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            raw: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, sample: RawSample) -> &mut Self {
        self.raw.push(sample);
        self
    }

    /// Rejects empty input, non-finite fields and timestamps that go
    /// backwards. Nothing is reordered or dropped.
    pub fn build(&self) -> Result<Trajectory> {
        let first = self.raw.first().ok_or(Error::EmptyTrajectory)?;
        first.check(0)?;
        let t0 = first.timestamp;

        let mut samples = Vec::with_capacity(self.raw.len());
        let mut previous = t0;
        for (position, s) in self.raw.iter().enumerate() {
            s.check(position)?;
            if s.timestamp < previous {
                return Err(Error::MalformedTrajectory {
                    position,
                    previous,
                    timestamp: s.timestamp,
                });
            }
            previous = s.timestamp;
            let offset = Duration::try_from_secs_f64(s.timestamp - t0).map_err(|e| {
                Error::MalformedSample {
                    position,
                    reason: format!("offset {} s from first sample: {e}", s.timestamp - t0),
                }
            })?;
            samples.push(TimedPoint {
                point: Point::new(s.lat, s.lon),
                offset,
            });
        }

        Ok(Trajectory { samples })
    }
}

impl Extend<RawSample> for TrajectoryBuilder {
    fn extend<I: IntoIterator<Item = RawSample>>(&mut self, iter: I) {
        self.raw.extend(iter);
    }
}

/// A trajectory bound to its position in the originating collection.
/// `index` selects the vehicle's model; it is only stable within one
/// simulation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Car {
    pub trajectory: Trajectory,
    pub index: usize,
}

impl Car {
    pub fn fleet(trajectories: impl IntoIterator<Item = Trajectory>) -> Vec<Car> {
        trajectories
            .into_iter()
            .enumerate()
            .map(|(index, trajectory)| Car { trajectory, index })
            .collect()
    }
}

/// Parses one route: a JSON array of `[timestamp, lat, lon]` triples.
pub fn parse_route(json: &str) -> Result<Vec<RawSample>> {
    let triples: Vec<Vec<f64>> = serde_json::from_str(json)?;
    triples
        .iter()
        .enumerate()
        .map(|(i, t)| RawSample::from_triple(i, t))
        .collect()
}

/// Reads a JSON-lines routes file and builds one trajectory per line.
/// Blank lines are skipped; any bad route fails the whole load.
pub fn load_routes(path: impl AsRef<Path>) -> anyhow::Result<Vec<Trajectory>> {
    use anyhow::Context;

    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read routes at {}", path.display()))?;

    let mut trajectories = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let trajectory = parse_route(line)
            .and_then(|samples| Trajectory::from_samples(&samples))
            .with_context(|| format!("bad route on line {} of {}", line_no + 1, path.display()))?;
        trajectories.push(trajectory);
    }
    tracing::info!("loaded {} trajectories from {}", trajectories.len(), path.display());
    Ok(trajectories)
}
