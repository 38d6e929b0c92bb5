//! Perception Seams
//!
//! Interface contracts for the camera and the target detector, which live
//! outside this crate. The emulation implementations here are what fly in
//! SITL: a camera that serves pre-staged frames and a detector that returns
//! the plan's briefed target coordinates.

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// The corridor the detection sweep photographs.
#[derive(Debug, Clone)]
pub struct DetectionZone {
    pub entry: Coordinate,
    pub exit: Coordinate,
    /// Corridor width in meters.
    pub width_m: f64,
}

impl DetectionZone {
    pub fn sweep_length_m(&self) -> f64 {
        self.entry.distance_to(&self.exit)
    }

    /// Whether `coord` lies inside the corridor: within half the width of
    /// the entry→exit track and between its endpoints.
    pub fn contains(&self, coord: &Coordinate) -> bool {
        let track_bearing = self.entry.bearing_to(&self.exit);
        let target_bearing = self.entry.bearing_to(coord);
        let distance = self.entry.distance_to(coord);
        let delta = (target_bearing - track_bearing).to_radians();
        let along = distance * delta.cos();
        let cross = distance * delta.sin();
        along >= 0.0 && along <= self.sweep_length_m() && cross.abs() <= self.width_m / 2.0
    }
}

/// Image source mounted on the airframe.
#[async_trait]
pub trait Camera: Send {
    /// Capture `count` frames `interval` apart, saved under `dir`.
    async fn capture(
        &mut self,
        count: u32,
        interval: Duration,
        dir: &Path,
    ) -> Result<Vec<PathBuf>>;
}

/// Fuses the captured frames into target coordinates.
#[async_trait]
pub trait TargetDetector: Send {
    async fn detect(
        &mut self,
        images: &[PathBuf],
        zone: &DetectionZone,
    ) -> Result<Vec<Coordinate>>;
}

/// Camera emulator: serves frames already present in a directory instead of
/// talking to hardware.
pub struct FileCamera {
    source: PathBuf,
}

impl FileCamera {
    pub fn new(source: PathBuf) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn capture(
        &mut self,
        count: u32,
        _interval: Duration,
        _dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(&self.source)
            .map_err(|_| Error::FileNotFound(self.source.clone()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect();
        frames.sort();
        frames.truncate(count as usize);
        if frames.is_empty() {
            return Err(Error::FileEmpty(self.source.clone()));
        }
        info!("serving {} pre-staged frame(s)", frames.len());
        Ok(frames)
    }
}

/// Detector emulator: returns the plan's briefed targets, filtered to the
/// detection corridor.
pub struct BriefedTargetDetector {
    targets: Vec<Coordinate>,
}

impl BriefedTargetDetector {
    pub fn new(targets: Vec<Coordinate>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl TargetDetector for BriefedTargetDetector {
    async fn detect(
        &mut self,
        _images: &[PathBuf],
        zone: &DetectionZone,
    ) -> Result<Vec<Coordinate>> {
        let mut inside = Vec::new();
        for target in &self.targets {
            if zone.contains(target) {
                inside.push(*target);
            } else {
                warn!("briefed target {target} is outside the detection corridor");
            }
        }
        Ok(inside)
    }
}
