//! Cached application of the viewport transform.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::transform::{compute_transform, TransformConfig, TransformMatrix};
use crate::error::TransformError;
use crate::pose::{LandmarkIndex, Pose};

#[derive(Debug, Default)]
struct MapperState {
    config: Option<TransformConfig>,
    /// `None` while stale or not ready
    matrix: Option<Arc<TransformMatrix>>,
    /// Set when the current config failed to compute
    error: Option<TransformError>,
    generation: u64,
}

/// Maps normalized landmarks to destination pixels and back.
///
/// Config updates may come from another thread (rotation/resize events).
/// Recomputation happens under the write lock and every mapping call works on
/// a single `Arc<TransformMatrix>` snapshot, so a batch never mixes matrices.
#[derive(Debug, Default)]
pub struct CoordinateMapper {
    state: RwLock<MapperState>,
}

impl CoordinateMapper {
    /// Mapper with no config; not ready until `update_config` is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TransformConfig) -> Self {
        let mapper = Self::new();
        mapper.update_config(config);
        mapper
    }

    /// Replace the config. The matrix is recomputed lazily on the next
    /// mapping call.
    pub fn update_config(&self, config: TransformConfig) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::replace_config(&mut state, config);
    }

    /// Edit the current config (or the default one when none is set) under
    /// the write lock, so concurrent edits of different fields are all kept.
    /// Returns the config now in effect.
    pub fn modify_config<F>(&self, edit: F) -> TransformConfig
    where
        F: FnOnce(&mut TransformConfig),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut config = state.config.unwrap_or_default();
        edit(&mut config);
        Self::replace_config(&mut state, config);
        config
    }

    fn replace_config(state: &mut MapperState, config: TransformConfig) {
        if state.config == Some(config) && state.error.is_none() {
            return;
        }
        state.config = Some(config);
        state.matrix = None;
        state.error = None;
        state.generation += 1;
        debug!(generation = state.generation, ?config, "transform config updated");
    }

    pub fn config(&self) -> Option<TransformConfig> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).config
    }

    /// Bumped on every accepted config change
    pub fn generation(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    /// Whether a valid matrix is available (computing it if stale).
    pub fn is_ready(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// Current matrix, recomputed first if the config changed.
    pub fn snapshot(&self) -> Result<Arc<TransformMatrix>, TransformError> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(matrix) = &state.matrix {
                return Ok(Arc::clone(matrix));
            }
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            if state.config.is_none() {
                return Err(TransformError::NotReady);
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have recomputed while we waited for the lock
        if let Some(matrix) = &state.matrix {
            return Ok(Arc::clone(matrix));
        }
        let Some(config) = state.config else {
            return Err(TransformError::NotReady);
        };
        match compute_transform(&config) {
            Ok(matrix) => {
                let matrix = Arc::new(matrix);
                state.matrix = Some(Arc::clone(&matrix));
                debug!(generation = state.generation, scale = ?matrix.scale(), "transform recomputed");
                Ok(matrix)
            }
            Err(err) => {
                warn!(error = %err, "mapper not ready");
                state.error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn to_pixel(&self, nx: f64, ny: f64) -> Result<(f64, f64), TransformError> {
        Ok(self.snapshot()?.apply(nx, ny))
    }

    pub fn to_normalized(&self, px: f64, py: f64) -> Result<(f64, f64), TransformError> {
        Ok(self.snapshot()?.apply_inverse(px, py))
    }

    /// Map a batch with one matrix snapshot taken at entry.
    pub fn batch_to_pixel(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, TransformError> {
        let matrix = self.snapshot()?;
        Ok(points.iter().map(|&(x, y)| matrix.apply(x, y)).collect())
    }

    pub fn batch_to_normalized(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, TransformError> {
        let matrix = self.snapshot()?;
        Ok(points.iter().map(|&(x, y)| matrix.apply_inverse(x, y)).collect())
    }

    pub fn is_within_bounds(&self, px: f64, py: f64) -> Result<bool, TransformError> {
        Ok(self.snapshot()?.is_within_bounds(px, py))
    }

    /// Map all landmarks of a pose with a single snapshot.
    pub fn map_pose(&self, pose: &Pose) -> Result<MappedPose, TransformError> {
        Ok(MappedPose::new(pose.clone(), self.snapshot()?))
    }
}

/// 画素座標に変換済みのランドマーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelLandmark {
    pub x: f32,
    pub y: f32,
    pub visibility: f32,
    pub presence: f32,
}

impl PixelLandmark {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A smoothed pose together with its destination-space points.
///
/// Holds the matrix it was mapped with so either space can be queried later.
#[derive(Debug, Clone)]
pub struct MappedPose {
    pose: Pose,
    pixels: [PixelLandmark; LandmarkIndex::COUNT],
    matrix: Arc<TransformMatrix>,
}

impl MappedPose {
    pub fn new(pose: Pose, matrix: Arc<TransformMatrix>) -> Self {
        let pixels = std::array::from_fn(|i| {
            let lm = &pose.landmarks[i];
            let (px, py) = matrix.apply(lm.x as f64, lm.y as f64);
            PixelLandmark {
                x: px as f32,
                y: py as f32,
                visibility: lm.visibility,
                presence: lm.presence,
            }
        });
        Self { pose, pixels, matrix }
    }

    /// Smoothed pose in normalized space
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pixels(&self) -> &[PixelLandmark; LandmarkIndex::COUNT] {
        &self.pixels
    }

    pub fn pixel(&self, index: LandmarkIndex) -> &PixelLandmark {
        &self.pixels[index as usize]
    }

    pub fn normalized(&self, index: LandmarkIndex) -> (f32, f32) {
        let lm = self.pose.get(index);
        (lm.x, lm.y)
    }

    pub fn matrix(&self) -> &Arc<TransformMatrix> {
        &self.matrix
    }

    pub fn is_within_bounds(&self, index: LandmarkIndex) -> bool {
        let p = self.pixel(index);
        self.matrix.is_within_bounds(p.x as f64, p.y as f64)
    }
}
