//! Viewport transform: normalized source coordinates to destination pixels.
//!
//! The composed matrix is built in one fixed order for every angle:
//!
//! 1. normalized → source pixels, centered on the source frame center
//! 2. rotation by `rotation_degrees` (clockwise as displayed, y pointing down)
//! 3. fit-mode scale against the rotated source bounding box
//! 4. translation of the content center onto the destination center
//! 5. optional horizontal flip about the destination centerline
//!
//! Right angles are not special cased. They are the same formula evaluated at
//! 90/180/270 degrees, with the trigonometric values snapped to exact 0/±1.

use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;

use crate::error::TransformError;

/// Policy for reconciling source and destination aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Independent per-axis scale; fills the destination exactly, no cropping
    #[default]
    Fill,
    /// Uniform scale by the larger ratio; overflow is cropped
    CenterCrop,
    /// Uniform scale by the smaller ratio; letterboxed, whole source visible
    CenterInside,
}

impl FitMode {
    /// Scale factors (x, y) that fit `src` into `dest` under this mode.
    pub fn scale(self, src_w: f64, src_h: f64, dest_w: f64, dest_h: f64) -> (f64, f64) {
        let kx = dest_w / src_w;
        let ky = dest_h / src_h;
        match self {
            FitMode::Fill => (kx, ky),
            FitMode::CenterCrop => {
                let k = kx.max(ky);
                (k, k)
            }
            FitMode::CenterInside => {
                let k = kx.min(ky);
                (k, k)
            }
        }
    }

    /// Next mode in declaration order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            FitMode::Fill => FitMode::CenterCrop,
            FitMode::CenterCrop => FitMode::CenterInside,
            FitMode::CenterInside => FitMode::Fill,
        }
    }
}

/// Camera/display geometry the overlay has to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub rotation_degrees: f64,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub fit_mode: FitMode,
    #[serde(default = "default_src_width")]
    pub src_width: u32,
    #[serde(default = "default_src_height")]
    pub src_height: u32,
    #[serde(default = "default_dest_width")]
    pub dest_width: u32,
    #[serde(default = "default_dest_height")]
    pub dest_height: u32,
}

fn default_src_width() -> u32 { 640 }
fn default_src_height() -> u32 { 480 }
fn default_dest_width() -> u32 { 640 }
fn default_dest_height() -> u32 { 480 }

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 0.0,
            mirror: false,
            fit_mode: FitMode::default(),
            src_width: default_src_width(),
            src_height: default_src_height(),
            dest_width: default_dest_width(),
            dest_height: default_dest_height(),
        }
    }
}

impl TransformConfig {
    pub fn new(src_width: u32, src_height: u32, dest_width: u32, dest_height: u32) -> Self {
        Self {
            src_width,
            src_height,
            dest_width,
            dest_height,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_fit_mode(mut self, fit_mode: FitMode) -> Self {
        self.fit_mode = fit_mode;
        self
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        if self.src_width == 0 || self.src_height == 0 {
            return Err(TransformError::invalid(format!(
                "source size must be positive, got {}x{}",
                self.src_width, self.src_height
            )));
        }
        if self.dest_width == 0 || self.dest_height == 0 {
            return Err(TransformError::invalid(format!(
                "destination size must be positive, got {}x{}",
                self.dest_width, self.dest_height
            )));
        }
        if !self.rotation_degrees.is_finite() {
            return Err(TransformError::invalid(format!(
                "rotation must be finite, got {}",
                self.rotation_degrees
            )));
        }
        Ok(())
    }
}

/// Immutable snapshot of a composed transform and its inverse
#[derive(Debug, Clone, PartialEq)]
pub struct TransformMatrix {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
    dest_width: f64,
    dest_height: f64,
    scale: (f64, f64),
}

impl TransformMatrix {
    /// Sentinel for "no usable transform": identity over a 1x1 destination.
    pub fn identity() -> Self {
        Self {
            forward: Matrix3::identity(),
            inverse: Matrix3::identity(),
            dest_width: 1.0,
            dest_height: 1.0,
            scale: (1.0, 1.0),
        }
    }

    pub fn forward(&self) -> &Matrix3<f64> {
        &self.forward
    }

    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn dest_size(&self) -> (f64, f64) {
        (self.dest_width, self.dest_height)
    }

    /// Fit-mode scale factors (x, y) baked into this matrix
    pub fn scale(&self) -> (f64, f64) {
        self.scale
    }

    /// Normalized source point → destination pixel
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        apply_affine(&self.forward, x, y)
    }

    /// Destination pixel → normalized source point
    #[inline]
    pub fn apply_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        apply_affine(&self.inverse, x, y)
    }

    /// Whether a pixel lies inside [0, dest_width] x [0, dest_height].
    /// Non-finite points are never inside.
    pub fn is_within_bounds(&self, px: f64, py: f64) -> bool {
        px.is_finite()
            && py.is_finite()
            && (0.0..=self.dest_width).contains(&px)
            && (0.0..=self.dest_height).contains(&py)
    }

    /// Axis-aligned bounds of the whole source frame in destination pixels
    /// as (min_x, min_y, max_x, max_y).
    pub fn content_bounds(&self) -> (f64, f64, f64, f64) {
        let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(nx, ny)| {
                let (px, py) = self.apply(nx, ny);
                (min_x.min(px), min_y.min(py), max_x.max(px), max_y.max(py))
            },
        )
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Homogeneous affine multiply; NaN/Inf inputs propagate to the output.
#[inline]
fn apply_affine(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = m * Vector3::new(x, y, 1.0);
    (p[0], p[1])
}

/// Snap values within rounding noise of 0 or ±1
fn snap_unit(v: f64) -> f64 {
    const EPS: f64 = 1e-12;
    if v.abs() < EPS {
        0.0
    } else if (v - 1.0).abs() < EPS {
        1.0
    } else if (v + 1.0).abs() < EPS {
        -1.0
    } else {
        v
    }
}

/// (sin, cos) of an angle in degrees
fn rotation_trig(degrees: f64) -> (f64, f64) {
    let (s, c) = degrees.rem_euclid(360.0).to_radians().sin_cos();
    (snap_unit(s), snap_unit(c))
}

/// Compose the normalized → destination pixel transform for `config`.
///
/// Pure: the same config always yields a bit-identical matrix.
pub fn compute_transform(config: &TransformConfig) -> Result<TransformMatrix, TransformError> {
    config.validate()?;

    let src_w = config.src_width as f64;
    let src_h = config.src_height as f64;
    let dest_w = config.dest_width as f64;
    let dest_h = config.dest_height as f64;

    let (sin, cos) = rotation_trig(config.rotation_degrees);

    // Bounding box of the rotated source frame; swapped at odd multiples of 90
    let eff_w = (src_w * cos).abs() + (src_h * sin).abs();
    let eff_h = (src_w * sin).abs() + (src_h * cos).abs();

    let (sx, sy) = config.fit_mode.scale(eff_w, eff_h, dest_w, dest_h);

    // Top-left of the scaled content inside the destination
    let offset_x = (dest_w - eff_w * sx) / 2.0;
    let offset_y = (dest_h - eff_h * sy) / 2.0;

    let to_source = Matrix3::new(
        src_w, 0.0, -src_w / 2.0,
        0.0, src_h, -src_h / 2.0,
        0.0, 0.0, 1.0,
    );
    let rotate = Matrix3::new(
        cos, -sin, 0.0,
        sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );
    let scale = Matrix3::new(
        sx, 0.0, 0.0,
        0.0, sy, 0.0,
        0.0, 0.0, 1.0,
    );
    let place = Matrix3::new(
        1.0, 0.0, offset_x + eff_w * sx / 2.0,
        0.0, 1.0, offset_y + eff_h * sy / 2.0,
        0.0, 0.0, 1.0,
    );
    let flip = if config.mirror {
        Matrix3::new(
            -1.0, 0.0, dest_w,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        )
    } else {
        Matrix3::identity()
    };

    let forward = flip * place * scale * rotate * to_source;
    let inverse = forward
        .try_inverse()
        .ok_or_else(|| TransformError::invalid("composed transform is singular"))?;

    Ok(TransformMatrix {
        forward,
        inverse,
        dest_width: dest_w,
        dest_height: dest_h,
        scale: (sx, sy),
    })
}
