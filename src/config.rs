use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::ConfigError;
use crate::geometry::TransformConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub smoother: SmootherConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// One Euro filter parameters, shared by every (landmark, axis) channel
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SmootherConfig {
    /// Cutoff at rest (Hz)
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f64,
    /// Speed coefficient
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Cutoff for the derivative low-pass (Hz)
    #[serde(default = "default_derivative_cutoff")]
    pub derivative_cutoff: f64,
    /// Upper clamp on the adaptive cutoff (Hz)
    #[serde(default = "default_max_cutoff")]
    pub max_cutoff: f64,
    /// Gap after which a channel is treated as discontinuous (seconds)
    #[serde(default = "default_gap_threshold_secs")]
    pub gap_threshold_secs: f64,
}

fn default_min_cutoff() -> f64 { 1.0 }
fn default_beta() -> f64 { 0.1 }
fn default_derivative_cutoff() -> f64 { 1.0 }
fn default_max_cutoff() -> f64 { 10.0 }
fn default_gap_threshold_secs() -> f64 { 0.3 }

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
            derivative_cutoff: default_derivative_cutoff(),
            max_cutoff: default_max_cutoff(),
            gap_threshold_secs: default_gap_threshold_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderConfig {
    /// 描画する最低可視性（これを超えたもののみ描画）
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
    /// ランドマーク点の半径（ピクセル）
    #[serde(default = "default_point_radius")]
    pub point_radius: i32,
    /// 骨格線の色 (0RGB)
    #[serde(default = "default_edge_color")]
    pub edge_color: u32,
    /// ランドマーク点の色 (0RGB)
    #[serde(default = "default_point_color")]
    pub point_color: u32,
    /// 1フレームの描画予算（ミリ秒）。0 で無制限
    #[serde(default = "default_frame_budget_ms")]
    pub frame_budget_ms: f64,
}

fn default_visibility_threshold() -> f32 { 0.5 }
fn default_point_radius() -> i32 { 4 }

/// ランドマーク点の半径の上限（ピクセル）
pub const MAX_POINT_RADIUS: i32 = 256;
fn default_edge_color() -> u32 { 0xFFFF00 }
fn default_point_color() -> u32 { 0x00FF00 }
fn default_frame_budget_ms() -> f64 { 16.0 }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            point_radius: default_point_radius(),
            edge_color: default_edge_color(),
            point_color: default_point_color(),
            frame_budget_ms: default_frame_budget_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MonitorConfig {
    /// Ring buffer capacity, also the length of one evaluation window
    #[serde(default = "default_window")]
    pub window: usize,
    /// p95 above this marks a window as slow (ms)
    #[serde(default = "default_degraded_p95_ms")]
    pub degraded_p95_ms: f64,
    /// Slow windows in a row before `is_degraded` reports true
    #[serde(default = "default_consecutive_windows")]
    pub consecutive_windows: usize,
    /// Per-frame budget used for the over-budget count (ms)
    #[serde(default = "default_frame_budget_ms_monitor")]
    pub frame_budget_ms: f64,
}

fn default_window() -> usize { 100 }
fn default_degraded_p95_ms() -> f64 { crate::monitor::UI_FRAME_BUDGET_MS }
fn default_consecutive_windows() -> usize { 3 }
fn default_frame_budget_ms_monitor() -> f64 { crate::monitor::UI_FRAME_BUDGET_MS }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            degraded_p95_ms: default_degraded_p95_ms(),
            consecutive_windows: default_consecutive_windows(),
            frame_budget_ms: default_frame_budget_ms_monitor(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("using default config ({}): {:#}", path.as_ref().display(), e);
                Self::default()
            }
        }
    }

    /// Rejects values that would make a component misbehave.
    ///
    /// The transform section is not checked here: an invalid transform is a
    /// runtime condition the mapper already reports as not ready.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.smoother;
        if !(s.min_cutoff > 0.0) {
            return Err(ConfigError::out_of_range("smoother", "min_cutoff", "must be > 0"));
        }
        if !(s.derivative_cutoff > 0.0) {
            return Err(ConfigError::out_of_range("smoother", "derivative_cutoff", "must be > 0"));
        }
        if !(s.beta >= 0.0) {
            return Err(ConfigError::out_of_range("smoother", "beta", "must be >= 0"));
        }
        if !(s.max_cutoff >= s.min_cutoff) {
            return Err(ConfigError::out_of_range(
                "smoother",
                "max_cutoff",
                format!("must be >= min_cutoff ({})", s.min_cutoff),
            ));
        }
        if !(s.gap_threshold_secs > 0.0) {
            return Err(ConfigError::out_of_range("smoother", "gap_threshold_secs", "must be > 0"));
        }

        let r = &self.render;
        if !(0.0..=1.0).contains(&r.visibility_threshold) {
            return Err(ConfigError::out_of_range("render", "visibility_threshold", "must be within [0, 1]"));
        }
        if !(0..=MAX_POINT_RADIUS).contains(&r.point_radius) {
            return Err(ConfigError::out_of_range(
                "render",
                "point_radius",
                format!("must be within [0, {}]", MAX_POINT_RADIUS),
            ));
        }
        if !(r.frame_budget_ms >= 0.0 && r.frame_budget_ms.is_finite()) {
            return Err(ConfigError::out_of_range("render", "frame_budget_ms", "must be finite and >= 0"));
        }

        let m = &self.monitor;
        if m.window == 0 {
            return Err(ConfigError::out_of_range("monitor", "window", "must be > 0"));
        }
        if m.consecutive_windows == 0 {
            return Err(ConfigError::out_of_range("monitor", "consecutive_windows", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FitMode;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.smoother, SmootherConfig::default());
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.monitor.window, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [smoother]
            beta = 0.3

            [transform]
            rotation_degrees = 90.0
            mirror = true
            fit_mode = "center_inside"
            src_width = 640
            src_height = 480
            dest_width = 1080
            dest_height = 1920

            [monitor]
            window = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.smoother.beta, 0.3);
        assert_eq!(config.smoother.min_cutoff, 1.0);
        assert_eq!(config.transform.rotation_degrees, 90.0);
        assert!(config.transform.mirror);
        assert_eq!(config.transform.fit_mode, FitMode::CenterInside);
        assert_eq!(config.transform.dest_height, 1920);
        assert_eq!(config.monitor.window, 60);
        assert_eq!(config.monitor.consecutive_windows, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.smoother.min_cutoff = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.smoother.max_cutoff = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.render.visibility_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.render.point_radius = 50_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("point_radius"));

        let mut config = Config::default();
        config.render.point_radius = MAX_POINT_RADIUS;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.monitor.window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor"));
    }

    #[test]
    fn test_load_bundled_config() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
        assert_eq!(config.smoother, SmootherConfig::default());
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.transform, TransformConfig::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.smoother, SmootherConfig::default());
    }
}
