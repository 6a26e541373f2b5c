use std::time::Instant;

use serde::Serialize;
use tracing::{info, trace, warn};

use crate::config::MonitorConfig;

/// 60 FPS UI の1フレーム時間 (ms)
pub const UI_FRAME_BUDGET_MS: f64 = 16.67;

/// p95 がこの比率を超えて変化したら Regressed / Improved
pub const TREND_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct PerformanceSample {
    pub duration_ms: f64,
    pub timestamp: Instant,
}

/// 現在のウィンドウの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub sample_count: usize,
    pub over_budget_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Regressed,
    Improved,
    Stable,
}

impl PerformanceStats {
    /// Compare p95 against a stored baseline with ±5% bands.
    pub fn compare(&self, baseline: &PerformanceStats) -> Trend {
        if baseline.sample_count == 0 || self.sample_count == 0 || baseline.p95_ms <= 0.0 {
            return Trend::Stable;
        }
        let ratio = self.p95_ms / baseline.p95_ms;
        if ratio >= 1.0 + TREND_TOLERANCE {
            Trend::Regressed
        } else if ratio <= 1.0 - TREND_TOLERANCE {
            Trend::Improved
        } else {
            Trend::Stable
        }
    }
}

/// Rolling per-frame latency statistics.
///
/// Samples live in a fixed ring; every `window` samples close one evaluation
/// window whose p95 feeds the degradation streak.
#[derive(Debug)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    ring: Vec<PerformanceSample>,
    head: usize,
    since_window: usize,
    slow_streak: usize,
    degraded: bool,
    /// ウィンドウ評価用の作業領域（再確保しない）
    scratch: Vec<f64>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let capacity = config.window.max(1);
        Self {
            config,
            ring: Vec::with_capacity(capacity),
            head: 0,
            since_window: 0,
            slow_streak: 0,
            degraded: false,
            scratch: Vec::with_capacity(capacity),
        }
    }

    fn capacity(&self) -> usize {
        self.config.window.max(1)
    }

    pub fn record_sample(&mut self, duration_ms: f64) {
        if !duration_ms.is_finite() {
            trace!(duration_ms, "non-finite sample ignored");
            return;
        }
        let sample = PerformanceSample {
            duration_ms: duration_ms.max(0.0),
            timestamp: Instant::now(),
        };

        // 満杯なら最古を上書き
        if self.ring.len() < self.capacity() {
            self.ring.push(sample);
        } else {
            self.ring[self.head] = sample;
        }
        self.head = (self.head + 1) % self.capacity();

        self.since_window += 1;
        if self.since_window >= self.capacity() {
            self.since_window = 0;
            self.close_window();
        }
    }

    fn close_window(&mut self) {
        self.scratch.clear();
        self.scratch.extend(self.ring.iter().map(|s| s.duration_ms));
        let p95 = percentile(&mut self.scratch, 0.95);
        if p95 > self.config.degraded_p95_ms {
            self.slow_streak += 1;
        } else {
            self.slow_streak = 0;
        }

        let degraded = self.slow_streak >= self.config.consecutive_windows.max(1);
        if degraded != self.degraded {
            if degraded {
                warn!(p95_ms = p95, windows = self.slow_streak, "render latency degraded");
            } else {
                info!(p95_ms = p95, "render latency recovered");
            }
            self.degraded = degraded;
        }
    }

    pub fn stats(&self) -> PerformanceStats {
        if self.ring.is_empty() {
            return PerformanceStats::default();
        }
        let mut durations: Vec<f64> = self.ring.iter().map(|s| s.duration_ms).collect();
        let sum: f64 = durations.iter().sum();
        let max_ms = durations.iter().copied().fold(0.0, f64::max);
        let over_budget_count = durations.iter().filter(|&&d| d > self.config.frame_budget_ms).count();
        let sample_count = durations.len();

        PerformanceStats {
            mean_ms: sum / sample_count as f64,
            p95_ms: percentile(&mut durations, 0.95),
            max_ms,
            sample_count,
            over_budget_count,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// 最古から最新サンプルまでの平均レート (Hz)
    pub fn sample_rate_hz(&self) -> Option<f64> {
        let newest = self.ring.get((self.head + self.capacity() - 1) % self.capacity())?;
        let oldest = if self.ring.len() < self.capacity() {
            self.ring.first()?
        } else {
            self.ring.get(self.head)?
        };
        let span = newest.timestamp.duration_since(oldest.timestamp).as_secs_f64();
        (span > 0.0).then(|| (self.ring.len() - 1) as f64 / span)
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.head = 0;
        self.since_window = 0;
        self.slow_streak = 0;
        self.degraded = false;
    }
}

/// Nearest-rank percentile. Reorders `values` in place.
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let rank = (q * values.len() as f64).ceil() as usize;
    let (_, nth, _) = values.select_nth_unstable_by(rank.clamp(1, values.len()) - 1, f64::total_cmp);
    *nth
}
