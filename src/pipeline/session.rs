use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::latest::LatestSlot;
use crate::config::Config;
use crate::error::TransformError;
use crate::geometry::{CoordinateMapper, MappedPose, TransformConfig};
use crate::pose::Pose;
use crate::tracker::SubjectSmoothers;

/// 1回の検出結果を描画側へ渡す不変スナップショット
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub sequence: u64,
    /// Capture timestamp (seconds)
    pub timestamp: f64,
    pub poses: Vec<MappedPose>,
}

impl FrameSnapshot {
    /// Snapshot with nothing to draw.
    pub fn empty(sequence: u64, timestamp: f64) -> Self {
        Self {
            sequence,
            timestamp,
            poses: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

/// Shared on/off switch for privacy pause or mode changes.
#[derive(Debug, Clone, Default)]
pub struct SuppressionSwitch(Arc<AtomicBool>);

impl SuppressionSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, suppressed: bool) {
        self.0.store(suppressed, Ordering::Release);
    }

    /// 切り替えて新しい状態を返す
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_suppressed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-session wiring of smoother, mapper and the frame handoff.
///
/// Runs on the detection callback's thread. The mapper and the frame slot
/// are shared with the layout and render sides through `Arc`.
#[derive(Debug)]
pub struct OverlaySession {
    smoothers: SubjectSmoothers,
    mapper: Arc<CoordinateMapper>,
    frames: Arc<LatestSlot<FrameSnapshot>>,
    suppression: SuppressionSwitch,
    was_suppressed: bool,
    sequence: u64,
}

impl OverlaySession {
    pub fn new(config: &Config) -> Self {
        Self {
            smoothers: SubjectSmoothers::new(config.smoother),
            mapper: Arc::new(CoordinateMapper::with_config(config.transform)),
            frames: Arc::new(LatestSlot::new()),
            suppression: SuppressionSwitch::new(),
            was_suppressed: false,
            sequence: 0,
        }
    }

    pub fn mapper(&self) -> &Arc<CoordinateMapper> {
        &self.mapper
    }

    pub fn frames(&self) -> &Arc<LatestSlot<FrameSnapshot>> {
        &self.frames
    }

    pub fn suppression(&self) -> &SuppressionSwitch {
        &self.suppression
    }

    /// Active smoother banks
    pub fn subject_count(&self) -> usize {
        self.smoothers.len()
    }

    /// Smooth, map and publish one detection frame.
    ///
    /// Returns `Ok(None)` while suppressed. On entering suppression the filter
    /// state is dropped and an empty frame replaces whatever was pending, so
    /// the overlay disappears on the next render.
    pub fn process_detection(
        &mut self,
        timestamp: f64,
        poses: &[Pose],
    ) -> Result<Option<Arc<FrameSnapshot>>, TransformError> {
        if self.suppression.is_suppressed() {
            if !self.was_suppressed {
                info!("overlay suppressed");
                self.was_suppressed = true;
                self.smoothers.reset_all();
                self.sequence += 1;
                self.frames.publish(FrameSnapshot::empty(self.sequence, timestamp));
            }
            return Ok(None);
        }
        if self.was_suppressed {
            info!("overlay resumed");
            self.was_suppressed = false;
        }

        // バッチ全体で同じ行列を使う。未準備ならフィルタ状態は進めない
        let matrix = self.mapper.snapshot()?;
        let smoothed = self.smoothers.smooth_frame(poses);
        let poses = smoothed
            .into_iter()
            .map(|pose| MappedPose::new(pose, Arc::clone(&matrix)))
            .collect();

        self.sequence += 1;
        let frame = Arc::new(FrameSnapshot {
            sequence: self.sequence,
            timestamp,
            poses,
        });
        self.frames.publish_arc(Arc::clone(&frame));
        Ok(Some(frame))
    }

    /// Display rotation or resize. Keeps the source size, mirror and fit mode.
    pub fn on_layout_change(&self, dest_width: u32, dest_height: u32, rotation_degrees: f64) {
        debug!(dest_width, dest_height, rotation_degrees, "layout changed");
        self.mapper.modify_config(|config| {
            config.dest_width = dest_width;
            config.dest_height = dest_height;
            config.rotation_degrees = rotation_degrees;
        });
    }

    /// ライフサイクル停止: 状態を捨てて保留フレームをクリア
    pub fn stop(&mut self) {
        self.smoothers.reset_all();
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkIndex};
    use approx::assert_relative_eq;

    fn config() -> Config {
        let mut config = Config::default();
        config.transform = TransformConfig::new(640, 480, 1080, 1920);
        config
    }

    fn pose(x: f32, t: f64) -> Pose {
        Pose::new([Landmark::new(x, 0.5, 0.0, 0.9, 1.0); LandmarkIndex::COUNT], 0.9, t)
    }

    #[test]
    fn test_process_publishes_latest() {
        let mut session = OverlaySession::new(&config());
        let frame = session.process_detection(0.0, &[pose(0.5, 0.0)]).unwrap().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.poses.len(), 1);

        let p = frame.poses[0].pixel(LandmarkIndex::Nose);
        assert_relative_eq!(p.x, 540.0, epsilon = 1.0);
        assert_relative_eq!(p.y, 960.0, epsilon = 1.0);

        session.process_detection(1.0 / 30.0, &[pose(0.5, 1.0 / 30.0)]).unwrap();
        let taken = session.frames().take().unwrap();
        assert_eq!(taken.sequence, 2);
        assert!(session.frames().take().is_none());
    }

    #[test]
    fn test_not_ready_mapper_errors() {
        let mut config = config();
        config.transform.dest_width = 0;
        let mut session = OverlaySession::new(&config);
        let err = session.process_detection(0.0, &[pose(0.5, 0.0)]).unwrap_err();
        assert!(matches!(err, TransformError::InvalidConfig(_)));
        assert!(!session.frames().has_pending());

        session.on_layout_change(1080, 1920, 0.0);
        assert!(session.process_detection(0.1, &[pose(0.5, 0.1)]).unwrap().is_some());
    }

    #[test]
    fn test_not_ready_leaves_smoother_untouched() {
        let mut config = config();
        config.transform.dest_width = 0;
        let mut session = OverlaySession::new(&config);

        assert!(session.process_detection(0.0, &[pose(0.2, 0.0)]).is_err());
        assert_eq!(session.subject_count(), 0);

        session.on_layout_change(1080, 1920, 0.0);
        // 失敗したフレームは履歴に残らないので最初の値がそのまま出る
        let frame = session.process_detection(0.1, &[pose(0.8, 0.1)]).unwrap().unwrap();
        assert_relative_eq!(frame.poses[0].pose().landmarks[0].x, 0.8);
    }

    #[test]
    fn test_suppression_clears_and_resumes() {
        let mut session = OverlaySession::new(&config());
        session.process_detection(0.0, &[pose(0.5, 0.0)]).unwrap();
        assert_eq!(session.subject_count(), 1);

        let switch = session.suppression().clone();
        switch.set(true);
        assert!(session.process_detection(0.033, &[pose(0.5, 0.033)]).unwrap().is_none());
        assert_eq!(session.subject_count(), 0);
        // 空フレームで上書きされている
        assert!(session.frames().take().unwrap().is_empty());

        assert!(session.process_detection(0.066, &[pose(0.5, 0.066)]).unwrap().is_none());
        assert!(!session.frames().has_pending());

        assert!(!switch.toggle());
        let frame = session.process_detection(0.1, &[pose(0.7, 0.1)]).unwrap().unwrap();
        // フィルタは初期化済みなので生の値がそのまま出る
        assert_relative_eq!(frame.poses[0].pose().landmarks[0].x, 0.7);
    }

    #[test]
    fn test_layout_change_keeps_mirror() {
        let mut config = config();
        config.transform.mirror = true;
        let session = OverlaySession::new(&config);
        session.on_layout_change(1920, 1080, 90.0);

        let applied = session.mapper().config().unwrap();
        assert!(applied.mirror);
        assert_eq!((applied.dest_width, applied.dest_height), (1920, 1080));
        assert_relative_eq!(applied.rotation_degrees, 90.0);
    }

    #[test]
    fn test_stop_clears_pending() {
        let mut session = OverlaySession::new(&config());
        session.process_detection(0.0, &[pose(0.5, 0.0)]).unwrap();
        session.stop();
        assert!(!session.frames().has_pending());
        assert_eq!(session.subject_count(), 0);
    }

    #[test]
    fn test_empty_detection_publishes_empty_frame() {
        let mut session = OverlaySession::new(&config());
        let frame = session.process_detection(0.0, &[]).unwrap().unwrap();
        assert!(frame.is_empty());
    }
}
