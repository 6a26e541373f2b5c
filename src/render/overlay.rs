use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::RenderConfig;
use crate::geometry::{MappedPose, PixelLandmark};
use crate::pipeline::{FrameSnapshot, LatestSlot};
use crate::render::canvas::Canvas;
use crate::render::skeleton::SKELETON_EDGES;

/// 1回の描画の集計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub subjects_drawn: usize,
    pub edges_drawn: usize,
    pub edges_skipped: usize,
    pub points_drawn: usize,
    pub points_skipped: usize,
    /// 予算切れで残りの人物を描かなかった
    pub truncated: bool,
    pub elapsed: Duration,
}

/// Draws skeleton overlays for already-mapped poses.
///
/// Visibility gating uses a strict `>` against the configured threshold, and a
/// landmark whose pixel position is not finite is never drawn.
#[derive(Debug)]
pub struct OverlayRenderer {
    config: RenderConfig,
    budget: Option<Duration>,
    last_frame: Option<Arc<FrameSnapshot>>,
}

impl OverlayRenderer {
    pub fn new(config: RenderConfig) -> Self {
        let budget = (config.frame_budget_ms > 0.0)
            .then(|| Duration::try_from_secs_f64(config.frame_budget_ms / 1000.0).ok())
            .flatten();
        Self {
            config,
            budget,
            last_frame: None,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// 最後に受け取ったフレーム
    pub fn last_frame(&self) -> Option<&Arc<FrameSnapshot>> {
        self.last_frame.as_ref()
    }

    fn visible(&self, p: &PixelLandmark) -> bool {
        p.visibility > self.config.visibility_threshold && p.is_finite()
    }

    /// 全人物の骨格を描画する（キャンバスのクリアは呼び出し側）
    pub fn render<C: Canvas + ?Sized>(&self, poses: &[MappedPose], canvas: &mut C) -> RenderReport {
        let start = Instant::now();
        let mut report = RenderReport::default();

        for (i, pose) in poses.iter().enumerate() {
            // 少なくとも1人は描く
            if i > 0 {
                if let Some(budget) = self.budget {
                    if start.elapsed() >= budget {
                        debug!(drawn = i, remaining = poses.len() - i, "render budget exhausted");
                        report.truncated = true;
                        break;
                    }
                }
            }
            self.draw_pose(pose, canvas, &mut report);
            report.subjects_drawn += 1;
        }

        report.elapsed = start.elapsed();
        report
    }

    fn draw_pose<C: Canvas + ?Sized>(&self, pose: &MappedPose, canvas: &mut C, report: &mut RenderReport) {
        // 骨格線を描画
        for &(a, b) in SKELETON_EDGES.iter() {
            let start = pose.pixel(a);
            let end = pose.pixel(b);
            if self.visible(start) && self.visible(end) {
                canvas.draw_line((start.x, start.y), (end.x, end.y), self.config.edge_color);
                report.edges_drawn += 1;
            } else {
                report.edges_skipped += 1;
            }
        }

        // ランドマーク点を描画
        for p in pose.pixels().iter() {
            if self.visible(p) {
                canvas.fill_circle((p.x, p.y), self.config.point_radius, self.config.point_color);
                report.points_drawn += 1;
            } else {
                report.points_skipped += 1;
            }
        }
    }

    /// Pull the newest frame from `slot` if one is pending and draw it.
    ///
    /// With nothing new in the slot the previous frame is drawn again, so a
    /// display running faster than detection keeps showing the last overlay.
    pub fn render_latest<C: Canvas + ?Sized>(&mut self, slot: &LatestSlot<FrameSnapshot>, canvas: &mut C) -> RenderReport {
        if let Some(frame) = slot.take() {
            if let Some(prev) = &self.last_frame {
                let skipped = frame.sequence.saturating_sub(prev.sequence + 1);
                if skipped > 0 {
                    trace!(skipped, "frames replaced before render");
                }
            }
            self.last_frame = Some(frame);
        }
        match &self.last_frame {
            Some(frame) => self.render(&frame.poses, canvas),
            None => RenderReport::default(),
        }
    }

    /// 保持中のフレームを破棄
    pub fn forget(&mut self) {
        self.last_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{TransformConfig, TransformMatrix, compute_transform};
    use crate::pose::{Landmark, LandmarkIndex, Pose};

    #[derive(Default)]
    struct RecordingCanvas {
        lines: Vec<((f32, f32), (f32, f32))>,
        circles: Vec<(f32, f32)>,
    }

    impl Canvas for RecordingCanvas {
        fn size(&self) -> (usize, usize) {
            (640, 480)
        }
        fn clear(&mut self, _color: u32) {
            self.lines.clear();
            self.circles.clear();
        }
        fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), _color: u32) {
            self.lines.push((from, to));
        }
        fn fill_circle(&mut self, center: (f32, f32), _radius: i32, _color: u32) {
            self.circles.push(center);
        }
    }

    fn matrix() -> Arc<TransformMatrix> {
        Arc::new(compute_transform(&TransformConfig::new(640, 480, 640, 480)).unwrap())
    }

    fn pose_with_visibility(visibility: f32) -> Pose {
        let landmarks = std::array::from_fn(|i| Landmark::new(0.1 + i as f32 * 0.02, 0.5, 0.0, visibility, 1.0));
        Pose::new(landmarks, 0.9, 0.0)
    }

    fn no_budget() -> RenderConfig {
        RenderConfig {
            frame_budget_ms: 0.0,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_all_visible() {
        let renderer = OverlayRenderer::new(no_budget());
        let poses = vec![MappedPose::new(pose_with_visibility(0.9), matrix())];
        let mut canvas = RecordingCanvas::default();
        let report = renderer.render(&poses, &mut canvas);
        assert_eq!(report.edges_drawn, SKELETON_EDGES.len());
        assert_eq!(report.points_drawn, LandmarkIndex::COUNT);
        assert_eq!(canvas.lines.len(), SKELETON_EDGES.len());
        assert_eq!(canvas.circles.len(), LandmarkIndex::COUNT);
        assert!(!report.truncated);
    }

    #[test]
    fn test_threshold_is_strict() {
        let renderer = OverlayRenderer::new(no_budget());
        // 閾値ちょうどは描かない
        let poses = vec![MappedPose::new(pose_with_visibility(0.5), matrix())];
        let mut canvas = RecordingCanvas::default();
        let report = renderer.render(&poses, &mut canvas);
        assert_eq!(report.edges_drawn, 0);
        assert_eq!(report.points_drawn, 0);
        assert_eq!(report.edges_skipped, SKELETON_EDGES.len());
        assert!(canvas.lines.is_empty());
    }

    #[test]
    fn test_hidden_endpoint_skips_edge() {
        let renderer = OverlayRenderer::new(no_budget());
        let mut pose = pose_with_visibility(0.9);
        pose.landmarks[LandmarkIndex::LeftElbow as usize].visibility = 0.1;
        let poses = vec![MappedPose::new(pose, matrix())];
        let mut canvas = RecordingCanvas::default();
        let report = renderer.render(&poses, &mut canvas);

        let touching = SKELETON_EDGES
            .iter()
            .filter(|(a, b)| *a == LandmarkIndex::LeftElbow || *b == LandmarkIndex::LeftElbow)
            .count();
        assert_eq!(touching, 2);
        assert_eq!(report.edges_drawn, SKELETON_EDGES.len() - touching);
        assert_eq!(report.points_drawn, LandmarkIndex::COUNT - 1);
    }

    #[test]
    fn test_non_finite_not_drawn() {
        let renderer = OverlayRenderer::new(no_budget());
        let mut pose = pose_with_visibility(0.9);
        pose.landmarks[LandmarkIndex::Nose as usize].x = f32::NAN;
        let poses = vec![MappedPose::new(pose, matrix())];
        let mut canvas = RecordingCanvas::default();
        let report = renderer.render(&poses, &mut canvas);
        assert_eq!(report.points_drawn, LandmarkIndex::COUNT - 1);
        assert!(canvas.circles.iter().all(|c| c.0.is_finite() && c.1.is_finite()));
        assert!(canvas.lines.iter().all(|(a, b)| a.0.is_finite() && b.0.is_finite()));
    }

    #[test]
    fn test_multiple_subjects() {
        let renderer = OverlayRenderer::new(no_budget());
        let poses = vec![
            MappedPose::new(pose_with_visibility(0.9), matrix()),
            MappedPose::new(pose_with_visibility(0.9), matrix()),
        ];
        let mut canvas = RecordingCanvas::default();
        let report = renderer.render(&poses, &mut canvas);
        assert_eq!(report.subjects_drawn, 2);
        assert_eq!(canvas.lines.len(), 2 * SKELETON_EDGES.len());
    }

    #[test]
    fn test_exhausted_budget_truncates() {
        let config = RenderConfig {
            frame_budget_ms: 1e-9,
            ..RenderConfig::default()
        };
        let renderer = OverlayRenderer::new(config);
        let poses: Vec<_> = (0..50).map(|_| MappedPose::new(pose_with_visibility(0.9), matrix())).collect();
        let mut canvas = RecordingCanvas::default();
        let report = renderer.render(&poses, &mut canvas);
        assert!(report.truncated);
        assert!(report.subjects_drawn >= 1);
        assert!(report.subjects_drawn < 50);
    }

    #[test]
    fn test_render_latest_redraws_previous() {
        let mut renderer = OverlayRenderer::new(no_budget());
        let slot = LatestSlot::new();
        let mut canvas = RecordingCanvas::default();

        assert_eq!(renderer.render_latest(&slot, &mut canvas), RenderReport::default());

        slot.publish(FrameSnapshot {
            sequence: 1,
            timestamp: 0.0,
            poses: vec![MappedPose::new(pose_with_visibility(0.9), matrix())],
        });
        let first = renderer.render_latest(&slot, &mut canvas);
        assert_eq!(first.subjects_drawn, 1);

        // 新しいフレームがなくても前回分を描く
        canvas.clear(0);
        let again = renderer.render_latest(&slot, &mut canvas);
        assert_eq!(again.subjects_drawn, 1);
        assert_eq!(canvas.lines.len(), SKELETON_EDGES.len());

        // 空フレームで消える
        slot.publish(FrameSnapshot {
            sequence: 2,
            timestamp: 0.1,
            poses: Vec::new(),
        });
        canvas.clear(0);
        let empty = renderer.render_latest(&slot, &mut canvas);
        assert_eq!(empty.subjects_drawn, 0);
        assert!(canvas.lines.is_empty());

        renderer.forget();
        assert!(renderer.last_frame().is_none());
    }
}
