use tracing::{debug, trace};

use super::one_euro::{FilterState, OneEuroFilter, StepKind};
use crate::config::SmootherConfig;
use crate::pose::{LandmarkIndex, Pose, TrackId};

/// 座標軸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const COUNT: usize = 3;
    pub const ALL: [Axis; Self::COUNT] = [Axis::X, Axis::Y, Axis::Z];
}

/// One filter channel: a landmark and one of its axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub landmark: LandmarkIndex,
    pub axis: Axis,
}

impl ChannelKey {
    pub fn new(landmark: LandmarkIndex, axis: Axis) -> Self {
        Self { landmark, axis }
    }
}

type ChannelTable = [[Option<FilterState>; Axis::COUNT]; LandmarkIndex::COUNT];

/// One Euro filter bank for a single tracked subject.
///
/// 33 landmarks x 3 axes, each an independent channel in a fixed table.
/// Geometry never reaches this type: it only sees normalized coordinates.
#[derive(Debug, Clone)]
pub struct LandmarkSmoother {
    filter: OneEuroFilter,
    channels: ChannelTable,
    track_id: Option<TrackId>,
    last_timestamp: Option<f64>,
}

impl LandmarkSmoother {
    pub fn new(config: &SmootherConfig) -> Self {
        Self {
            filter: OneEuroFilter::from_config(config),
            channels: [[None; Axis::COUNT]; LandmarkIndex::COUNT],
            track_id: None,
            last_timestamp: None,
        }
    }

    /// Filter one sample of one channel.
    pub fn filter(&mut self, raw: f64, timestamp: f64, key: ChannelKey) -> f64 {
        self.step(key.landmark as usize, key.axis as usize, raw, timestamp)
    }

    fn step(&mut self, landmark: usize, axis: usize, raw: f64, timestamp: f64) -> f64 {
        let filter = self.filter;
        let slot = &mut self.channels[landmark][axis];
        let (value, kind) = filter.filter(slot, raw, timestamp);
        if kind == StepKind::Discontinuity {
            trace!(landmark, axis, timestamp, "channel reset on discontinuity");
        }
        value
    }

    /// Clear one channel, or every channel when `key` is `None`.
    pub fn reset(&mut self, key: Option<ChannelKey>) {
        match key {
            Some(key) => self.channels[key.landmark as usize][key.axis as usize] = None,
            None => {
                self.channels = [[None; Axis::COUNT]; LandmarkIndex::COUNT];
                self.last_timestamp = None;
            }
        }
    }

    pub fn state(&self, key: ChannelKey) -> Option<FilterState> {
        self.channels[key.landmark as usize][key.axis as usize]
    }

    /// Smooth x/y/z of every landmark. Visibility, presence and the pose
    /// metadata pass through untouched.
    ///
    /// A new tracking id or a gap longer than the configured threshold
    /// clears the bank first, so a jump is never smoothed as motion.
    pub fn smooth_pose(&mut self, pose: &Pose) -> Pose {
        let t = pose.timestamp;
        if let Some(last) = self.last_timestamp {
            if pose.track_id != self.track_id {
                debug!(from = ?self.track_id, to = ?pose.track_id, "tracking id changed, resetting smoother");
                self.reset(None);
            } else if t - last > self.filter.gap_threshold() {
                debug!(gap_secs = t - last, "tracking gap, resetting smoother");
                self.reset(None);
            }
        }
        self.track_id = pose.track_id;

        let mut out = pose.clone();
        for (i, lm) in out.landmarks.iter_mut().enumerate() {
            lm.x = self.step(i, Axis::X as usize, lm.x as f64, t) as f32;
            lm.y = self.step(i, Axis::Y as usize, lm.y as f64, t) as f32;
            lm.z = self.step(i, Axis::Z as usize, lm.z as f64, t) as f32;
        }

        if t.is_finite() {
            self.last_timestamp = Some(t);
        }
        out
    }
}

impl Default for LandmarkSmoother {
    fn default() -> Self {
        Self::new(&SmootherConfig::default())
    }
}

/// Bank lookup key. Untracked poses are matched by their order among the
/// untracked poses of a frame; a track id repeated within one frame is told
/// apart by its occurrence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SubjectKey {
    Tracked(TrackId, usize),
    Untracked(usize),
}

/// Filter banks for every subject in a multi-person stream.
///
/// A bank lives as long as its subject keeps appearing; subjects missing from
/// a frame are dropped together with their filter state.
#[derive(Debug, Clone)]
pub struct SubjectSmoothers {
    config: SmootherConfig,
    subjects: Vec<(SubjectKey, LandmarkSmoother)>,
}

impl SubjectSmoothers {
    pub fn new(config: SmootherConfig) -> Self {
        Self {
            config,
            subjects: Vec::new(),
        }
    }

    fn keys(poses: &[Pose]) -> Vec<SubjectKey> {
        let mut untracked = 0;
        poses
            .iter()
            .enumerate()
            .map(|(i, pose)| match pose.track_id {
                Some(id) => {
                    // 同じIDが1フレームに複数あっても別のバンクにする
                    let nth = poses[..i].iter().filter(|p| p.track_id == Some(id)).count();
                    SubjectKey::Tracked(id, nth)
                }
                None => {
                    untracked += 1;
                    SubjectKey::Untracked(untracked - 1)
                }
            })
            .collect()
    }

    /// Smooth every pose of one detection frame, preserving order.
    pub fn smooth_frame(&mut self, poses: &[Pose]) -> Vec<Pose> {
        let keys = Self::keys(poses);

        let before = self.subjects.len();
        self.subjects.retain(|(key, _)| keys.contains(key));
        if self.subjects.len() != before {
            debug!(dropped = before - self.subjects.len(), "subjects left the frame");
        }

        poses
            .iter()
            .zip(keys)
            .map(|(pose, key)| self.bank_mut(key).smooth_pose(pose))
            .collect()
    }

    fn bank_mut(&mut self, key: SubjectKey) -> &mut LandmarkSmoother {
        let pos = match self.subjects.iter().position(|(k, _)| *k == key) {
            Some(pos) => pos,
            None => {
                self.subjects.push((key, LandmarkSmoother::new(&self.config)));
                self.subjects.len() - 1
            }
        };
        &mut self.subjects[pos].1
    }

    /// Drop all filter state (privacy pause, lifecycle stop).
    pub fn reset_all(&mut self) {
        self.subjects.clear();
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
