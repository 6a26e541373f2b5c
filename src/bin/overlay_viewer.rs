use anyhow::Result;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pose_overlay::config::Config;
use pose_overlay::monitor::PerformanceMonitor;
use pose_overlay::pipeline::OverlaySession;
use pose_overlay::pose::{Landmark, LandmarkIndex, Pose};
use pose_overlay::render::{Canvas, FrameBuffer, Key, MinifbWindow, OverlayRenderer};

/// 検出スレッドの周期 (30 Hz)
const DETECTION_INTERVAL: Duration = Duration::from_millis(33);

/// 合成ポーズに乗せるノイズ幅
const JITTER: f32 = 0.008;

const BACKGROUND: u32 = 0x101018;

/// 直立姿勢の正規化座標
fn rest_position(index: LandmarkIndex) -> (f32, f32) {
    use LandmarkIndex::*;
    match index {
        Nose => (0.50, 0.18),
        LeftEyeInner => (0.51, 0.165),
        LeftEye => (0.52, 0.165),
        LeftEyeOuter => (0.53, 0.165),
        RightEyeInner => (0.49, 0.165),
        RightEye => (0.48, 0.165),
        RightEyeOuter => (0.47, 0.165),
        LeftEar => (0.545, 0.175),
        RightEar => (0.455, 0.175),
        MouthLeft => (0.515, 0.205),
        MouthRight => (0.485, 0.205),
        LeftShoulder => (0.58, 0.30),
        RightShoulder => (0.42, 0.30),
        LeftElbow => (0.62, 0.43),
        RightElbow => (0.38, 0.43),
        LeftWrist => (0.64, 0.55),
        RightWrist => (0.36, 0.55),
        LeftPinky => (0.645, 0.585),
        RightPinky => (0.355, 0.585),
        LeftIndex => (0.64, 0.59),
        RightIndex => (0.36, 0.59),
        LeftThumb => (0.63, 0.575),
        RightThumb => (0.37, 0.575),
        LeftHip => (0.55, 0.58),
        RightHip => (0.45, 0.58),
        LeftKnee => (0.56, 0.75),
        RightKnee => (0.44, 0.75),
        LeftAnkle => (0.56, 0.91),
        RightAnkle => (0.44, 0.91),
        LeftHeel => (0.55, 0.935),
        RightHeel => (0.45, 0.935),
        LeftFootIndex => (0.58, 0.95),
        RightFootIndex => (0.42, 0.95),
    }
}

/// 左右に揺れる合成ポーズ（ノイズ付き）
fn synthetic_pose(rng: &mut impl Rng, t: f64) -> Pose {
    let sway = (t * 0.8).sin() as f32 * 0.12;
    let wave = (t * 3.0).sin() as f32 * 0.08;
    let landmarks = std::array::from_fn(|i| {
        let index = LandmarkIndex::ALL[i];
        let (mut x, mut y) = rest_position(index);
        x += sway;
        // 右手だけ振る
        if matches!(index, LandmarkIndex::RightWrist | LandmarkIndex::RightPinky | LandmarkIndex::RightIndex | LandmarkIndex::RightThumb) {
            y -= 0.2 + wave;
        }
        x += rng.random_range(-JITTER..JITTER);
        y += rng.random_range(-JITTER..JITTER);
        Landmark::new(x, y, 0.0, 0.95, 0.99)
    });
    Pose::new(landmarks, 0.9, t).with_track_id(1)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load_or_default(&config_path);

    info!("Overlay Viewer ({})", env!("GIT_VERSION"));
    info!("ESC: exit, R: rotate, M: mirror, F: fit mode, P: suppress");

    let dest_w = config.transform.dest_width as usize;
    let dest_h = config.transform.dest_height as usize;
    let mut window = MinifbWindow::new("Overlay Viewer", dest_w, dest_h)?;
    let mut canvas = FrameBuffer::new(dest_w, dest_h);

    let mut session = OverlaySession::new(&config);
    let mapper = Arc::clone(session.mapper());
    let frames = Arc::clone(session.frames());
    let suppression = session.suppression().clone();

    // 検出スレッド
    let running = Arc::new(AtomicBool::new(true));
    let detector = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut rng = rand::rng();
            let start = Instant::now();
            while running.load(Ordering::Relaxed) {
                let t = start.elapsed().as_secs_f64();
                let pose = synthetic_pose(&mut rng, t);
                if let Err(e) = session.process_detection(t, &[pose]) {
                    warn!("detection frame dropped: {}", e);
                }
                thread::sleep(DETECTION_INTERVAL);
            }
            session.stop();
        })
    };

    let mut renderer = OverlayRenderer::new(config.render.clone());
    let mut monitor = PerformanceMonitor::new(config.monitor);
    let mut stats_timer = Instant::now();

    while window.is_open() {
        let frame_start = Instant::now();

        // 表示サイズの変更を反映
        let (w, h) = window.size();
        if (w, h) != canvas.size() && w > 0 && h > 0 {
            canvas.resize(w, h);
            mapper.modify_config(|config| {
                config.dest_width = w as u32;
                config.dest_height = h as u32;
            });
        }

        let rotate = window.key_pressed(Key::R);
        let mirror = window.key_pressed(Key::M);
        let cycle_fit = window.key_pressed(Key::F);
        if rotate || mirror || cycle_fit {
            let next = mapper.modify_config(|config| {
                if rotate {
                    config.rotation_degrees = (config.rotation_degrees + 90.0).rem_euclid(360.0);
                }
                if mirror {
                    config.mirror = !config.mirror;
                }
                if cycle_fit {
                    config.fit_mode = config.fit_mode.next();
                }
            });
            info!(rotation = next.rotation_degrees, mirror = next.mirror, fit_mode = ?next.fit_mode, "transform changed");
        }
        if window.key_pressed(Key::P) {
            let suppressed = suppression.toggle();
            info!(suppressed, "suppression toggled");
        }

        canvas.clear(BACKGROUND);
        let report = renderer.render_latest(&frames, &mut canvas);
        // 表示待ちは含めない
        monitor.record_sample(frame_start.elapsed().as_secs_f64() * 1000.0);
        window.present(&canvas)?;

        if report.truncated {
            warn!(drawn = report.subjects_drawn, "render budget exceeded");
        }

        // 統計表示
        if stats_timer.elapsed() >= Duration::from_secs(1) {
            let stats = monitor.stats();
            info!(
                "FPS: {:.1}, mean: {:.2} ms, p95: {:.2} ms, max: {:.2} ms, over budget: {}, degraded: {}",
                monitor.sample_rate_hz().unwrap_or(0.0),
                stats.mean_ms,
                stats.p95_ms,
                stats.max_ms,
                stats.over_budget_count,
                monitor.is_degraded()
            );
            stats_timer = Instant::now();
        }
    }

    info!("Shutting down...");
    running.store(false, Ordering::Relaxed);
    if detector.join().is_err() {
        error!("detector thread panicked");
    }
    Ok(())
}
