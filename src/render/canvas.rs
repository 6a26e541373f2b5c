/// Drawing surface the overlay renders onto.
///
/// Coordinates are destination pixels; anything outside the surface is
/// clipped by the implementation.
pub trait Canvas {
    fn size(&self) -> (usize, usize);

    fn clear(&mut self, color: u32);

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: u32);

    fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: u32);
}

/// 0RGB の u32 ソフトウェアフレームバッファ
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![0u32; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.buffer[y * self.width + x])
        } else {
            None
        }
    }

    /// サイズ変更（内容はクリアされる）
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.buffer = vec![0u32; width * height];
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }

    /// Bresenhamのアルゴリズムで線を描画
    fn bresenham(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// Liang-Barsky clip of a segment to [0, w-1] x [0, h-1].
/// Returns `None` when the segment misses the rectangle entirely.
fn clip_segment(from: (f32, f32), to: (f32, f32), w: f32, h: f32) -> Option<((f32, f32), (f32, f32))> {
    let (x0, y0) = from;
    let dx = to.0 - x0;
    let dy = to.1 - y0;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;

    for (p, q) in [(-dx, x0), (dx, w - 1.0 - x0), (-dy, y0), (dy, h - 1.0 - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some(((x0 + t0 * dx, y0 + t0 * dy), (x0 + t1 * dx, y0 + t1 * dy)))
}

impl Canvas for FrameBuffer {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: u32) {
        self.buffer.fill(color);
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: u32) {
        let finite = from.0.is_finite() && from.1.is_finite() && to.0.is_finite() && to.1.is_finite();
        if !finite || self.width == 0 || self.height == 0 {
            return;
        }
        // 画面外の端点でもループが長くならないよう先にクリップ
        let Some((a, b)) = clip_segment(from, to, self.width as f32, self.height as f32) else {
            return;
        };
        self.bresenham(
            a.0.round() as i32,
            a.1.round() as i32,
            b.0.round() as i32,
            b.1.round() as i32,
            color,
        );
    }

    /// 円を描画（塗りつぶし）
    fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: u32) {
        if !center.0.is_finite() || !center.1.is_finite() {
            return;
        }
        let r = radius.max(0);
        let limit = (self.width.max(self.height) as f32) + r as f32;
        if center.0.abs() > limit * 2.0 || center.1.abs() > limit * 2.0 {
            return;
        }
        let r = i64::from(r);
        let cx = center.0.round() as i64;
        let cy = center.1.round() as i64;
        let r2 = (r as f64) * (r as f64);

        // バッファ内の行と列だけを走査
        let y_range = (cy - r).max(0)..=(cy + r).min(self.height as i64 - 1);
        let x_range = (cx - r).max(0)..=(cx + r).min(self.width as i64 - 1);
        for y in y_range {
            let dy = (y - cy) as f64;
            for x in x_range.clone() {
                let dx = (x - cx) as f64;
                if dx * dx + dy * dy <= r2 {
                    self.buffer[y as usize * self.width + x as usize] = color;
                }
            }
        }
    }
}
