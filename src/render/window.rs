use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::render::canvas::FrameBuffer;

/// minifbを使用した表示ウィンドウ
pub struct MinifbWindow {
    window: Window,
}

impl MinifbWindow {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )?;
        window.set_target_fps(60);
        Ok(Self { window })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// 現在のクライアント領域サイズ
    pub fn size(&self) -> (usize, usize) {
        self.window.get_size()
    }

    /// 押された瞬間だけ true
    pub fn key_pressed(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    /// バッファをウィンドウに表示
    pub fn present(&mut self, frame: &FrameBuffer) -> Result<()> {
        self.window
            .update_with_buffer(frame.pixels(), frame.width(), frame.height())?;
        Ok(())
    }
}
