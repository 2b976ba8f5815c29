//! macroquad 窗口输出
//!
//! 合成画面上传为纹理后按比例居中显示。同一帧重复提交时不重新上传。

use anyhow::{bail, Result};
use macroquad::prelude::*;
use sentinel_pipeline::{DisplaySink, Frame};

pub struct WindowSink {
    texture: Option<Texture2D>,
    last: Option<Frame>,
    uploads: u64,
    closed: bool,
}

impl WindowSink {
    pub fn new() -> Self {
        Self {
            texture: None,
            last: None,
            uploads: 0,
            closed: false,
        }
    }

    fn upload(&mut self, frame: &Frame) -> Result<()> {
        let (Ok(width), Ok(height)) = (u16::try_from(frame.width()), u16::try_from(frame.height())) else {
            bail!("frame {}x{} exceeds texture limits", frame.width(), frame.height());
        };
        let rgba = frame.to_rgba8();

        // 只在分辨率变化时重建纹理，否则更新像素数据
        let needs_rebuild = match &self.texture {
            Some(tex) => tex.width() != width as f32 || tex.height() != height as f32,
            None => true,
        };
        if needs_rebuild {
            let texture = Texture2D::from_rgba8(width, height, &rgba);
            texture.set_filter(FilterMode::Linear);
            self.texture = Some(texture);
        } else if let Some(tex) = &self.texture {
            tex.update(&Image {
                bytes: rgba,
                width,
                height,
            });
        }
        self.uploads += 1;
        Ok(())
    }

    fn draw(&self) {
        clear_background(BLACK);
        let Some(texture) = &self.texture else {
            return;
        };
        let scale = (screen_width() / texture.width()).min(screen_height() / texture.height());
        let w = texture.width() * scale;
        let h = texture.height() * scale;
        draw_texture_ex(
            texture,
            (screen_width() - w) / 2.0,
            (screen_height() - h) / 2.0,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(w, h)),
                ..Default::default()
            },
        );
    }
}

impl DisplaySink for WindowSink {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        let repeated = self
            .last
            .as_ref()
            .is_some_and(|last| last.shares_buffer(frame));
        if !repeated {
            self.upload(frame)?;
            self.last = Some(frame.clone());
        }
        self.draw();
        Ok(())
    }

    fn poll_quit(&mut self) -> bool {
        is_quit_requested() || is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.texture = None;
        log::info!("🪟 窗口已关闭 (上传纹理 {} 次)", self.uploads);
    }
}
