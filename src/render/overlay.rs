//! 叠加绘制 (Overlay)
//!
//! 在配对帧的私有副本上绘制检测框、置信度标签和统计文字。
//! 标签文字需要 TTF/OTF 字体; 没有字体时只画框。

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::{Detection, DetectionResult};
use crate::frame::Frame;
use crate::rate::Rates;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_BG: Rgb<u8> = Rgb([0, 0, 0]);
const HEADER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

pub struct Overlay {
    font: Option<FontVec>,
    label_scale: PxScale,
    header_scale: PxScale,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Overlay {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            label_scale: PxScale::from(16.0),
            header_scale: PxScale::from(22.0),
        }
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("读取字体 {} 失败", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("解析字体 {} 失败: {}", path.display(), e))?;
        Ok(Self::new(Some(font)))
    }

    /// 按配置加载字体, 失败时退化为只画框
    pub fn load(font_path: Option<&Path>) -> Self {
        match font_path {
            Some(path) => match Self::from_font_file(path) {
                Ok(overlay) => {
                    log::info!("🔤 标签字体: {}", path.display());
                    overlay
                }
                Err(e) => {
                    log::warn!("⚠️  {:#}, 只绘制检测框", e);
                    Self::new(None)
                }
            },
            None => Self::new(None),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 合成: 结果中的帧保持不变, 返回绘制后的新帧
    pub fn compose(&self, result: &DetectionResult, rates: Rates, label: &str) -> Result<Frame> {
        let mut img = result.frame.to_rgb_image()?;
        for detection in &result.detections {
            self.draw_detection(&mut img, detection, label);
        }
        self.draw_header(&mut img, result.count(), rates);
        Ok(Frame::from_rgb_image(img))
    }

    fn draw_detection(&self, img: &mut RgbImage, detection: &Detection, label: &str) {
        let (width, height) = img.dimensions();
        let mut bbox = detection.clone();
        bbox.clamp_to(width as f32, height as f32);
        let x = bbox.x1 as i32;
        let y = bbox.y1 as i32;
        let w = (bbox.width() as u32).max(1);
        let h = (bbox.height() as u32).max(1);

        for offset in 0..BOX_THICKNESS {
            let rect = Rect::at(x - offset, y - offset)
                .of_size(w + (offset * 2) as u32, h + (offset * 2) as u32);
            draw_hollow_rect_mut(img, rect, BOX_COLOR);
        }

        let Some(font) = &self.font else {
            return;
        };
        let text = format!("{}: {:.2}", label, detection.confidence);
        let text_y = (y - 20).max(0);
        // 粗略估计文字宽度
        let text_w = (text.len() as u32 * 9).min(width.saturating_sub(x.max(0) as u32).max(1));
        draw_filled_rect_mut(img, Rect::at(x, text_y).of_size(text_w, 18), LABEL_BG);
        draw_text_mut(img, BOX_COLOR, x + 2, text_y + 1, self.label_scale, font, &text);
    }

    fn draw_header(&self, img: &mut RgbImage, count: usize, rates: Rates) {
        let Some(font) = &self.font else {
            return;
        };
        let lines = [
            format!("Persons: {}", count),
            format!("Camera FPS: {:.1}", rates.capture_fps),
            format!("Detection FPS: {:.1}", rates.detection_fps),
        ];
        for (i, line) in lines.iter().enumerate() {
            let y = 10 + i as i32 * 25;
            draw_text_mut(img, HEADER_COLOR, 10, y, self.header_scale, font, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(detections: Vec<Detection>) -> DetectionResult {
        DetectionResult {
            seq: 1,
            frame: Frame::new(64, 64, 3),
            detections,
            inference_ms: 1.0,
        }
    }

    #[test]
    fn test_compose_draws_boxes_on_a_copy() {
        let result = result_with(vec![Detection::new(0, 0.9, 10.0, 10.0, 30.0, 30.0)]);
        let overlay = Overlay::default();
        let composed = overlay.compose(&result, Rates::default(), "Person").unwrap();

        assert!(!composed.shares_buffer(&result.frame));
        assert_eq!(composed.pixel(10, 10), Some(&[0u8, 255, 0][..]));
        assert_eq!(composed.pixel(9, 9), Some(&[0u8, 255, 0][..]));
        assert_eq!(composed.pixel(20, 20), Some(&[0u8, 0, 0][..]));
        // 原帧未被修改
        assert!(result.frame.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_boxes_outside_frame_are_clamped() {
        let result = result_with(vec![Detection::new(0, 0.9, -50.0, -50.0, 500.0, 500.0)]);
        let composed = Overlay::default()
            .compose(&result, Rates::default(), "Person")
            .unwrap();
        assert_eq!((composed.width(), composed.height()), (64, 64));
        assert_eq!(composed.pixel(0, 0), Some(&[0u8, 255, 0][..]));
    }

    #[test]
    fn test_missing_font_falls_back_to_boxes() {
        let overlay = Overlay::load(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!overlay.has_font());

        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").unwrap();
        assert!(Overlay::from_font_file(&bogus).is_err());
    }

    #[test]
    fn test_no_detections_leaves_frame_unchanged() {
        let result = result_with(Vec::new());
        let composed = Overlay::default()
            .compose(&result, Rates::default(), "Person")
            .unwrap();
        assert_eq!(composed.data(), result.frame.data());
    }
}
