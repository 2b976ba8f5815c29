//! 视频帧 (Frame)
//!
//! 发布后不可变的像素缓冲区。像素数据放在 `Arc<Vec<u8>>` 中:
//! 发布到邮箱只共享缓冲区, 采集线程下次写入工作缓冲区时若仍被消费者持有则自动复制 (写时复制)。

use std::sync::Arc;

use anyhow::{bail, Result};
use image::{GrayImage, RgbImage, RgbaImage};

/// 二维像素缓冲区 (行优先, 通道交错)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Arc<Vec<u8>>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}

impl Frame {
    /// 创建全零帧
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: Arc::new(vec![0; len]),
        }
    }

    /// 空帧, 用作采集线程的初始工作缓冲区
    pub fn empty() -> Self {
        Self::new(0, 0, 3)
    }

    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if !matches!(channels, 1 | 3 | 4) {
            bail!("unsupported channel count {}", channels);
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            bail!(
                "frame buffer size mismatch: {}x{}x{} needs {} bytes, got {}",
                width,
                height,
                channels,
                expected,
                data.len()
            );
        }
        Ok(Self {
            width,
            height,
            channels,
            data: Arc::new(data),
        })
    }

    pub fn from_rgb_image(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            channels: 3,
            data: Arc::new(img.into_raw()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 调整工作缓冲区尺寸。只在尺寸变化或缓冲区仍被共享时重新分配。
    pub fn reshape(&mut self, width: u32, height: u32, channels: u8) {
        let required = width as usize * height as usize * channels as usize;
        if Arc::strong_count(&self.data) > 1 || self.data.len() != required {
            self.data = Arc::new(vec![0; required]);
        }
        self.width = width;
        self.height = height;
        self.channels = channels;
    }

    /// 可写像素视图。缓冲区被其他帧共享时先复制一份, 已发布的帧不会被改写。
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// 两帧是否指向同一块像素内存
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// 单个像素的通道值
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels as usize;
        let idx = (y as usize * self.width as usize + x as usize) * c;
        self.data.get(idx..idx + c)
    }

    /// 转换为 RGB 图像 (灰度/RGBA 会被展开或丢弃 alpha), 用于叠加绘制的私有副本
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let raw = self.data.as_ref().clone();
        let img = match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, raw),
            1 => GrayImage::from_raw(self.width, self.height, raw)
                .map(|g| image::DynamicImage::ImageLuma8(g).into_rgb8()),
            4 => RgbaImage::from_raw(self.width, self.height, raw)
                .map(|g| image::DynamicImage::ImageRgba8(g).into_rgb8()),
            c => bail!("unsupported channel count {}", c),
        };
        match img {
            Some(img) => Ok(img),
            None => bail!("frame buffer does not match {}x{}", self.width, self.height),
        }
    }

    /// RGBA8 像素 (macroquad 纹理需要)
    pub fn to_rgba8(&self) -> Vec<u8> {
        let px = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(px * 4);
        match self.channels {
            4 => out.extend_from_slice(&self.data),
            3 => {
                for chunk in self.data.chunks_exact(3) {
                    out.extend_from_slice(chunk);
                    out.push(255);
                }
            }
            _ => {
                for &v in self.data.iter() {
                    out.extend_from_slice(&[v, v, v, 255]);
                }
            }
        }
        out
    }
}
