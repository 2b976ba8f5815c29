//! 合成视频源
//!
//! 生成移动的渐变画面和一个"行人"色块, 按设定帧率节拍阻塞读取。
//! 帧序号写入前 4 个字节 (小端), 便于核对检测结果与帧的配对关系。
//! 可以配置若干段读取失败区间来模拟断线。

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use super::VideoSource;
use crate::frame::Frame;

/// 把帧序号写入像素缓冲区开头
pub fn stamp_index(frame: &mut Frame, index: u64) {
    let bytes = (index as u32).to_le_bytes();
    let pixels = frame.pixels_mut();
    if pixels.len() >= bytes.len() {
        pixels[..bytes.len()].copy_from_slice(&bytes);
    }
}

/// 读取 [`stamp_index`] 写入的帧序号
pub fn frame_index(frame: &Frame) -> Option<u64> {
    let data = frame.data();
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes) as u64)
}

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,                  // 0 = 不限速
    pub failures: Vec<Range<u64>>, // 读取序号 (从 0 开始) 落在区间内时返回 false
    pub unavailable: bool,         // 模拟无法打开
    pub noise: u8,                 // 背景随机噪声幅度, 0 = 无噪声
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            failures: Vec::new(),
            unavailable: false,
            noise: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    reads: u64,
    frames: u64,
    next_due: Option<Instant>,
    releases: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            reads: 0,
            frames: 0,
            next_due: None,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `release` 被调用的次数 (源被移交给采集线程后仍可观察)
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames
    }

    fn pace(&mut self) {
        if self.config.fps <= 0.0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.config.fps);
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.unwrap_or(now).max(now) + period);
    }

    fn is_failing(&self, read: u64) -> bool {
        self.config.failures.iter().any(|r| r.contains(&read))
    }

    fn render(&self, frame: &mut Frame, index: u64) {
        let (w, h) = (self.config.width, self.config.height);
        frame.reshape(w, h, 3);
        let (bx, by, bw, bh) = walker_box(index, w, h);
        let shift = (index % 256) as u32;
        let noise = self.config.noise;
        let mut rng = rand::thread_rng();

        let pixels = frame.pixels_mut();
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i as u32 % w;
            let y = i as u32 / w;
            let inside = x >= bx && x < bx + bw && y >= by && y < by + bh;
            if inside {
                px.copy_from_slice(&[230, 200, 170]);
            } else {
                px[0] = ((x + shift) % 256) as u8;
                px[1] = (y % 256) as u8;
                px[2] = 64;
                if noise > 0 {
                    for c in px.iter_mut() {
                        *c = c.saturating_add(rng.gen_range(0..=noise));
                    }
                }
            }
        }
        stamp_index(frame, index);
    }
}

/// 第 `index` 帧中"行人"色块的位置 (x, y, w, h)
pub(crate) fn walker_box(index: u64, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let bw = (width / 4).max(1);
    let bh = (height / 2).max(1);
    let travel = width.saturating_sub(bw).max(1) as u64;
    let x = ((index * 4) % travel) as u32;
    (x, height / 4, bw, bh)
}

impl VideoSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "synthetic {}x{} @ {:.0}fps",
            self.config.width, self.config.height, self.config.fps
        )
    }

    fn is_opened(&self) -> bool {
        !self.config.unavailable
    }

    fn read_frame(&mut self, frame: &mut Frame) -> bool {
        let read = self.reads;
        self.reads += 1;
        self.pace();
        if self.config.unavailable || self.is_failing(read) {
            return false;
        }
        self.frames += 1;
        let index = self.frames;
        self.render(frame, index);
        true
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        log::info!("📴 合成视频源已释放 (共生成 {} 帧)", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unthrottled(failures: Vec<Range<u64>>) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 32,
            height: 16,
            fps: 0.0,
            failures,
            unavailable: false,
            noise: 0,
        })
    }

    #[test]
    fn test_frames_carry_increasing_index() {
        let mut source = unthrottled(Vec::new());
        let mut frame = Frame::empty();
        assert!(source.read_frame(&mut frame));
        assert_eq!(frame_index(&frame), Some(1));
        assert_eq!((frame.width(), frame.height()), (32, 16));
        assert!(source.read_frame(&mut frame));
        assert_eq!(frame_index(&frame), Some(2));
    }

    #[test]
    fn test_failure_window() {
        let mut source = unthrottled(vec![1..3]);
        let mut frame = Frame::empty();
        let reads: Vec<bool> = (0..5).map(|_| source.read_frame(&mut frame)).collect();
        assert_eq!(reads, vec![true, false, false, true, true]);
        assert_eq!(source.frames_produced(), 3);
        assert_eq!(frame_index(&frame), Some(3));
    }

    #[test]
    fn test_published_frame_survives_next_read() {
        let mut source = unthrottled(Vec::new());
        let mut working = Frame::empty();
        source.read_frame(&mut working);
        let published = working.clone();
        source.read_frame(&mut working);
        assert_eq!(frame_index(&published), Some(1));
        assert_eq!(frame_index(&working), Some(2));
    }

    #[test]
    fn test_pacing() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 8,
            height: 8,
            fps: 100.0,
            ..SyntheticConfig::default()
        });
        let mut frame = Frame::empty();
        let start = Instant::now();
        for _ in 0..6 {
            source.read_frame(&mut frame);
        }
        // 第一帧立即返回, 之后每帧 10ms
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_noise_keeps_index_stamp() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 16,
            fps: 0.0,
            noise: 20,
            ..SyntheticConfig::default()
        });
        let mut frame = Frame::empty();
        source.read_frame(&mut frame);
        assert_eq!(frame_index(&frame), Some(1));
    }

    #[test]
    fn test_release_counter() {
        let mut source = unthrottled(Vec::new());
        let counter = source.release_counter();
        source.release();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_walker_box_stays_inside() {
        for index in 0..200 {
            let (x, _, bw, _) = walker_box(index, 64, 48);
            assert!(x + bw <= 64);
        }
    }
}
