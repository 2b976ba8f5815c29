//! 模拟检测器
//!
//! 不依赖模型文件, 按固定耗时返回由帧内容决定的检测框。
//! 与 [`SyntheticSource`](crate::source::SyntheticSource) 配合使用时,
//! 检测框位置由帧序号决定, 可以据此核对结果与帧是否配对。

use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use super::detector::Detector;
use super::types::Detection;
use crate::frame::Frame;
use crate::source::synthetic::{frame_index, walker_box};

pub struct SimulatedDetector {
    latency: Duration,
    class_id: u32,
    fail_every: Option<u64>,
    panic_every: Option<u64>,
    calls: u64,
}

impl SimulatedDetector {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            class_id: 0,
            fail_every: None,
            panic_every: None,
            calls: 0,
        }
    }

    /// 目标类别 (默认 0)
    pub fn with_class(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    /// 每第 n 次调用返回错误
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// 每第 n 次调用 panic
    pub fn panic_every(mut self, n: u64) -> Self {
        self.panic_every = Some(n.max(1));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// 帧 → 检测框 (纯函数, 不含耗时)
    ///
    /// 输出一个目标框 (即合成画面中的色块), 一个其他类别的框和一个低置信度目标框。
    pub fn locate(frame: &Frame, class_id: u32) -> Vec<Detection> {
        if frame.is_empty() {
            return Vec::new();
        }
        let w = frame.width() as f32;
        let index = frame_index(frame).unwrap_or(0);
        let (x, y, bw, bh) = walker_box(index, frame.width(), frame.height());
        let (x, y, bw, bh) = (x as f32, y as f32, bw as f32, bh as f32);

        vec![
            Detection::new(class_id, 0.87, x, y, x + bw, y + bh),
            Detection::new(class_id.wrapping_add(1), 0.92, 0.0, 0.0, bw / 2.0, bh / 2.0),
            Detection::new(class_id, 0.12, w - bw, 0.0, w, bh),
        ]
    }
}

impl Detector for SimulatedDetector {
    fn name(&self) -> &str {
        "simulated"
    }

    fn infer(&mut self, frame: &Frame, _confidence_threshold: f32) -> Result<Vec<Detection>> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.calls += 1;
        if let Some(n) = self.panic_every {
            if self.calls % n == 0 {
                panic!("simulated detector crashed on call {}", self.calls);
            }
        }
        if let Some(n) = self.fail_every {
            if self.calls % n == 0 {
                bail!("simulated inference failure on call {}", self.calls);
            }
        }
        Ok(Self::locate(frame, self.class_id))
    }
}
