//! 帧率统计 (RateMonitor)
//!
//! 采集线程和检测线程各自累加计数, 渲染循环定期采样。
//! 速率每个统计窗口重新计算一次 (阶梯式), 窗口内返回上一次的结果。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 最近一次计算出的速率 (帧/秒)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub capture_fps: f64,
    pub detection_fps: f64,
}

struct Window {
    last_reset: Instant,
    rate: f64,
}

impl Window {
    fn new(start: Instant) -> Self {
        Self {
            last_reset: start,
            rate: 0.0,
        }
    }

    fn roll(&mut self, counter: &AtomicU64, now: Instant, interval: Duration) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_reset);
        if elapsed >= interval && !elapsed.is_zero() {
            let count = counter.swap(0, Ordering::AcqRel);
            self.rate = count as f64 / elapsed.as_secs_f64();
            self.last_reset = now;
        }
        self.rate
    }
}

struct Windows {
    capture: Window,
    detection: Window,
}

pub struct RateMonitor {
    interval: Duration,
    captured: AtomicU64,
    detected: AtomicU64,
    total_captured: AtomicU64,
    total_detected: AtomicU64,
    windows: Mutex<Windows>,
}

impl RateMonitor {
    pub fn new(interval: Duration) -> Self {
        Self::with_start(interval, Instant::now())
    }

    /// 指定起始时刻 (测试中用固定时间点驱动)
    pub fn with_start(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            captured: AtomicU64::new(0),
            detected: AtomicU64::new(0),
            total_captured: AtomicU64::new(0),
            total_detected: AtomicU64::new(0),
            windows: Mutex::new(Windows {
                capture: Window::new(start),
                detection: Window::new(start),
            }),
        }
    }

    pub fn record_capture(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        self.total_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection(&self) {
        self.detected.fetch_add(1, Ordering::Relaxed);
        self.total_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// 距上次重置满一个窗口时重新计算 `count / elapsed` 并清零, 否则返回上次的速率
    pub fn sample(&self, now: Instant) -> Rates {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let capture_fps = windows.capture.roll(&self.captured, now, self.interval);
        let detection_fps = windows.detection.roll(&self.detected, now, self.interval);
        Rates {
            capture_fps,
            detection_fps,
        }
    }

    /// 不推进窗口, 只读取上次结果
    pub fn rates(&self) -> Rates {
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Rates {
            capture_fps: windows.capture.rate,
            detection_fps: windows.detection.rate,
        }
    }

    /// 启动以来的累计采集帧数
    pub fn total_captured(&self) -> u64 {
        self.total_captured.load(Ordering::Relaxed)
    }

    /// 启动以来的累计检测帧数
    pub fn total_detected(&self) -> u64 {
        self.total_detected.load(Ordering::Relaxed)
    }
}
