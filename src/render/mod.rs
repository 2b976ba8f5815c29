/// 渲染循环 (Render Loop)
///
/// 运行在主线程, 每个节拍:
/// 1. 检查结果邮箱, 有新结果或速率变化时重新合成叠加画面
/// 2. 把当前画面提交给显示输出
/// 3. 检查退出请求
/// 4. 没有新结果时在结果邮箱上限时等待 (空闲让步)
///
/// 新结果到来前一直显示上一个成功配对的结果。
pub mod overlay;
pub mod sink;

pub use overlay::Overlay;
pub use sink::{DisplaySink, HeadlessSink};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::detection::DetectionResult;
use crate::frame::Frame;
use crate::mailbox::MailboxReader;
use crate::rate::{RateMonitor, Rates};

/// 单个节拍的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Quit,
}

/// 渲染循环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub ticks: u64,
    pub results: u64,    // 收到的检测结果数
    pub composites: u64, // 合成次数 (新结果或速率变化)
    pub presented: u64,
    pub present_errors: u64,
}

pub struct RenderLoop {
    results: MailboxReader<DetectionResult>,
    monitor: Arc<RateMonitor>,
    overlay: Overlay,
    label: String,
    idle_sleep: Duration,

    pending: Option<DetectionResult>,
    latest: Option<DetectionResult>,
    composed: Option<Frame>,
    rates: Rates,
    producer_closed: bool,
    stats: RenderStats,
}

impl RenderLoop {
    pub fn new(
        results: MailboxReader<DetectionResult>,
        monitor: Arc<RateMonitor>,
        overlay: Overlay,
        label: impl Into<String>,
        idle_sleep: Duration,
    ) -> Self {
        Self {
            results,
            monitor,
            overlay,
            label: label.into(),
            idle_sleep,
            pending: None,
            latest: None,
            composed: None,
            rates: Rates::default(),
            producer_closed: false,
            stats: RenderStats::default(),
        }
    }

    /// 执行一个节拍
    pub fn tick<S: DisplaySink + ?Sized>(&mut self, sink: &mut S) -> Tick {
        self.stats.ticks += 1;

        // 1. 取新结果
        let incoming = match self.pending.take() {
            Some(result) => Some(result),
            None => self.poll_results(),
        };
        let fresh = incoming.is_some();
        if let Some(result) = incoming {
            log::trace!(
                "🧩 结果 #{}: {} 个目标, 推理 {:.1}ms",
                result.seq,
                result.count(),
                result.inference_ms
            );
            self.stats.results += 1;
            self.latest = Some(result);
        }

        // 2. 速率
        let rates = self.monitor.sample(Instant::now());
        let rates_changed = rates != self.rates;
        self.rates = rates;

        if fresh || rates_changed {
            self.recompose();
        }

        // 3. 提交
        if let Some(frame) = &self.composed {
            match sink.present(frame) {
                Ok(()) => self.stats.presented += 1,
                Err(e) => {
                    self.stats.present_errors += 1;
                    log::warn!("⚠️  显示失败: {:#}", e);
                }
            }
        }

        // 4. 退出请求
        if sink.poll_quit() {
            return Tick::Quit;
        }

        // 5. 空闲让步
        if !fresh {
            self.idle_wait();
        }
        Tick::Continue
    }

    /// 一直运行到 sink 请求退出
    pub fn run<S: DisplaySink + ?Sized>(&mut self, sink: &mut S) -> RenderStats {
        log::info!("🖥️  渲染循环启动");
        while self.tick(sink) == Tick::Continue {}
        log::info!(
            "🖥️  渲染循环结束: {} 个结果, 提交 {} 次",
            self.stats.results,
            self.stats.presented
        );
        self.stats
    }

    /// 当前显示的检测结果
    pub fn latest(&self) -> Option<&DetectionResult> {
        self.latest.as_ref()
    }

    /// 当前合成画面
    pub fn composed(&self) -> Option<&Frame> {
        self.composed.as_ref()
    }

    pub fn rates(&self) -> Rates {
        self.rates
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    fn poll_results(&mut self) -> Option<DetectionResult> {
        match self.results.poll() {
            Ok(result) => result,
            Err(_) => {
                self.mark_closed();
                None
            }
        }
    }

    fn idle_wait(&mut self) {
        if self.producer_closed {
            thread::sleep(self.idle_sleep);
            return;
        }
        // 在邮箱上限时等待; 期间到达的结果留到下一节拍处理
        match self.results.try_take(self.idle_sleep) {
            Ok(result) => self.pending = result,
            Err(_) => {
                self.mark_closed();
                thread::sleep(self.idle_sleep);
            }
        }
    }

    fn mark_closed(&mut self) {
        if !self.producer_closed {
            self.producer_closed = true;
            log::info!("📭 检测线程已退出, 保持显示最后的结果");
        }
    }

    fn recompose(&mut self) {
        let Some(result) = &self.latest else {
            return;
        };
        match self.overlay.compose(result, self.rates, &self.label) {
            Ok(frame) => {
                self.composed = Some(frame);
                self.stats.composites += 1;
            }
            Err(e) => log::warn!("⚠️  叠加绘制失败: {:#}", e),
        }
    }
}
