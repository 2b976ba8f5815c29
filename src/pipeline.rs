//! 流水线 (Pipeline)
//!
//! 启动: 校验配置 → 确认视频源已打开 → 创建两个邮箱 → 启动采集/检测线程。
//! 关闭: 设置取消标志 → 限时等待两个线程 → 释放视频源。重复关闭不做任何事。
//! 采集线程超时未退出时被分离, 视频源由它在读帧返回后自行释放。
//!
//! ```text
//! VideoSource ─▶ [采集线程] ─▶ FrameMailbox ─▶ [检测线程] ─▶ ResultMailbox ─▶ RenderLoop ─▶ DisplaySink
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::activity::{Activity, Joined};
use crate::cancel::CancelToken;
use crate::capture::{CaptureStats, CaptureWorker};
use crate::config::PipelineConfig;
use crate::detection::{DetectionResult, DetectionStats, DetectionWorker, Detector};
use crate::mailbox::{Mailbox, MailboxReader};
use crate::rate::RateMonitor;
use crate::render::{DisplaySink, Overlay, RenderLoop, RenderStats};
use crate::source::VideoSource;

/// 关闭结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub capture_joined: bool,
    pub detection_joined: bool,
    pub source_released: bool,
    pub release_deferred: bool, // 采集线程已分离, 视频源将由它自行释放
    pub already_stopped: bool,
    pub capture: Option<CaptureStats>,
    pub detection: Option<DetectionStats>,
}

/// 一次完整运行的结果
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub render: RenderStats,
    pub shutdown: ShutdownReport,
    pub total_captured: u64,
    pub total_detected: u64,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancelToken,
    monitor: Arc<RateMonitor>,
    results: Option<MailboxReader<DetectionResult>>,
    capture: Option<Activity<(Option<Box<dyn VideoSource>>, CaptureStats)>>,
    capture_detached: Arc<AtomicBool>,
    detection: Option<Activity<DetectionStats>>,
    started_at: Instant,
    stopped: bool,
}

impl Pipeline {
    /// 启动采集和检测线程。视频源未打开或配置非法时在启动任何线程前返回错误。
    pub fn start<D>(source: Box<dyn VideoSource>, detector: D, config: PipelineConfig) -> Result<Self>
    where
        D: Detector + 'static,
    {
        config.validate().context("配置无效")?;
        if !source.is_opened() {
            bail!("无法打开视频源: {}", source.describe());
        }
        log::info!("🚀 流水线启动: {} → {}", source.describe(), detector.name());
        config.log_summary();

        let cancel = CancelToken::new();
        let monitor = Arc::new(RateMonitor::new(config.rate_report_interval));
        let (frame_tx, frame_rx) = Mailbox::new().split();
        let (result_tx, result_rx) = Mailbox::new().split();

        let capture_worker = CaptureWorker::new(source, frame_tx, monitor.clone(), cancel.clone(), &config);
        let capture_detached = capture_worker.detach_flag();
        let detection_worker =
            DetectionWorker::new(detector, frame_rx, result_tx, monitor.clone(), cancel.clone(), &config);

        // 先启动检测线程: 采集线程启动失败时可以直接取消并回收
        let detection = Activity::spawn("detection", move || detection_worker.run())?;
        let capture = match Activity::spawn("capture", move || capture_worker.run()) {
            Ok(capture) => capture,
            Err(e) => {
                cancel.cancel();
                let _ = detection.join_timeout(config.join_timeout).or_detach(config.join_timeout);
                return Err(e);
            }
        };

        Ok(Self {
            config,
            cancel,
            monitor,
            results: Some(result_rx),
            capture: Some(capture),
            capture_detached,
            detection: Some(detection),
            started_at: Instant::now(),
            stopped: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn monitor(&self) -> Arc<RateMonitor> {
        self.monitor.clone()
    }

    /// 取消令牌的克隆 (可交给信号处理/输入线程)
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped && !self.cancel.is_cancelled()
    }

    /// 取出结果邮箱的读端, 构造渲染循环 (只能调用一次)
    pub fn render_loop(&mut self) -> Result<RenderLoop> {
        let Some(results) = self.results.take() else {
            bail!("render loop already created");
        };
        let overlay = Overlay::load(self.config.font_path.as_deref());
        Ok(RenderLoop::new(
            results,
            self.monitor.clone(),
            overlay,
            self.config.target_label.clone(),
            self.config.idle_sleep_interval,
        ))
    }

    /// 在当前线程运行渲染循环直到退出请求, 然后关闭流水线并关闭 sink
    pub fn run<S: DisplaySink + ?Sized>(&mut self, sink: &mut S) -> Result<RunSummary> {
        let mut render = self.render_loop()?;
        let render_stats = render.run(sink);
        let shutdown = self.stop();
        sink.close();
        Ok(RunSummary {
            render: render_stats,
            shutdown,
            total_captured: self.monitor.total_captured(),
            total_detected: self.monitor.total_detected(),
            elapsed: self.started_at.elapsed(),
        })
    }

    /// 关闭流水线。可重复调用, 视频源只释放一次。
    pub fn stop(&mut self) -> ShutdownReport {
        if self.stopped {
            return ShutdownReport {
                already_stopped: true,
                ..ShutdownReport::default()
            };
        }
        self.stopped = true;
        self.cancel.cancel();
        log::info!("🛑 正在关闭流水线...");

        let timeout = self.config.join_timeout;
        let mut report = ShutdownReport::default();

        let captured = match self.capture.take().map(|a| a.join_timeout(timeout)) {
            Some(Joined::TimedOut(activity)) => {
                if self.capture_detached.swap(true, Ordering::AcqRel) {
                    // 采集线程已越过交接点, 正在交还视频源
                    activity.join().or_detach(timeout)
                } else {
                    log::warn!(
                        "⚠️  {} 线程 {:?} 内未退出, 已分离; 读帧返回后由该线程释放视频源",
                        activity.name(),
                        timeout
                    );
                    report.release_deferred = true;
                    None
                }
            }
            Some(joined) => joined.or_detach(timeout),
            None => None,
        };
        report.capture_joined = captured.is_some();

        let detected = self.detection.take().and_then(|a| a.join_timeout(timeout).or_detach(timeout));
        report.detection_joined = detected.is_some();
        report.detection = detected;

        match captured {
            Some((source, stats)) => {
                if let Some(mut source) = source {
                    source.release();
                }
                report.source_released = true;
                report.capture = Some(stats);
            }
            None if report.release_deferred => {}
            None => log::warn!("⚠️  采集线程异常退出, 视频源未释放"),
        }

        log::info!(
            "✅ 流水线已关闭: 采集 {} 帧, 检测 {} 帧, 运行 {:.1}s",
            self.monitor.total_captured(),
            self.monitor.total_detected(),
            self.started_at.elapsed().as_secs_f64()
        );
        report
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
