//! 检测线程 (Detection Activity)
//! 职责: 取最新帧 → 推理 → 过滤目标类别 → 发布配对的 DetectionResult

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::detector::{filter_target, Detector};
use super::types::DetectionResult;
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::frame::Frame;
use crate::mailbox::{MailboxReader, MailboxWriter};
use crate::rate::RateMonitor;

/// 检测线程退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub processed: u64, // 成功发布的结果数
    pub failures: u64,  // 推理返回错误
    pub panics: u64,    // 推理 panic
}

pub struct DetectionWorker<D: Detector> {
    detector: D,
    frames: MailboxReader<Frame>,
    results: MailboxWriter<DetectionResult>,
    monitor: Arc<RateMonitor>,
    cancel: CancelToken,

    target_class_id: u32,
    confidence_threshold: f32,
    wait_timeout: Duration,
    report_interval: Duration,

    seq: u64,
    stats: DetectionStats,
}

impl<D: Detector> DetectionWorker<D> {
    pub fn new(
        detector: D,
        frames: MailboxReader<Frame>,
        results: MailboxWriter<DetectionResult>,
        monitor: Arc<RateMonitor>,
        cancel: CancelToken,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            detector,
            frames,
            results,
            monitor,
            cancel,
            target_class_id: config.target_class_id,
            confidence_threshold: config.confidence_threshold,
            wait_timeout: config.detection_wait_timeout,
            report_interval: config.rate_report_interval,
            seq: 0,
            stats: DetectionStats::default(),
        }
    }

    /// 运行到取消或采集端关闭
    pub fn run(mut self) -> DetectionStats {
        log::info!("🔍 检测线程启动 (检测器: {})", self.detector.name());

        let mut last_report = Instant::now();
        let mut total_ms = 0.0;
        let mut window_count = 0u64;

        while !self.cancel.is_cancelled() {
            let frame = match self.frames.try_take(self.wait_timeout) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(_) => {
                    log::info!("📭 帧邮箱已关闭, 检测线程退出");
                    break;
                }
            };

            if let Some(ms) = self.process(frame) {
                total_ms += ms;
                window_count += 1;
            }

            if last_report.elapsed() >= self.report_interval {
                if window_count > 0 {
                    log::debug!(
                        "🎯 检测: 已发布 {} | 平均推理 {:.1}ms | 失败 {} | 崩溃 {}",
                        self.stats.processed,
                        total_ms / window_count as f64,
                        self.stats.failures,
                        self.stats.panics
                    );
                }
                total_ms = 0.0;
                window_count = 0;
                last_report = Instant::now();
            }
        }

        log::info!(
            "🛑 检测线程结束: 发布 {} 个结果, 失败 {}, 崩溃 {}",
            self.stats.processed,
            self.stats.failures,
            self.stats.panics
        );
        self.stats
    }

    /// 处理单帧, 成功时返回推理耗时 (ms)
    fn process(&mut self, frame: Frame) -> Option<f64> {
        let start = Instant::now();
        let threshold = self.confidence_threshold;
        let detector = &mut self.detector;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.infer(&frame, threshold)));
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                self.stats.failures += 1;
                log::warn!("⚠️  推理失败, 跳过该帧: {:#}", e);
                return None;
            }
            Err(payload) => {
                self.stats.panics += 1;
                log::error!("❌ 推理崩溃, 跳过该帧: {}", panic_message(payload.as_ref()));
                return None;
            }
        };

        let detections = filter_target(raw, self.target_class_id, threshold);
        self.seq += 1;
        self.results.publish(DetectionResult {
            seq: self.seq,
            frame,
            detections,
            inference_ms,
        });
        self.monitor.record_detection();
        self.stats.processed += 1;
        Some(inference_ms)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
