//! 采集线程 (Capture Activity)
//! 职责: 读帧 → 发布到帧邮箱 → 计数
//!
//! 读帧失败时短暂退避后重试, 不会结束线程; 只有取消标志能让它退出。
//! 连续失败达到阈值时记一次降级告警, 恢复后打印一次恢复日志。
//!
//! 退出时把视频源交还给关闭流程; 若关闭流程已超时分离本线程, 则由本线程自己释放。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::frame::Frame;
use crate::mailbox::MailboxWriter;
use crate::rate::RateMonitor;
use crate::source::VideoSource;

/// 采集线程退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,        // 成功发布的帧数
    pub failed_reads: u64,    // 读帧失败次数
    pub overwritten: u64,     // 未被检测线程取走就被覆盖的帧数
    pub degraded_events: u64, // 进入降级状态的次数
}

pub struct CaptureWorker {
    source: Box<dyn VideoSource>,
    frames: MailboxWriter<Frame>,
    monitor: Arc<RateMonitor>,
    cancel: CancelToken,

    retry_interval: Duration,
    max_consecutive_failures: Option<u32>,
    report_interval: Duration,

    stats: CaptureStats,
    // 交接标志: 采集线程退出和关闭流程超时, 先置位的一方决定由谁释放视频源
    detached: Arc<AtomicBool>,
}

impl CaptureWorker {
    pub fn new(
        source: Box<dyn VideoSource>,
        frames: MailboxWriter<Frame>,
        monitor: Arc<RateMonitor>,
        cancel: CancelToken,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            source,
            frames,
            monitor,
            cancel,
            retry_interval: config.capture_retry_interval,
            max_consecutive_failures: config.max_consecutive_failures,
            report_interval: config.rate_report_interval,
            stats: CaptureStats::default(),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 关闭流程超时放弃等待时置位的交接标志
    pub fn detach_flag(&self) -> Arc<AtomicBool> {
        self.detached.clone()
    }

    /// 运行到取消为止, 交还视频源 (由关闭流程释放) 和统计。
    /// 关闭流程已分离本线程时就地释放视频源并返回 `None`。
    pub fn run(mut self) -> (Option<Box<dyn VideoSource>>, CaptureStats) {
        log::info!("📷 采集线程启动: {}", self.source.describe());

        let mut working = Frame::empty();
        let mut streak: u32 = 0;
        let mut last_report = Instant::now();
        let mut window_failures = 0u64;

        while !self.cancel.is_cancelled() {
            if self.source.read_frame(&mut working) {
                if self.is_degraded(streak) {
                    log::info!("✅ 视频源恢复 (连续失败 {} 次后)", streak);
                }
                streak = 0;

                // 发布共享缓冲区; 下次写入时若仍被持有则自动复制
                if self.frames.publish(working.clone()) {
                    self.stats.overwritten += 1;
                }
                self.monitor.record_capture();
                self.stats.captured += 1;
            } else {
                streak = streak.saturating_add(1);
                self.stats.failed_reads += 1;
                window_failures += 1;
                if Some(streak) == self.max_consecutive_failures {
                    self.stats.degraded_events += 1;
                    log::warn!(
                        "⚠️  视频源连续 {} 次读帧失败, 持续重试: {}",
                        streak,
                        self.source.describe()
                    );
                }
                thread::sleep(self.retry_interval);
            }

            if last_report.elapsed() >= self.report_interval {
                log::debug!(
                    "📺 采集统计: 累计 {} 帧 | 覆盖 {} | 本周期失败 {}",
                    self.stats.captured,
                    self.stats.overwritten,
                    window_failures
                );
                window_failures = 0;
                last_report = Instant::now();
            }
        }

        log::info!(
            "🛑 采集线程结束: 发布 {} 帧, 失败 {} 次, 降级 {} 次",
            self.stats.captured,
            self.stats.failed_reads,
            self.stats.degraded_events
        );
        if self.detached.swap(true, Ordering::AcqRel) {
            self.source.release();
            log::info!("📴 采集线程已被分离, 自行释放视频源: {}", self.source.describe());
            return (None, self.stats);
        }
        (Some(self.source), self.stats)
    }

    fn is_degraded(&self, streak: u32) -> bool {
        matches!(self.max_consecutive_failures, Some(max) if streak >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Mailbox;
    use crate::source::synthetic::frame_index;
    use crate::source::{SyntheticConfig, SyntheticSource};

    fn config() -> PipelineConfig {
        PipelineConfig {
            capture_retry_interval: Duration::from_millis(1),
            max_consecutive_failures: Some(5),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_failures_are_retried_and_reported_once_per_streak() {
        let source = SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 16,
            fps: 0.0,
            failures: vec![2..10, 12..20],
            ..SyntheticConfig::default()
        });
        let (writer, reader) = Mailbox::new().split();
        let cancel = CancelToken::new();
        let monitor = Arc::new(RateMonitor::new(Duration::from_secs(1)));
        let worker = CaptureWorker::new(Box::new(source), writer, monitor.clone(), cancel.clone(), &config());

        let handle = thread::spawn(move || worker.run());
        // 等待失败区间之后的帧出现
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.total_captured() < 10 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        cancel.cancel();
        let (_source, stats) = handle.join().unwrap();

        assert!(stats.captured >= 10);
        assert_eq!(stats.failed_reads, 16);
        assert_eq!(stats.degraded_events, 2);
        let latest = reader.poll().unwrap().unwrap();
        assert!(frame_index(&latest).unwrap() >= 10);
    }

    #[test]
    fn test_publish_does_not_wait_for_consumer() {
        let source = SyntheticSource::new(SyntheticConfig {
            width: 8,
            height: 8,
            fps: 0.0,
            ..SyntheticConfig::default()
        });
        // 读端存在但从不取帧
        let (writer, reader) = Mailbox::new().split();
        let cancel = CancelToken::new();
        let monitor = Arc::new(RateMonitor::new(Duration::from_secs(1)));
        let worker = CaptureWorker::new(Box::new(source), writer, monitor.clone(), cancel.clone(), &config());

        let handle = thread::spawn(move || worker.run());
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        let (_source, stats) = handle.join().unwrap();

        assert!(stats.captured > 10);
        assert_eq!(stats.overwritten, stats.captured - 1);
        let latest = reader.poll().unwrap().unwrap();
        assert_eq!(frame_index(&latest), Some(stats.captured));
    }

    #[test]
    fn test_returns_source_for_release() {
        let source = SyntheticSource::new(SyntheticConfig {
            fps: 0.0,
            width: 4,
            height: 4,
            ..SyntheticConfig::default()
        });
        let releases = source.release_counter();
        let (writer, _reader) = Mailbox::new().split();
        let cancel = CancelToken::new();
        cancel.cancel();
        let worker = CaptureWorker::new(
            Box::new(source),
            writer,
            Arc::new(RateMonitor::new(Duration::from_secs(1))),
            cancel,
            &config(),
        );
        let (source, stats) = worker.run();
        let mut source = source.unwrap();
        assert_eq!(stats, CaptureStats::default());
        // 采集线程自身不释放源
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        source.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_releases_source_itself_when_detached() {
        let source = SyntheticSource::new(SyntheticConfig {
            fps: 0.0,
            width: 4,
            height: 4,
            ..SyntheticConfig::default()
        });
        let releases = source.release_counter();
        let (writer, _reader) = Mailbox::new().split();
        let cancel = CancelToken::new();
        cancel.cancel();
        let worker = CaptureWorker::new(
            Box::new(source),
            writer,
            Arc::new(RateMonitor::new(Duration::from_secs(1))),
            cancel,
            &config(),
        );
        // 关闭流程先放弃等待
        worker.detach_flag().store(true, Ordering::SeqCst);
        let (source, _stats) = worker.run();
        assert!(source.is_none());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
