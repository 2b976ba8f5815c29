//! 显示输出 (DisplaySink)
//!
//! 渲染循环每个节拍把当前合成帧交给 sink, 并询问是否需要退出。

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::frame::Frame;

pub trait DisplaySink {
    /// 显示一帧 (同一帧可能被重复提交)
    fn present(&mut self, frame: &Frame) -> Result<()>;

    /// 是否收到退出请求 (按键/关闭窗口)
    fn poll_quit(&mut self) -> bool;

    /// 关闭窗口/输出
    fn close(&mut self) {}
}

impl<S: DisplaySink + ?Sized> DisplaySink for &mut S {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        (**self).present(frame)
    }

    fn poll_quit(&mut self) -> bool {
        (**self).poll_quit()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// 无窗口输出: 记录提交的帧, 在时长/帧数上限或外部退出信号时请求退出
#[derive(Default)]
pub struct HeadlessSink {
    presented: u64,
    distinct: u64,
    last: Option<Frame>,
    deadline: Option<Instant>,
    max_distinct: Option<u64>,
    quit: Option<CancelToken>,
    closed: bool,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 运行指定时长后退出
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.deadline = Some(Instant::now() + duration);
        self
    }

    /// 收到指定数量的不同帧后退出
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_distinct = Some(frames);
        self
    }

    /// 外部退出信号 (例如 Ctrl+C / stdin)
    pub fn with_quit_signal(mut self, quit: CancelToken) -> Self {
        self.quit = Some(quit);
        self
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// 内容不同的帧数 (重复提交同一帧只算一次)
    pub fn distinct_frames(&self) -> u64 {
        self.distinct
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DisplaySink for HeadlessSink {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        self.presented += 1;
        let repeated = self
            .last
            .as_ref()
            .is_some_and(|last| last.shares_buffer(frame));
        if !repeated {
            self.distinct += 1;
            log::trace!(
                "🖼️  新画面 #{} ({}x{})",
                self.distinct,
                frame.width(),
                frame.height()
            );
            self.last = Some(frame.clone());
        }
        Ok(())
    }

    fn poll_quit(&mut self) -> bool {
        if self.quit.as_ref().is_some_and(|q| q.is_cancelled()) {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        self.max_distinct.is_some_and(|max| self.distinct >= max)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        log::info!(
            "🪟 输出已关闭: 提交 {} 次, 不同画面 {} 帧",
            self.presented,
            self.distinct
        );
    }
}
