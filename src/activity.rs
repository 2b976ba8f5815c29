//! 后台线程句柄
//!
//! 线程结束 (包括 panic) 时完成通道的发送端被丢弃, 等待方在通道上限时阻塞,
//! 超时后可以选择继续等待或分离。

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

pub(crate) struct Activity<T> {
    name: &'static str,
    handle: JoinHandle<T>,
    done: Receiver<()>,
}

/// 限时等待的结果
pub(crate) enum Joined<T> {
    Finished(T),
    Panicked,
    /// 超时, 交还句柄由调用方决定分离还是继续等待
    TimedOut(Activity<T>),
}

impl<T: Send + 'static> Activity<T> {
    pub(crate) fn spawn<F>(name: &'static str, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (done_tx, done) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                f()
            })
            .with_context(|| format!("创建线程 {} 失败", name))?;
        Ok(Self { name, handle, done })
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// 最多等待 `timeout`
    pub(crate) fn join_timeout(self, timeout: Duration) -> Joined<T> {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Joined::TimedOut(self),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.join(),
        }
    }

    /// 阻塞等待线程结束
    pub(crate) fn join(self) -> Joined<T> {
        match self.handle.join() {
            Ok(value) => Joined::Finished(value),
            Err(_) => {
                log::error!("❌ {} 线程异常退出", self.name);
                Joined::Panicked
            }
        }
    }
}

impl<T> Joined<T> {
    /// 超时即分离 (记一条告警)
    pub(crate) fn or_detach(self, timeout: Duration) -> Option<T> {
        match self {
            Joined::Finished(value) => Some(value),
            Joined::Panicked => None,
            Joined::TimedOut(activity) => {
                log::warn!("⚠️  {} 线程 {:?} 内未退出, 已分离", activity.name, timeout);
                None
            }
        }
    }
}
