/// 单槽邮箱 (latest-wins mailbox)
/// Single-slot, overwrite-on-full hand-off between one producer and one consumer
///
/// 基于 crossbeam `bounded(1)`:
/// - 发布: `try_send`, 槽满时由发布端取走旧值再重发, 永不阻塞
/// - 读取: `recv_timeout` / `try_recv`, 取走后槽位即清空
///
/// 邮箱表示"当前状态"而不是消息流, 消费者慢于生产者时只会看到最新一项。
use std::fmt;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::detection::DetectionResult;
use crate::frame::Frame;

/// 采集线程 → 检测线程
pub type FrameMailbox = Mailbox<Frame>;
/// 检测线程 → 渲染循环
pub type ResultMailbox = Mailbox<DetectionResult>;

/// 发布端已被丢弃, 邮箱中也没有待取项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxClosed;

impl fmt::Display for MailboxClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mailbox producer disconnected")
    }
}

impl std::error::Error for MailboxClosed {}

/// 尚未拆分的邮箱
pub struct Mailbox<T> {
    writer: MailboxWriter<T>,
    reader: MailboxReader<T>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            writer: MailboxWriter {
                tx,
                stale: rx.clone(),
            },
            reader: MailboxReader { rx },
        }
    }

    /// 拆分为写端/读端, 分别交给生产者和消费者线程
    pub fn split(self) -> (MailboxWriter<T>, MailboxReader<T>) {
        (self.writer, self.reader)
    }

    pub fn publish(&self, item: T) -> bool {
        self.writer.publish(item)
    }

    pub fn try_take(&self, timeout: Duration) -> Result<Option<T>, MailboxClosed> {
        self.reader.try_take(timeout)
    }

    pub fn poll(&self) -> Result<Option<T>, MailboxClosed> {
        self.reader.poll()
    }
}

/// 写端 (唯一生产者)
pub struct MailboxWriter<T> {
    tx: Sender<T>,
    // 发布端自己持有的接收端, 用于丢弃未读旧值
    stale: Receiver<T>,
}

impl<T> MailboxWriter<T> {
    /// 存入新值并覆盖未读旧值。返回是否有旧值被丢弃。
    ///
    /// 只有一个生产者: 取走旧值后槽位只可能被消费者清空, 不会被再次填满,
    /// 因此循环至多重试一次, 调用方永远不会阻塞。
    pub fn publish(&self, item: T) -> bool {
        let mut item = item;
        let mut replaced = false;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return replaced,
                Err(TrySendError::Full(back)) => {
                    if self.stale.try_recv().is_ok() {
                        replaced = true;
                    }
                    item = back;
                }
                Err(TrySendError::Disconnected(_)) => return replaced,
            }
        }
    }

    /// 是否有未被取走的值
    pub fn is_pending(&self) -> bool {
        !self.tx.is_empty()
    }
}

/// 读端 (唯一消费者)
pub struct MailboxReader<T> {
    rx: Receiver<T>,
}

impl<T> MailboxReader<T> {
    /// 最多等待 `timeout`; 超时返回 `Ok(None)`, 调用方可借此检查取消标志后继续循环
    pub fn try_take(&self, timeout: Duration) -> Result<Option<T>, MailboxClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(MailboxClosed),
        }
    }

    /// 非阻塞检查
    pub fn poll(&self) -> Result<Option<T>, MailboxClosed> {
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MailboxClosed),
        }
    }
}
