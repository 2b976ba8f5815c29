/// 视频输入系统 (Video Input System)
///
/// 采集线程通过 [`VideoSource`] 读帧, 具体输入:
/// - SyntheticSource: 合成测试画面 (无外部依赖)
/// - FfmpegSource:    RTSP/摄像头 (需要 `ffmpeg` feature)
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod synthetic;
pub mod yuv;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegSource, InputSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use crate::frame::Frame;

/// 视频源
///
/// `read_frame` 把下一帧写入调用方提供的工作缓冲区, 可以阻塞等待。
/// 返回 `false` 表示本次没有读到帧 (断线/超时), 调用方稍后重试。
pub trait VideoSource: Send {
    /// 描述 (日志用)
    fn describe(&self) -> String;

    /// 是否已成功打开
    fn is_opened(&self) -> bool;

    fn read_frame(&mut self, frame: &mut Frame) -> bool;

    /// 释放底层设备/连接。关闭流程保证只调用一次。
    fn release(&mut self) {}
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn read_frame(&mut self, frame: &mut Frame) -> bool {
        (**self).read_frame(frame)
    }

    fn release(&mut self) {
        (**self).release()
    }
}
