#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
mod activity; // 后台线程句柄
pub mod cancel; // 取消令牌
pub mod capture; // 采集线程
pub mod cli; // 命令行参数
pub mod config; // 流水线配置参数
pub mod detection; // 检测系统
pub mod frame; // 视频帧
pub mod mailbox; // 单槽邮箱
pub mod pipeline; // 流水线启动与关闭
pub mod rate; // 帧率统计
pub mod render; // 渲染循环与叠加绘制
pub mod source; // 视频输入系统

pub use crate::cancel::CancelToken;
pub use crate::config::PipelineConfig;
pub use crate::detection::{Detection, DetectionResult, Detector, SimulatedDetector};
pub use crate::frame::Frame;
pub use crate::mailbox::{FrameMailbox, Mailbox, MailboxClosed, ResultMailbox};
pub use crate::pipeline::{Pipeline, RunSummary, ShutdownReport};
pub use crate::rate::{RateMonitor, Rates};
pub use crate::render::{DisplaySink, HeadlessSink, RenderLoop, Tick};
pub use crate::source::{SyntheticConfig, SyntheticSource, VideoSource};

/// 非极大值抑制 (与类别无关), 按置信度降序保留
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
