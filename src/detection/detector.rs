//! 检测器接口 (Detector)
//!
//! 检测线程只依赖这个 trait, 具体模型 (ONNX/模拟) 在各自模块中实现。

use anyhow::Result;

use super::types::Detection;
use crate::frame::Frame;

/// 目标检测器
///
/// `infer` 返回原始帧坐标下的检测框 (所有类别);
/// 类别过滤由检测线程完成。失败返回 `Err`, 该帧被跳过。
pub trait Detector: Send {
    /// 检测器名称 (日志用)
    fn name(&self) -> &str;

    /// 对一帧执行推理, `confidence_threshold` 可作为模型内部的预过滤
    fn infer(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn infer(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        (**self).infer(frame, confidence_threshold)
    }
}

/// 只保留目标类别且置信度达到阈值的检测框, 保持原有顺序
pub fn filter_target(
    detections: Vec<Detection>,
    target_class_id: u32,
    confidence_threshold: f32,
) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.class_id == target_class_id && d.confidence >= confidence_threshold)
        .collect()
}
