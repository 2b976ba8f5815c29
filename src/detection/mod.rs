/// 检测系统 (Detection System)
///
/// 独立工作线程, 负责目标检测
/// - Detector: 检测器接口 (ONNX / 模拟)
/// - Worker:   检测线程主循环
/// - YOLO:     与后端无关的前/后处理
pub mod detector;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod simulated;
pub mod types;
pub mod worker;
pub mod yolo;

pub use detector::{filter_target, Detector};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxConfig, OnnxDetector};
pub use simulated::SimulatedDetector;
pub use types::{Detection, DetectionResult};
pub use worker::{DetectionStats, DetectionWorker};
