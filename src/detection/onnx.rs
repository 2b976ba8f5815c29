//! ONNX Runtime 检测器 (需要 `onnx` feature)
//!
//! 加载 YOLOv8 检测模型, 前后处理见 [`super::yolo`]。

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use ort::{CUDAExecutionProvider, GraphOptimizationLevel, Session, ValueType};

use super::detector::Detector;
use super::types::Detection;
use super::yolo;
use crate::frame::Frame;

/// ONNX 模型参数
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub input_size: u32, // 模型为动态尺寸时使用
    pub iou_threshold: f32,
    pub cuda: bool,
    pub intra_threads: usize,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            input_size: 640,
            iou_threshold: 0.45,
            cuda: false,
            intra_threads: 4,
        }
    }
}

pub struct OnnxDetector {
    session: Session,
    name: String,
    input_name: String,
    output_name: String,
    width: u32,
    height: u32,
    iou_threshold: f32,
}

impl OnnxDetector {
    pub fn new(config: OnnxConfig) -> Result<Self> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;
        if config.cuda {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        let session = builder
            .commit_from_file(&config.model_path)
            .with_context(|| format!("加载模型 {} 失败", config.model_path.display()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("模型没有输入"))?;
        let input_name = input.name.clone();
        // NCHW, 动态维度为 -1
        let (height, width) = match &input.input_type {
            ValueType::Tensor { dimensions, .. } if dimensions.len() == 4 => (
                positive_or(dimensions[2], config.input_size),
                positive_or(dimensions[3], config.input_size),
            ),
            _ => (config.input_size, config.input_size),
        };
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("模型没有输出"))?;

        let name = config
            .model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        log::info!(
            "✅ 检测模型加载成功: {} | 输入 {}x{} | CUDA: {}",
            config.model_path.display(),
            width,
            height,
            config.cuda
        );

        Ok(Self {
            session,
            name,
            input_name,
            output_name,
            width,
            height,
            iou_threshold: config.iou_threshold,
        })
    }
}

fn positive_or(dim: i64, fallback: u32) -> u32 {
    if dim > 0 {
        dim as u32
    } else {
        fallback
    }
}

impl Detector for OnnxDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let (xs, letterbox) = yolo::preprocess(frame, self.width, self.height)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => xs.view()]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        yolo::postprocess(output, &letterbox, confidence_threshold, self.iou_threshold)
    }
}
