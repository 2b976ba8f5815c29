//! 命令行参数 (两个可执行文件共用)
//!
//! 参数覆盖配置文件中的同名字段, 并据此构造视频源和检测器。

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use crate::config::PipelineConfig;
use crate::detection::{Detector, SimulatedDetector};
use crate::source::{SyntheticConfig, SyntheticSource, VideoSource};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "数字卫兵 - 实时目标检测流水线", long_about = None)]
pub struct Args {
    /// 配置文件 (不存在时写入默认值)
    #[arg(short, long, default_value = "pipeline.json")]
    pub config: PathBuf,

    /// 视频源: synthetic | rtsp://... | camera:<index>[:<name>]
    #[arg(short, long, default_value = "synthetic")]
    pub source: String,

    /// 合成画面宽度
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// 合成画面高度
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// 合成画面帧率
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// 合成画面噪声幅度
    #[arg(long, default_value_t = 0)]
    pub noise: u8,

    /// 检测器: simulated | <model>.onnx
    #[arg(short, long, default_value = "simulated")]
    pub detector: String,

    /// 模拟检测器单帧耗时 (ms)
    #[arg(long, default_value_t = 100)]
    pub latency_ms: u64,

    /// 推理输入尺寸 (模型为动态尺寸时使用)
    #[arg(long, default_value_t = 640)]
    pub inf_size: u32,

    /// 使用 CUDA 推理
    #[arg(long)]
    pub cuda: bool,

    /// 目标类别
    #[arg(long)]
    pub class: Option<u32>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// 叠加标签
    #[arg(long)]
    pub label: Option<String>,

    /// 标签字体 (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 运行时长 (秒), 仅无界面模式
    #[arg(long)]
    pub duration: Option<f64>,
}

/// 视频源描述
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    Synthetic,
    Rtsp(String),
    Camera { index: usize, name: String },
}

impl SourceSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case("synthetic") {
            return Ok(SourceSpec::Synthetic);
        }
        if spec.starts_with("rtsp://") || spec.starts_with("rtsps://") {
            return Ok(SourceSpec::Rtsp(spec.to_string()));
        }
        if let Some(rest) = spec.strip_prefix("camera:") {
            let (index, name) = match rest.split_once(':') {
                Some((index, name)) => (index, name.to_string()),
                None => (rest, String::new()),
            };
            let Ok(index) = index.parse::<usize>() else {
                bail!("invalid camera index in {:?}", spec);
            };
            return Ok(SourceSpec::Camera { index, name });
        }
        bail!("unrecognized source {:?} (expected synthetic, rtsp://..., camera:N)", spec)
    }
}

impl Args {
    /// 配置文件 + 命令行覆盖
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::load(&self.config);
        if let Some(class) = self.class {
            config.target_class_id = class;
        }
        if let Some(conf) = self.conf {
            config.confidence_threshold = conf;
        }
        if let Some(label) = &self.label {
            config.target_label = label.clone();
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
        config
    }

    pub fn open_source(&self) -> Result<Box<dyn VideoSource>> {
        match SourceSpec::parse(&self.source)? {
            SourceSpec::Synthetic => Ok(Box::new(SyntheticSource::new(SyntheticConfig {
                width: self.width,
                height: self.height,
                fps: self.fps,
                noise: self.noise,
                ..SyntheticConfig::default()
            }))),
            #[cfg(feature = "ffmpeg")]
            SourceSpec::Rtsp(url) => Ok(Box::new(crate::source::FfmpegSource::open(
                crate::source::InputSource::Rtsp(url),
                Duration::from_millis(100),
            )?)),
            #[cfg(feature = "ffmpeg")]
            SourceSpec::Camera { index, name } => Ok(Box::new(crate::source::FfmpegSource::open(
                crate::source::InputSource::Camera { index, name },
                Duration::from_millis(100),
            )?)),
            #[cfg(not(feature = "ffmpeg"))]
            other => bail!("{:?} requires building with the `ffmpeg` feature", other),
        }
    }

    /// 构造检测器; 模拟检测器输出配置中的目标类别
    pub fn build_detector(&self, config: &PipelineConfig) -> Result<Box<dyn Detector>> {
        if self.detector.eq_ignore_ascii_case("simulated") {
            let detector = SimulatedDetector::new(Duration::from_millis(self.latency_ms))
                .with_class(config.target_class_id);
            return Ok(Box::new(detector));
        }
        if !self.detector.ends_with(".onnx") {
            bail!("unrecognized detector {:?} (expected simulated or a .onnx model)", self.detector);
        }
        #[cfg(feature = "onnx")]
        {
            let detector = crate::detection::OnnxDetector::new(crate::detection::OnnxConfig {
                model_path: PathBuf::from(&self.detector),
                input_size: self.inf_size,
                cuda: self.cuda,
                ..crate::detection::OnnxConfig::default()
            })?;
            return Ok(Box::new(detector));
        }
        #[cfg(not(feature = "onnx"))]
        bail!("{} requires building with the `onnx` feature", self.detector);
    }
}
