/// 检测数据结构定义
/// Data structures shared by the detection worker and the render loop
use crate::frame::Frame;

// ========== 数据结构 ==========

/// 检测框 (原始帧像素坐标, 左上/右下)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    /// 构造检测框, 角点顺序不限
    pub fn new(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            confidence,
            class_id,
        }
    }

    /// 由中心点+宽高构造 (YOLO 输出格式)
    pub fn from_cxcywh(class_id: u32, confidence: f32, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(
            class_id,
            confidence,
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &Detection) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn union(&self, other: &Detection) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let union = self.union(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }

    /// 裁剪到图像范围内
    pub fn clamp_to(&mut self, width: f32, height: f32) {
        self.x1 = self.x1.clamp(0.0, width);
        self.x2 = self.x2.clamp(0.0, width);
        self.y1 = self.y1.clamp(0.0, height);
        self.y2 = self.y2.clamp(0.0, height);
    }
}

/// 检测结果 (检测线程 → 渲染循环)
///
/// `frame` 就是被检测的那一帧 (共享同一块像素缓冲区), 检测框坐标与之对应。
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub seq: u64,
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub inference_ms: f64,
}

impl DetectionResult {
    /// 检测到的目标数量
    pub fn count(&self) -> usize {
        self.detections.len()
    }
}
