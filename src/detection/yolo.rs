// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLOv8 检测头的前处理/后处理
//!
//! 与推理后端无关: 前处理把帧等比缩放到输入尺寸 (左上对齐, 其余填充),
//! 后处理把 `[1, 4 + nc, N]` 输出还原为原始帧坐标并做 NMS。

use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use ndarray::{s, Array, ArrayViewD, Axis, IxDyn};

use super::types::Detection;
use crate::frame::Frame;
use crate::non_max_suppression;

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 前处理的缩放信息, 后处理据此还原坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub ratio: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

/// 等比缩放: 返回 (比例, 新宽, 新高)
pub fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 帧 → NCHW 张量 `[1, 3, height, width]`, 像素归一化到 [0, 1]
pub fn preprocess(frame: &Frame, width: u32, height: u32) -> Result<(Array<f32, IxDyn>, Letterbox)> {
    if frame.is_empty() {
        bail!("cannot preprocess an empty frame");
    }
    let rgb = match frame.channels() {
        3 => frame.data().to_vec(),
        _ => frame.to_rgb_image()?.into_raw(),
    };

    let (ratio, w_new, h_new) = scale_wh(
        frame.width() as f32,
        frame.height() as f32,
        width as f32,
        height as f32,
    );
    let w_new = (w_new as u32).clamp(1, width);
    let h_new = (h_new as u32).clamp(1, height);

    let src_image = fr::images::Image::from_vec_u8(frame.width(), frame.height(), rgb, fr::PixelType::U8x3)
        .context("创建缩放源图像失败")?;
    let mut dst_image = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .context("缩放失败")?;

    let mut ys = Array::from_elem((1, 3, height as usize, width as usize), PAD_VALUE).into_dyn();
    for (i, rgb) in dst_image.buffer().chunks_exact(3).enumerate() {
        let x = i % w_new as usize;
        let y = i / w_new as usize;
        ys[[0, 0, y, x]] = rgb[0] as f32 / 255.0;
        ys[[0, 1, y, x]] = rgb[1] as f32 / 255.0;
        ys[[0, 2, y, x]] = rgb[2] as f32 / 255.0;
    }

    Ok((
        ys,
        Letterbox {
            ratio,
            resized_width: w_new,
            resized_height: h_new,
            source_width: frame.width(),
            source_height: frame.height(),
        },
    ))
}

/// `[1, 4 + nc, N]` 输出 → 原始帧坐标的检测框 (已按置信度过滤并做 NMS)
pub fn postprocess(
    output: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<Detection>> {
    if output.ndim() != 3 {
        bail!("unexpected output rank {:?}, expected [1, 4 + nc, N]", output.shape());
    }
    if output.shape()[1] <= CXYWH_OFFSET {
        bail!("output has no class scores: {:?}", output.shape());
    }

    let width_original = letterbox.source_width as f32;
    let height_original = letterbox.source_height as f32;
    let ratio = letterbox.ratio;

    let mut data = Vec::new();
    let anchors = output.index_axis(Axis(0), 0);
    for pred in anchors.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };
        if confidence < confidence_threshold {
            continue;
        }

        let mut detection = Detection::from_cxcywh(
            id as u32,
            confidence,
            bbox[0] / ratio,
            bbox[1] / ratio,
            bbox[2] / ratio,
            bbox[3] / ratio,
        );
        detection.clamp_to(width_original, height_original);
        data.push(detection);
    }

    non_max_suppression(&mut data, iou_threshold);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_scale_wh() {
        let (r, w, h) = scale_wh(1280.0, 720.0, 640.0, 640.0);
        assert_eq!(r, 0.5);
        assert_eq!((w, h), (640.0, 360.0));
    }

    #[test]
    fn test_preprocess_letterbox_pads_bottom() {
        let mut frame = Frame::new(4, 2, 3);
        for px in frame.pixels_mut().chunks_exact_mut(3) {
            px.copy_from_slice(&[255, 0, 0]);
        }
        let (ys, lb) = preprocess(&frame, 8, 8).unwrap();
        assert_eq!(ys.shape(), &[1, 3, 8, 8]);
        assert_eq!(lb.ratio, 2.0);
        assert_eq!((lb.resized_width, lb.resized_height), (8, 4));

        assert!((ys[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(ys[[0, 1, 3, 7]].abs() < 1e-6);
        // 填充区
        assert!((ys[[0, 0, 6, 3]] - PAD_VALUE).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_empty_frame() {
        assert!(preprocess(&Frame::empty(), 8, 8).is_err());
    }

    #[test]
    fn test_postprocess_filters_and_suppresses() {
        // 3 个候选, 2 个类别; 按 [特征, 候选] 排列
        #[rustfmt::skip]
        let raw = vec![
            10.0, 10.5, 30.0, // cx
            10.0, 10.0, 30.0, // cy
            4.0, 4.0, 4.0,    // w
            4.0, 4.0, 4.0,    // h
            0.9, 0.8, 0.1,    // class 0
            0.1, 0.0, 0.2,    // class 1
        ];
        let output = Array3::from_shape_vec((1, 6, 3), raw).unwrap().into_dyn();
        let lb = Letterbox {
            ratio: 2.0,
            resized_width: 64,
            resized_height: 64,
            source_width: 32,
            source_height: 32,
        };

        let dets = postprocess(output.view(), &lb, 0.25, 0.45).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!((dets[0].x1, dets[0].y1, dets[0].x2, dets[0].y2), (4.0, 4.0, 6.0, 6.0));
    }

    #[test]
    fn test_postprocess_rejects_bad_shape() {
        let lb = Letterbox {
            ratio: 1.0,
            resized_width: 8,
            resized_height: 8,
            source_width: 8,
            source_height: 8,
        };
        let flat = Array::<f32, _>::zeros(IxDyn(&[1, 4]));
        assert!(postprocess(flat.view(), &lb, 0.5, 0.5).is_err());
        let no_classes = Array::<f32, _>::zeros(IxDyn(&[1, 4, 3]));
        assert!(postprocess(no_classes.view(), &lb, 0.5, 0.5).is_err());
    }
}
