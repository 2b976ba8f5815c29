//! YUV420P → RGB 转换 (整数近似, BT.601)

/// 平面数据不足时返回 `false`, 不写入输出
#[allow(clippy::too_many_arguments)]
pub fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    y_stride: usize,
    uv_stride: usize,
    out: &mut [u8],
    width: usize,
    height: usize,
) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    let chroma_rows = height.div_ceil(2);
    let chroma_cols = width.div_ceil(2);
    if y_stride < width
        || uv_stride < chroma_cols
        || y_plane.len() < y_stride * (height - 1) + width
        || u_plane.len() < uv_stride * (chroma_rows - 1) + chroma_cols
        || v_plane.len() < uv_stride * (chroma_rows - 1) + chroma_cols
        || out.len() < width * height * 3
    {
        return false;
    }

    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = y_plane[y_row + x] as i32;
            let u_val = u_plane[uv_row + (x >> 1)] as i32 - 128;
            let v_val = v_plane[uv_row + (x >> 1)] as i32 - 128;

            out[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            out[out_idx + 1] = (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            out[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
    true
}
