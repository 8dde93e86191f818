//! Area-averaging resize.

use crate::{GrayImage, GrayImageView};

/// Per-axis contribution list: for every destination index, the source
/// indices it covers and the covered length of each.
fn axis_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src_len as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).clamp(first + 1, src_len);
            (first..last)
                .filter_map(|s| {
                    let lo = start.max(s as f64);
                    let hi = end.min((s + 1) as f64);
                    (hi > lo).then_some((s, hi - lo))
                })
                .collect()
        })
        .collect()
}

/// Resize by integrating the source pixels covered by each destination pixel.
///
/// Every destination pixel is the coverage-weighted mean of the source box it
/// maps to, which keeps isolated noisy pixels from dominating a cell the way
/// nearest or bilinear sampling would. Returns an empty image when either
/// side of the source or the target is zero.
pub fn resize_area(src: &GrayImageView<'_>, width: usize, height: usize) -> GrayImage {
    if src.is_empty() || width == 0 || height == 0 {
        return GrayImage::filled(0, 0, 0);
    }

    let wx = axis_weights(src.width, width);
    let wy = axis_weights(src.height, height);

    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0.0f64;
        let mut area = 0.0f64;
        for &(sy, fy) in &wy[y] {
            let row = sy * src.width;
            for &(sx, fx) in &wx[x] {
                let w = fx * fy;
                sum += w * src.data[row + sx] as f64;
                area += w;
            }
        }
        if area <= 0.0 {
            0
        } else {
            (sum / area).round().clamp(0.0, 255.0) as u8
        }
    })
}
