//! Automatic global binarization.

use crate::{GrayImage, GrayImageView};

/// Compute the Otsu threshold of a set of intensities.
///
/// Pixels strictly above the returned value belong to the bright class.
/// Degenerate inputs are handled explicitly: an empty set gives 127, a flat
/// set gives 0 (so any non-black flat cell reads as bright) and a two-level
/// set gives the midpoint.
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }

    let min_v = hist.iter().position(|&h| h > 0).unwrap_or(0);
    let max_v = hist.iter().rposition(|&h| h > 0).unwrap_or(255);
    if min_v == max_v {
        return 0;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v + max_v) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Binarize with a freshly computed Otsu threshold: `1` above, `0` at or below.
pub fn binarize(src: &GrayImageView<'_>) -> GrayImage {
    let t = otsu_threshold(src.data);
    GrayImage {
        width: src.width,
        height: src.height,
        data: src.data.iter().map(|&v| u8::from(v > t)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bimodal_samples_split_between_modes() {
        let mut samples = vec![];
        samples.extend(std::iter::repeat(20u8).take(50));
        samples.extend(std::iter::repeat(25u8).take(10));
        samples.extend(std::iter::repeat(200u8).take(40));
        samples.extend(std::iter::repeat(210u8).take(10));
        let t = otsu_threshold(&samples);
        assert!((25..200).contains(&t), "threshold {t}");
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(otsu_threshold(&[]), 127);
        assert_eq!(otsu_threshold(&[9, 9, 9]), 0);
        assert_eq!(otsu_threshold(&[0, 255, 0]), 127);
    }

    #[test]
    fn binarize_is_relative_to_scene_brightness() {
        // Same pattern under two lighting levels decodes identically.
        let dark = GrayImage {
            width: 4,
            height: 1,
            data: vec![10, 40, 12, 41],
        };
        let bright = GrayImage {
            width: 4,
            height: 1,
            data: vec![150, 240, 155, 238],
        };
        assert_eq!(binarize(&dark.view()).data, vec![0, 1, 0, 1]);
        assert_eq!(binarize(&bright.view()).data, vec![0, 1, 0, 1]);
    }

    #[test]
    fn flat_bright_image_is_all_ones() {
        let flat = GrayImage::filled(4, 4, 200);
        assert!(binarize(&flat.view()).data.iter().all(|&b| b == 1));
    }

    #[test]
    fn flat_black_image_is_all_zeros() {
        let flat = GrayImage::filled(3, 3, 0);
        assert!(binarize(&flat.view()).data.iter().all(|&b| b == 0));
    }
}
