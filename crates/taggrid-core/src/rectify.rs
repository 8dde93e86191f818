use crate::{homography_from_4pt, warp_perspective_gray, GrayImage, GrayImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Quadrilateral in image pixels, corners ordered TL, TR, BR, BL.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point2<f32>; 4],
}

impl Quad {
    pub fn new(corners: [Point2<f32>; 4]) -> Self {
        Self { corners }
    }

    /// Axis-aligned rectangle `[0, w] × [0, h]`.
    pub fn rect(width: f32, height: f32) -> Self {
        Self::new([
            Point2::new(0.0, 0.0),
            Point2::new(width, 0.0),
            Point2::new(width, height),
            Point2::new(0.0, height),
        ])
    }
}

/// Maps the ROI of a frame onto an upright rectangular image.
pub trait Rectifier: Send + Sync {
    /// Returns `None` when the quad does not define a valid projective map.
    fn rectify(
        &self,
        frame: &GrayImageView<'_>,
        roi: &Quad,
        width: usize,
        height: usize,
    ) -> Option<GrayImage>;
}

/// Rectifier backed by a 4-point homography and bilinear sampling.
#[derive(Clone, Copy, Debug, Default)]
pub struct HomographyRectifier;

impl Rectifier for HomographyRectifier {
    fn rectify(
        &self,
        frame: &GrayImageView<'_>,
        roi: &Quad,
        width: usize,
        height: usize,
    ) -> Option<GrayImage> {
        if width == 0 || height == 0 {
            return None;
        }
        let rect = Quad::rect(width as f32, height as f32);
        let h_img_from_rect = homography_from_4pt(&rect.corners, &roi.corners)?;
        Some(warp_perspective_gray(frame, h_img_from_rect, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_roi_reproduces_frame() {
        let frame = GrayImage::from_fn(16, 8, |x, y| if (x / 4 + y / 4) % 2 == 0 { 0 } else { 255 });
        let roi = Quad::rect(16.0, 8.0);
        let out = HomographyRectifier
            .rectify(&frame.view(), &roi, 16, 8)
            .expect("rectified");
        // Pixel centres map onto pixel centres, shifted by half a pixel.
        assert_eq!((out.width, out.height), (16, 8));
        assert_eq!(out.get(1, 1), 0);
        assert_eq!(out.get(3, 1), 127);
        assert_eq!(out.get(6, 1), 255);
    }

    #[test]
    fn zero_sized_target_is_rejected() {
        let frame = GrayImage::filled(4, 4, 10);
        assert!(HomographyRectifier
            .rectify(&frame.view(), &Quad::rect(4.0, 4.0), 0, 4)
            .is_none());
    }
}
