//! Region of interest in frame-relative coordinates.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use taggrid_core::Quad;

/// Four corners as fractions of the frame size, ordered TL, TR, BR, BL.
///
/// Stored relative so the same ROI survives a change of capture resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roi {
    pub corners: [[f64; 2]; 4],
}

impl Default for Roi {
    fn default() -> Self {
        Self::full_frame()
    }
}

impl Roi {
    pub fn new(corners: [[f64; 2]; 4]) -> Self {
        Self { corners }
    }

    pub fn full_frame() -> Self {
        Self::new([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
    }

    /// The centred half-size rectangle used as a starting point for calibration.
    pub fn centered() -> Self {
        Self::new([[0.25, 0.25], [0.75, 0.25], [0.75, 0.75], [0.25, 0.75]])
    }

    /// Build from absolute pixel corners of a `width × height` frame.
    pub fn from_abs(corners: [[f64; 2]; 4], width: usize, height: usize) -> Self {
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        Self::new(corners.map(|[x, y]| [x / w, y / h]))
    }

    /// Absolute pixel corners for a `width × height` frame.
    pub fn to_abs(&self, width: usize, height: usize) -> [[f64; 2]; 4] {
        let (w, h) = (width as f64, height as f64);
        self.corners.map(|[x, y]| [x * w, y * h])
    }

    /// Corners clamped onto the frame.
    pub fn clamped(&self) -> Self {
        Self::new(self.corners.map(|[x, y]| [x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)]))
    }

    pub fn is_finite(&self) -> bool {
        self.corners.iter().flatten().all(|v| v.is_finite())
    }

    pub fn to_quad(&self, width: usize, height: usize) -> Quad {
        Quad::new(
            self.to_abs(width, height)
                .map(|[x, y]| Point2::new(x as f32, y as f32)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn abs_and_rel_round_trip() {
        let abs = [[10.0, 20.0], [630.0, 18.0], [600.0, 470.0], [12.0, 460.0]];
        let roi = Roi::from_abs(abs, 640, 480);
        assert_relative_eq!(roi.corners[1][0], 630.0 / 640.0);
        let back = roi.to_abs(640, 480);
        for (a, b) in abs.iter().flatten().zip(back.iter().flatten()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn clamping_keeps_corners_on_the_frame() {
        let roi = Roi::new([[-0.1, 0.0], [1.2, -3.0], [0.9, 1.5], [0.0, 0.5]]).clamped();
        assert_eq!(roi.corners, [[0.0, 0.0], [1.0, 0.0], [0.9, 1.0], [0.0, 0.5]]);
    }

    #[test]
    fn quad_scales_to_pixels() {
        let q = Roi::full_frame().to_quad(200, 100);
        assert_relative_eq!(q.corners[2].x, 200.0);
        assert_relative_eq!(q.corners[2].y, 100.0);
    }

    #[test]
    fn serializes_as_plain_corner_list() {
        let json = serde_json::to_string(&Roi::centered()).expect("json");
        assert_eq!(json, "[[0.25,0.25],[0.75,0.25],[0.75,0.75],[0.25,0.75]]");
    }
}
