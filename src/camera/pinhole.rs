//! Pinhole projection helpers.
//!
//! Maps between pixel coordinates and the normalized image plane
//! (`z = 1`) through `fx, fy, cx, cy`:
//! `x = (u - cx) / fx`, `y = (v - cy) / fy`.

use crate::camera::Intrinsics;
use nalgebra::Vector2;

/// Pixel to normalized image plane.
pub fn normalize(intrinsics: &Intrinsics, pixel: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(
        (pixel.x - intrinsics.cx) / intrinsics.fx,
        (pixel.y - intrinsics.cy) / intrinsics.fy,
    )
}

/// Normalized image plane to pixel.
pub fn denormalize(intrinsics: &Intrinsics, point: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(
        intrinsics.fx * point.x + intrinsics.cx,
        intrinsics.fy * point.y + intrinsics.cy,
    )
}
