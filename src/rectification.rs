//! Per-pixel lookup tables from output pixels to input pixels.
//!
//! A [`RectificationMap`] has the output resolution; entry `(u, v)` holds the
//! sub-pixel input coordinate whose intensity belongs at output pixel `(u, v)`,
//! or the sentinel [`INVALID_COORDINATE`] when no input pixel exists there.
//!
//! Output rays are treated as points at infinity, so only the relative
//! rotation between the two cameras affects the map.

use crate::camera::{pinhole, CameraModel};
use crate::error::{UndistortError, UndistortResult};
use crate::parameters::{relative_transform, CameraParametersPair};
use log::debug;
use nalgebra::{Matrix3, Vector2, Vector3};
use std::fmt;

/// Coordinate stored for output pixels with no source pixel.
pub const INVALID_COORDINATE: f32 = -1.0;

/// Slack in pixels for projections landing on the input image border.
const BORDER_TOLERANCE: f64 = 1e-6;

/// Input pixel seen by output pixel `(u, v)`.
///
/// Returns `None` when the output pixel cannot be unprojected, its ray points
/// away from the input camera, or it lands outside `[0, width - 1] x
/// [0, height - 1]` of the input image. Coordinates within
/// [`BORDER_TOLERANCE`] of the border are clamped onto it.
pub(crate) fn source_pixel(
    input: &CameraModel,
    output: &CameraModel,
    rotation: &Matrix3<f64>,
    u: u32,
    v: u32,
) -> Option<Vector2<f64>> {
    let normalized = pinhole::normalize(&output.intrinsics(), &Vector2::new(u as f64, v as f64));
    let ideal = output.undistort_normalized(&normalized).ok()?;
    let ray = rotation * Vector3::new(ideal.x, ideal.y, 1.0);
    let pixel = input.project(&ray)?;

    let resolution = input.resolution();
    let (last_x, last_y) = (
        (resolution.width - 1) as f64,
        (resolution.height - 1) as f64,
    );
    let inside = pixel.x >= -BORDER_TOLERANCE
        && pixel.y >= -BORDER_TOLERANCE
        && pixel.x <= last_x + BORDER_TOLERANCE
        && pixel.y <= last_y + BORDER_TOLERANCE;
    inside.then(|| Vector2::new(pixel.x.clamp(0.0, last_x), pixel.y.clamp(0.0, last_y)))
}

#[derive(Clone, PartialEq)]
pub struct RectificationMap {
    input: CameraModel,
    output: CameraModel,
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
    invalid_count: usize,
}

impl RectificationMap {
    /// Builds the map for a valid parameter pair.
    ///
    /// # Errors
    ///
    /// [`UndistortError::InvalidConfig`] when the pair has no output model yet.
    pub fn build(pair: &CameraParametersPair) -> UndistortResult<Self> {
        let (input, output) = pair.models().ok_or_else(|| {
            UndistortError::InvalidConfig(
                "Rectification map requires both input and output camera models".to_string(),
            )
        })?;
        Ok(Self::from_models(input, output))
    }

    /// Builds the map taking `output` pixels into `input`.
    ///
    /// The result is a pure function of the two models.
    pub fn from_models(input: &CameraModel, output: &CameraModel) -> Self {
        let rotation = *relative_transform(input, output).rotation.matrix();
        let resolution = output.resolution();
        let count = resolution.pixel_count();

        let mut map_x = Vec::with_capacity(count);
        let mut map_y = Vec::with_capacity(count);
        let mut invalid_count = 0;

        for v in 0..resolution.height {
            for u in 0..resolution.width {
                match source_pixel(input, output, &rotation, u, v) {
                    Some(pixel) => {
                        map_x.push(pixel.x as f32);
                        map_y.push(pixel.y as f32);
                    }
                    None => {
                        map_x.push(INVALID_COORDINATE);
                        map_y.push(INVALID_COORDINATE);
                        invalid_count += 1;
                    }
                }
            }
        }

        debug!(
            "Built {}x{} rectification map, {} invalid pixels",
            resolution.width, resolution.height, invalid_count
        );

        RectificationMap {
            input: input.clone(),
            output: output.clone(),
            width: resolution.width,
            height: resolution.height,
            map_x,
            map_y,
            invalid_count,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major x coordinates into the input image.
    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    /// Row-major y coordinates into the input image.
    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }

    /// Input coordinate for output pixel `(u, v)`, `None` if it is invalid or
    /// out of range.
    pub fn source(&self, u: u32, v: u32) -> Option<(f32, f32)> {
        if u >= self.width || v >= self.height {
            return None;
        }
        let i = v as usize * self.width as usize + u as usize;
        let (x, y) = (self.map_x[i], self.map_y[i]);
        (x >= 0.0 && y >= 0.0).then_some((x, y))
    }

    pub fn is_valid(&self, u: u32, v: u32) -> bool {
        self.source(u, v).is_some()
    }

    /// Number of output pixels without a source pixel.
    pub fn invalid_count(&self) -> usize {
        self.invalid_count
    }

    pub fn input_model(&self) -> &CameraModel {
        &self.input
    }

    pub fn output_model(&self) -> &CameraModel {
        &self.output
    }

    /// Whether this map was built from exactly these models.
    pub fn matches(&self, input: &CameraModel, output: &CameraModel) -> bool {
        &self.input == input && &self.output == output
    }
}

impl fmt::Debug for RectificationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RectificationMap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("invalid_count", &self.invalid_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_models::*;
    use crate::camera::{Intrinsics, Resolution};
    use crate::config::OutputInfoSource;
    use crate::parameters::OutputPolicy;
    use approx::assert_relative_eq;

    fn auto_pair_for(input: CameraModel) -> CameraParametersPair {
        let policy = OutputPolicy::new(OutputInfoSource::AutoGenerated, 1.0, false).unwrap();
        let mut pair = CameraParametersPair::new(policy);
        pair.set_input_model(input).unwrap();
        pair
    }

    fn auto_pair() -> CameraParametersPair {
        auto_pair_for(radtan_vga())
    }

    #[test]
    fn test_build_requires_valid_pair() {
        let policy = OutputPolicy::new(OutputInfoSource::CameraInfo, 1.0, false).unwrap();
        let mut pair = CameraParametersPair::new(policy);
        assert!(RectificationMap::build(&pair).is_err());
        pair.set_input_model(radtan_vga()).unwrap();
        assert!(RectificationMap::build(&pair).is_err());
    }

    #[test]
    fn test_identity_pinhole_map() {
        let model = CameraModel::pinhole(vga(), vga_intrinsics()).unwrap();
        let map = RectificationMap::from_models(&model, &model);

        assert_eq!(map.invalid_count(), 0);
        for (u, v) in [(0, 0), (320, 240), (639, 479), (17, 401)] {
            let (x, y) = map.source(u, v).unwrap();
            assert_relative_eq!(x, u as f32, epsilon = 1e-3);
            assert_relative_eq!(y, v as f32, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_auto_generated_map_has_no_invalid_pixels() {
        let map = RectificationMap::build(&auto_pair()).unwrap();
        let output = auto_pair().output().cloned().unwrap();

        assert_eq!(map.width(), output.resolution().width);
        assert_eq!(map.height(), output.resolution().height);
        assert_eq!(map.invalid_count(), 0);

        // Optical axis maps to the input principal point
        let (cx, cy) = (output.intrinsics().cx as u32, output.intrinsics().cy as u32);
        assert_eq!(map.source(cx, cy), Some((320.0, 240.0)));
    }

    #[test]
    fn test_rebuild_is_bit_identical() {
        let pair = auto_pair();
        let first = RectificationMap::build(&pair).unwrap();
        let second = RectificationMap::build(&pair).unwrap();

        assert_eq!(first.map_x(), second.map_x());
        assert_eq!(first.map_y(), second.map_y());
        assert_eq!(first, second);
    }

    #[test]
    fn test_pixels_outside_input_are_invalid() {
        let input = CameraModel::pinhole(vga(), vga_intrinsics()).unwrap();
        // Same focal length, twice the field of view
        let output = CameraModel::pinhole(
            Resolution {
                width: 1280,
                height: 960,
            },
            Intrinsics {
                fx: 500.0,
                fy: 500.0,
                cx: 640.0,
                cy: 480.0,
            },
        )
        .unwrap();
        let map = RectificationMap::from_models(&input, &output);

        assert!(!map.is_valid(0, 0));
        assert!(!map.is_valid(1279, 959));
        assert!(map.is_valid(640, 480));
        assert_eq!(map.source(0, 0), None);
        assert_eq!(map.map_x()[0], INVALID_COORDINATE);
        // Only the central 640x480 window sees the input image
        assert_eq!(map.invalid_count(), 1280 * 960 - 640 * 480);
        assert!(map.is_valid(320, 240));
        assert!(map.is_valid(959, 719));
        assert!(!map.is_valid(319, 240));
        assert!(!map.is_valid(960, 719));
        assert_eq!(map.source(5000, 0), None);
    }

    #[test]
    fn test_rays_behind_input_camera_are_invalid() {
        let input = CameraModel::pinhole(vga(), vga_intrinsics()).unwrap();
        let turned_around = input
            .clone()
            .with_extrinsics(
                nalgebra::Rotation3::from_euler_angles(0.0, std::f64::consts::PI, 0.0).into_inner(),
                Vector3::zeros(),
            )
            .unwrap();
        let map = RectificationMap::from_models(&input, &turned_around);
        assert_eq!(map.invalid_count(), 640 * 480);
    }

    #[test]
    fn test_matches() {
        let pair = auto_pair();
        let map = RectificationMap::build(&pair).unwrap();
        let (input, output) = pair.models().unwrap();
        assert!(map.matches(input, output));
        assert!(!map.matches(&equidistant_vga(), output));
    }

    #[test]
    fn test_distorted_output_self_map_is_identity() {
        let model = radtan_vga();
        let map = RectificationMap::from_models(&model, &model);

        assert_eq!(map.invalid_count(), 0);
        for (u, v) in [(0, 0), (320, 240), (639, 479), (0, 479), (611, 13)] {
            let (x, y) = map.source(u, v).unwrap();
            assert_relative_eq!(x, u as f32, epsilon = 1e-3);
            assert_relative_eq!(y, v as f32, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_wide_fisheye_output_over_pinhole_input() {
        let input = CameraModel::pinhole(vga(), vga_intrinsics()).unwrap();
        let map = RectificationMap::from_models(&input, &equidistant_vga());

        // The fisheye sees far more than the pinhole input covers
        assert!(map.invalid_count() > 0);
        assert!(map.invalid_count() < 640 * 480);
        assert!(!map.is_valid(0, 0));
        let (x, y) = map.source(320, 240).unwrap();
        assert_relative_eq!(x, 320.0, epsilon = 1e-3);
        assert_relative_eq!(y, 240.0, epsilon = 1e-3);
    }

    #[test]
    fn test_unconverged_output_pixels_are_invalid() {
        // Without distortion θ = r_d, so pixels more than π/2 * 100 px from the
        // center have no forward-facing ray
        let output = CameraModel::new(
            vga(),
            Intrinsics {
                fx: 100.0,
                fy: 100.0,
                cx: 320.0,
                cy: 240.0,
            },
            crate::camera::DistortionModel::Equidistant,
            vec![0.0; 4],
        )
        .unwrap();
        let input = CameraModel::pinhole(
            vga(),
            Intrinsics {
                fx: 20.0,
                fy: 20.0,
                cx: 320.0,
                cy: 240.0,
            },
        )
        .unwrap();

        assert!(output
            .undistort_normalized(&Vector2::new(-3.2, 0.0))
            .is_err());
        let map = RectificationMap::from_models(&input, &output);
        assert!(!map.is_valid(0, 240));
        assert!(!map.is_valid(639, 240));
        assert!(map.is_valid(320, 240));
        assert!(map.is_valid(320, 100));
        assert!(map.invalid_count() > 0);
    }

    #[test]
    fn test_auto_generated_fisheye_map_has_no_invalid_pixels() {
        let map = RectificationMap::build(&auto_pair_for(equidistant_vga())).unwrap();
        assert_eq!(map.invalid_count(), 0);
    }

    #[test]
    fn test_auto_generated_rotated_map_has_no_invalid_pixels() {
        let rotated = radtan_vga()
            .with_extrinsics(
                nalgebra::Rotation3::from_euler_angles(0.02, -0.03, 0.01).into_inner(),
                Vector3::new(-0.05, 0.0, 0.0),
            )
            .unwrap();
        let map = RectificationMap::build(&auto_pair_for(rotated)).unwrap();
        assert_eq!(map.invalid_count(), 0);
    }
}
