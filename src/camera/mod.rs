//! Camera models used by the undistortion pipeline.
//!
//! A [`CameraModel`] is an immutable value describing a pinhole projection plus
//! one lens distortion family ([`DistortionModel`]). The per-family math lives
//! in the submodules:
//! - [`pinhole`]: projection / normalization through `fx, fy, cx, cy`
//! - [`rad_tan`]: radial-tangential (`radtan` / `plumb_bob`) distortion
//! - [`equidistant`]: equidistant fisheye distortion
//!
//! [`info`] converts models to and from the [`CameraInfo`] descriptor that is
//! exchanged with the rest of the system.

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod equidistant;
pub mod info;
pub mod pinhole;
pub mod rad_tan;

pub use info::CameraInfo;

/// Residual tolerance of the iterative inverse distortion.
pub const UNDISTORT_TOLERANCE: f64 = 1e-10;
/// Iteration cap of the iterative inverse distortion.
pub const UNDISTORT_MAX_ITERATIONS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// The 3x3 camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("Invalid camera model: {0}")]
    InvalidModel(String),
    #[error("Inverse distortion did not converge after {iterations} iterations (residual {residual:e})")]
    ConvergenceFailure { iterations: u32, residual: f64 },
}

/// Lens distortion family of a [`CameraModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    /// Ideal pinhole, no coefficients.
    #[default]
    None,
    /// Radial-tangential: `[k1, k2, p1, p2]` or `[k1, k2, p1, p2, k3]`.
    RadTan,
    /// Equidistant fisheye: `[k1, k2, k3, k4]`.
    Equidistant,
}

impl DistortionModel {
    /// Parses the distortion labels used by calibration tools and camera drivers.
    pub fn from_label(label: &str) -> Result<Self, CameraModelError> {
        match label.trim().to_lowercase().as_str() {
            "" | "none" | "pinhole" => Ok(DistortionModel::None),
            "radtan" | "rad_tan" | "plumb_bob" => Ok(DistortionModel::RadTan),
            "equidistant" | "equi" | "fisheye" => Ok(DistortionModel::Equidistant),
            other => Err(CameraModelError::InvalidModel(format!(
                "Unknown distortion model '{other}'"
            ))),
        }
    }

    /// Label reported for this model; `plumb_bob` replaces `radtan` when requested.
    pub fn label(&self, rename_radtan_plumb_bob: bool) -> &'static str {
        match self {
            DistortionModel::None => "none",
            DistortionModel::RadTan if rename_radtan_plumb_bob => "plumb_bob",
            DistortionModel::RadTan => "radtan",
            DistortionModel::Equidistant => "equidistant",
        }
    }

    /// Whether `count` distortion coefficients are legal for this model.
    pub fn accepts_coefficient_count(&self, count: usize) -> bool {
        match self {
            DistortionModel::None => count == 0,
            DistortionModel::RadTan => count == 4 || count == 5,
            DistortionModel::Equidistant => count == 4,
        }
    }
}

impl fmt::Display for DistortionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label(false))
    }
}

/// Immutable intrinsics + distortion description of one camera.
///
/// `rotation` and `translation` place the camera relative to a shared
/// reference frame: a point `X` in that frame is `rotation * X + translation`
/// in camera coordinates.
///
/// # Examples
///
/// ```rust
/// use image_undistort::camera::{CameraModel, DistortionModel, Intrinsics, Resolution};
///
/// let model = CameraModel::new(
///     Resolution { width: 640, height: 480 },
///     Intrinsics { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0 },
///     DistortionModel::RadTan,
///     vec![-0.3, 0.1, 0.0, 0.0],
/// )
/// .unwrap();
///
/// let distorted = model.distort(&nalgebra::Vector2::new(100.0, 80.0));
/// let restored = model.undistort(&distorted).unwrap();
/// assert!((restored.x - 100.0).abs() < 1e-6);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    resolution: Resolution,
    intrinsics: Intrinsics,
    distortion_model: DistortionModel,
    distortion: Vec<f64>,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl CameraModel {
    /// Creates a model with identity rotation and zero translation.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidModel`] when the resolution is empty, a focal
    /// length is not strictly positive, the principal point is not finite, or the
    /// coefficient count does not match `distortion_model`.
    pub fn new(
        resolution: Resolution,
        intrinsics: Intrinsics,
        distortion_model: DistortionModel,
        distortion: Vec<f64>,
    ) -> Result<Self, CameraModelError> {
        let model = CameraModel {
            resolution,
            intrinsics,
            distortion_model,
            distortion,
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        };
        model.validate_params()?;
        Ok(model)
    }

    /// Convenience constructor for a distortion-free pinhole model.
    pub fn pinhole(resolution: Resolution, intrinsics: Intrinsics) -> Result<Self, CameraModelError> {
        Self::new(resolution, intrinsics, DistortionModel::None, Vec::new())
    }

    /// Returns a copy of this model placed at the given extrinsics.
    pub fn with_extrinsics(
        mut self,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
    ) -> Result<Self, CameraModelError> {
        self.rotation = rotation;
        self.translation = translation;
        self.validate_params()?;
        Ok(self)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    pub fn distortion_model(&self) -> DistortionModel {
        self.distortion_model
    }

    pub fn distortion(&self) -> &[f64] {
        &self.distortion
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// Whether a pixel coordinate lies in `[0, width) x [0, height)`.
    pub fn contains(&self, pixel: &Vector2<f64>) -> bool {
        pixel.x >= 0.0
            && pixel.x < self.resolution.width as f64
            && pixel.y >= 0.0
            && pixel.y < self.resolution.height as f64
    }

    /// Applies the forward distortion to a point on the normalized image plane.
    pub fn distort_normalized(&self, point: &Vector2<f64>) -> Vector2<f64> {
        match self.distortion_model {
            DistortionModel::None => *point,
            DistortionModel::RadTan => rad_tan::distort(&self.distortion, point),
            DistortionModel::Equidistant => equidistant::distort(&self.distortion, point),
        }
    }

    /// Inverts [`CameraModel::distort_normalized`] iteratively.
    pub fn undistort_normalized(&self, point: &Vector2<f64>) -> Result<Vector2<f64>, CameraModelError> {
        match self.distortion_model {
            DistortionModel::None => Ok(*point),
            DistortionModel::RadTan => rad_tan::undistort(&self.distortion, point),
            DistortionModel::Equidistant => equidistant::undistort(&self.distortion, point),
        }
    }

    /// Maps an ideal (pinhole) pixel to the pixel where the lens actually images it.
    pub fn distort(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        let normalized = pinhole::normalize(&self.intrinsics, pixel);
        pinhole::denormalize(&self.intrinsics, &self.distort_normalized(&normalized))
    }

    /// Maps a distorted pixel back to its ideal pinhole position.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::ConvergenceFailure`] when the iteration does not reach
    /// [`UNDISTORT_TOLERANCE`] within [`UNDISTORT_MAX_ITERATIONS`].
    pub fn undistort(&self, pixel: &Vector2<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let normalized = pinhole::normalize(&self.intrinsics, pixel);
        let ideal = self.undistort_normalized(&normalized)?;
        Ok(pinhole::denormalize(&self.intrinsics, &ideal))
    }

    /// Projects a point in camera coordinates to a (distorted) pixel.
    ///
    /// Returns `None` for points at or behind the camera center.
    pub fn project(&self, point_3d: &Vector3<f64>) -> Option<Vector2<f64>> {
        if point_3d.z < f64::EPSILON.sqrt() {
            return None;
        }
        let normalized = Vector2::new(point_3d.x / point_3d.z, point_3d.y / point_3d.z);
        Some(pinhole::denormalize(
            &self.intrinsics,
            &self.distort_normalized(&normalized),
        ))
    }

    /// Unprojects a (distorted) pixel to a unit-length viewing ray.
    pub fn unproject(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        let normalized = pinhole::normalize(&self.intrinsics, pixel);
        let ideal = self.undistort_normalized(&normalized)?;
        Ok(Vector3::new(ideal.x, ideal.y, 1.0).normalize())
    }

    /// Validates the invariants of the model.
    pub fn validate_params(&self) -> Result<(), CameraModelError> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(CameraModelError::InvalidModel(format!(
                "Resolution must be non-zero, got {}x{}",
                self.resolution.width, self.resolution.height
            )));
        }
        validation::validate_intrinsics(&self.intrinsics)?;
        if !self
            .distortion_model
            .accepts_coefficient_count(self.distortion.len())
        {
            return Err(CameraModelError::InvalidModel(format!(
                "{} distortion does not accept {} coefficients",
                self.distortion_model,
                self.distortion.len()
            )));
        }
        if self.distortion.iter().any(|d| !d.is_finite()) {
            return Err(CameraModelError::InvalidModel(
                "Distortion coefficients must be finite".to_string(),
            ));
        }
        if self.rotation.iter().any(|r| !r.is_finite())
            || self.translation.iter().any(|t| !t.is_finite())
        {
            return Err(CameraModelError::InvalidModel(
                "Extrinsics must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CameraModel [{}x{} fx: {} fy: {} cx: {} cy: {} {}: {:?}]",
            self.resolution.width,
            self.resolution.height,
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortion_model,
            self.distortion,
        )
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0)
            || !intrinsics.fx.is_finite()
            || !intrinsics.fy.is_finite()
        {
            return Err(CameraModelError::InvalidModel(format!(
                "Focal length must be positive, got fx: {} fy: {}",
                intrinsics.fx, intrinsics.fy
            )));
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::InvalidModel(
                "Principal point must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
